use anyhow::{Context, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::config::ClientConfig;
use crate::fields::FieldInput;
use crate::hooks::PageHooks;
use crate::notice::Notifier;
use crate::poll::{
    AdaptiveInterval, CycleOutcome, HttpSource, LoopExit, Navigation, PollHandle, PollLoop,
    PollSource, PollState,
};
use crate::submit::Submitter;
use crate::terminal::{TerminalPage, TerminalSurface};

/// A line typed at the watch console
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Change { attr: String, input: FieldInput },
    Send { attr: String, value: String },
    Toggle { attr: String },
    Delete,
    Redraw,
    Poll,
    Clear,
    Quit,
    Help,
}

const CONSOLE_HELP: &str = "\
Commands:
  set <attr> <value>        change a text field
  time <attr> <H:M:S>       change a time field
  check <attr> <on|off>     change a checkbox
  select <attr> <value>     change a select field
  send <attr> <value>       send a raw value without polling right away
  toggle <attr>             flip an on/off field
  delete                    delete this object
  redraw                    render the last state again
  poll                      restart the poll schedule
  clear                     hide the current notice
  quit                      stop watching";

/// Parse one console line; blank lines yield `None`
pub fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    let command = match word {
        "set" | "time" | "check" | "select" | "send" => {
            let (attr, value) = rest
                .split_once(char::is_whitespace)
                .with_context(|| format!("Usage: {} <attr> <value>", word))?;
            let attr = attr.to_string();
            let value = value.trim();

            match word {
                "set" => ConsoleCommand::Change {
                    attr,
                    input: FieldInput::Text(value.to_string()),
                },
                "time" => ConsoleCommand::Change {
                    attr,
                    input: FieldInput::parse_time(value)?,
                },
                "check" => ConsoleCommand::Change {
                    attr,
                    input: FieldInput::parse_checkbox(value)?,
                },
                "select" => ConsoleCommand::Change {
                    attr,
                    input: FieldInput::Select(value.to_string()),
                },
                _ => ConsoleCommand::Send {
                    attr,
                    value: value.to_string(),
                },
            }
        }
        "toggle" => {
            if rest.is_empty() || rest.contains(char::is_whitespace) {
                anyhow::bail!("Usage: toggle <attr>");
            }
            ConsoleCommand::Toggle {
                attr: rest.to_string(),
            }
        }
        "delete" => ConsoleCommand::Delete,
        "redraw" => ConsoleCommand::Redraw,
        "poll" => ConsoleCommand::Poll,
        "clear" => ConsoleCommand::Clear,
        "quit" | "exit" => ConsoleCommand::Quit,
        "help" | "?" => ConsoleCommand::Help,
        other => anyhow::bail!("Unknown command '{}' (try 'help')", other),
    };

    Ok(Some(command))
}

/// Everything the console needs from the current page load
struct Session {
    poll: PollHandle,
    notifier: Arc<Notifier>,
    page: Arc<TerminalPage>,
    submitter: Submitter,
}

impl Session {
    async fn execute(&self, command: ConsoleCommand) -> Result<()> {
        match command {
            ConsoleCommand::Change { attr, input } => {
                self.submitter.submit_change(&attr, &input, None, None).await?;
            }
            ConsoleCommand::Send { attr, value } => {
                self.submitter.submit_simple(&attr, &value, None).await?;
            }
            ConsoleCommand::Toggle { attr } => {
                let value = self.page.toggle_click_value(&attr)?;
                self.submitter
                    .submit_change(&attr, &FieldInput::Select(value), None, None)
                    .await?;
            }
            ConsoleCommand::Delete => {
                self.submitter.submit_delete().await?;
            }
            ConsoleCommand::Redraw => self.poll.redraw(),
            ConsoleCommand::Poll => self.poll.start_polling(),
            ConsoleCommand::Clear => self.notifier.hide_notice(),
            ConsoleCommand::Quit => self.poll.shutdown(),
            ConsoleCommand::Help => println!("{}", CONSOLE_HELP),
        }
        Ok(())
    }
}

type SessionSlot = watch::Receiver<Option<Arc<Session>>>;

/// Poll the page and print state until interrupted
pub fn watch(mut config: ClientConfig, sort: Option<String>) -> Result<()> {
    if let Some(sort) = sort {
        config.server.sort_by = sort;
        config.validate().context("Invalid sort suffix")?;
    }

    println!("Watching {}", config.server.poll_url()?);
    println!("Type 'help' for commands, Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(watch_page(config));

    // The console may still be parked on a blocking stdin read
    runtime.shutdown_timeout(Duration::from_millis(100));

    result
}

async fn watch_page(config: ClientConfig) -> Result<()> {
    let page = Arc::new(TerminalPage::new(config.fields.clone()));
    let (session_tx, session_rx) = watch::channel::<Option<Arc<Session>>>(None);

    let interrupted = Arc::new(AtomicBool::new(false));

    let console = tokio::spawn(run_console(session_rx.clone()));
    let interrupt = tokio::spawn(forward_ctrl_c(session_rx, interrupted.clone()));

    let result = loop {
        // Every page load starts from scratch: no baseline, no ETag
        let notifier = Arc::new(Notifier::new(
            Arc::new(TerminalSurface),
            config.notice.hide_after(),
        ));
        let source = match HttpSource::new(&config.server, config.polling.timeout()) {
            Ok(source) => Arc::new(source),
            Err(e) => break Err(e),
        };
        tracing::debug!("Loading page from {}", source.url());
        let state = PollState::new(AdaptiveInterval::from_settings(&config.polling));

        let submitter = match Submitter::new(
            &config.server,
            config.polling.timeout(),
            notifier.clone(),
            page.clone(),
        ) {
            Ok(submitter) => submitter,
            Err(e) => break Err(e),
        };

        let (mut poll_loop, handle) = PollLoop::new(state, source, page.clone(), notifier.clone());

        session_tx.send_replace(Some(Arc::new(Session {
            poll: handle.clone(),
            notifier,
            page: page.clone(),
            submitter: submitter.with_poll_handle(handle),
        })));

        // Ctrl+C may have landed while no session was installed
        if interrupted.load(Ordering::SeqCst) {
            break Ok(());
        }

        page.page_setup();

        match poll_loop.run().await {
            LoopExit::Reload => {
                println!("Server version changed, reloading...");
                continue;
            }
            LoopExit::Shutdown => break Ok(()),
            LoopExit::Navigate(navigation) => {
                break Err(navigation_error(&config, navigation));
            }
        }
    };

    session_tx.send_replace(None);
    console.abort();
    interrupt.abort();

    result
}

async fn run_console(sessions: SessionSlot) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::debug!("stdin closed, console disabled");
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                return;
            }
        };

        let command = match parse_console_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{:#}", e);
                continue;
            }
        };

        let session = sessions.borrow().clone();
        match session {
            Some(session) => {
                if let Err(e) = session.execute(command).await {
                    eprintln!("Error: {:#}", e);
                }
            }
            None => eprintln!("Page is reloading, try again"),
        }
    }
}

async fn forward_ctrl_c(sessions: SessionSlot, interrupted: Arc<AtomicBool>) {
    loop {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl+C, shutting down");
                interrupt(&sessions, &interrupted);
            }
            Err(e) => {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
        }
    }
}

/// Record the interrupt, then stop the current session if there is one
fn interrupt(sessions: &SessionSlot, interrupted: &AtomicBool) {
    interrupted.store(true, Ordering::SeqCst);

    match sessions.borrow().as_ref() {
        Some(session) => session.poll.shutdown(),
        None => tracing::debug!("No active session, stopping before the next page load"),
    }
}

fn navigation_error(config: &ClientConfig, navigation: Navigation) -> anyhow::Error {
    let target = config
        .server
        .navigation_url(navigation)
        .map(|url| url.to_string())
        .unwrap_or_else(|_| config.server.base_url.clone());

    match navigation {
        Navigation::Login => anyhow::anyhow!(
            "Session expired. Log in at {} and update the session cookie with 'webpilot setup'",
            target
        ),
        Navigation::Home => anyhow::anyhow!("This page no longer exists. Continue at {}", target),
    }
}

/// Fetch the page once and print its state
pub fn check_now(config: &ClientConfig) -> Result<()> {
    println!("Checking page state...");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let notifier = Notifier::new(Arc::new(TerminalSurface), config.notice.hide_after());
        let page = TerminalPage::new(config.fields.clone());
        let source = HttpSource::new(&config.server, config.polling.timeout())?;
        let mut state = PollState::new(AdaptiveInterval::from_settings(&config.polling));

        let outcome = source.fetch(None).await;
        if let CycleOutcome::Navigate(navigation) = state.apply_fetch(outcome, &page, &notifier) {
            return Err(navigation_error(config, navigation));
        }

        let version = state
            .last_version()
            .context("No valid page state received")?;

        println!();
        println!("✓ Version:      {}", version);
        if let Some(checked) = state.last_checked() {
            println!("  Checked at:   {}", checked.format("%Y-%m-%d %H:%M:%S %Z"));
        }
        if let Some(updated) = state.last_updated() {
            println!("  Updated at:   {}", updated.format("%Y-%m-%d %H:%M:%S %Z"));
        }
        if let Some(fields) = state
            .last_payload()
            .and_then(|p| p.get("data"))
            .and_then(|d| d.as_object())
        {
            println!("  Fields:       {}", fields.len());
        }
        if let Some(flash) = notifier.current_flash() {
            println!("  Flash:        {}", flash);
        }

        Ok::<(), anyhow::Error>(())
    })
}
