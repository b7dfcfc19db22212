use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

use super::fetcher::PollSource;
use super::state::{CycleOutcome, Navigation, PollState};
use crate::hooks::PageHooks;
use crate::notice::Notifier;

/// Requests sent to a running poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Cancel the pending poll and schedule a new one at the current interval
    Restart,
    /// A submission went through: reset the interval and poll right away
    SubmissionAccepted,
    /// A submission went through: reset the interval, keep the schedule
    ResetInterval,
    /// Render the stored baseline again
    Redraw,
    Shutdown,
}

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq)]
pub enum LoopExit {
    /// The server version changed; all page state must be rebuilt
    Reload,
    /// Session expired or resource gone
    Navigate(Navigation),
    Shutdown,
}

/// Cloneable handle for steering a running [`PollLoop`]
#[derive(Clone)]
pub struct PollHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PollHandle {
    /// Cancel any pending poll and schedule a fresh one
    pub fn start_polling(&self) {
        self.send(Command::Restart);
    }

    pub fn submission_accepted(&self) {
        self.send(Command::SubmissionAccepted);
    }

    pub fn reset_interval(&self) {
        self.send(Command::ResetInterval);
    }

    pub fn redraw(&self) {
        self.send(Command::Redraw);
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    #[cfg(test)]
    pub(crate) fn for_test(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            tracing::debug!("Poll loop already stopped, dropping {:?}", command);
        }
    }
}

/// Serial fetch-and-reconcile loop against one endpoint
///
/// Only one poll request is ever in flight: the next one is scheduled after
/// the previous one completes. Commands that arrive mid-request bump the
/// request generation so the late response is dropped instead of applied.
pub struct PollLoop {
    state: PollState,
    source: Arc<dyn PollSource>,
    hooks: Arc<dyn PageHooks>,
    notifier: Arc<Notifier>,
    rx: mpsc::UnboundedReceiver<Command>,
}

impl PollLoop {
    pub fn new(
        state: PollState,
        source: Arc<dyn PollSource>,
        hooks: Arc<dyn PageHooks>,
        notifier: Arc<Notifier>,
    ) -> (Self, PollHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poll_loop = Self {
            state,
            source,
            hooks,
            notifier,
            rx,
        };
        (poll_loop, PollHandle { tx })
    }

    #[cfg(test)]
    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Run until navigation, reload or shutdown
    ///
    /// The first poll goes out immediately.
    pub async fn run(&mut self) -> LoopExit {
        tracing::info!(page_id = %self.state.page_id(), "Starting poll loop");
        let mut delay = Duration::ZERO;

        loop {
            if let Some(exit) = self.schedule_next(delay).await {
                return exit;
            }

            let generation = self.state.begin_request();
            let token = self.state.validation_token().map(str::to_owned);
            let source = Arc::clone(&self.source);
            let fetch = async move { source.fetch(token.as_deref()).await };
            tokio::pin!(fetch);

            let mut override_delay = None;
            let outcome = loop {
                tokio::select! {
                    outcome = &mut fetch => break outcome,
                    Some(command) = self.rx.recv() => match command {
                        Command::Shutdown => return LoopExit::Shutdown,
                        Command::Restart => {
                            self.state.supersede();
                            override_delay = Some(sooner(override_delay, self.state.interval()));
                        }
                        Command::SubmissionAccepted => {
                            self.state.note_submission();
                            self.state.supersede();
                            override_delay = Some(Duration::ZERO);
                        }
                        Command::ResetInterval => self.state.note_submission(),
                        Command::Redraw => self.redraw(),
                    },
                }
            };

            if self.state.is_current(generation) {
                match self
                    .state
                    .apply_fetch(outcome, self.hooks.as_ref(), &self.notifier)
                {
                    CycleOutcome::Continue => {}
                    CycleOutcome::Reload => return LoopExit::Reload,
                    CycleOutcome::Navigate(navigation) => return LoopExit::Navigate(navigation),
                }
            } else {
                tracing::debug!(generation, "Discarding superseded poll response");
            }

            delay = override_delay.unwrap_or_else(|| self.state.interval());
        }
    }

    /// Wait `delay` before the next poll, handling commands meanwhile
    async fn schedule_next(&mut self, delay: Duration) -> Option<LoopExit> {
        tracing::trace!(
            polls = self.state.consecutive_polls(),
            "Next poll in {} ms",
            delay.as_millis()
        );
        let timer = sleep(delay);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => return None,
                Some(command) = self.rx.recv() => match command {
                    Command::Shutdown => return Some(LoopExit::Shutdown),
                    Command::Restart => {
                        timer.as_mut().reset(Instant::now() + self.state.interval());
                    }
                    Command::SubmissionAccepted => {
                        self.state.note_submission();
                        timer.as_mut().reset(Instant::now());
                    }
                    Command::ResetInterval => self.state.note_submission(),
                    Command::Redraw => self.redraw(),
                },
            }
        }
    }

    fn redraw(&self) {
        if let Err(e) = self.state.redraw(self.hooks.as_ref()) {
            tracing::error!("Redraw failed: {:#}", e);
            self.notifier.show_notice(&format!("Exception: {:#}", e));
        }
    }
}

/// Earliest of a pending override and a new delay
fn sooner(pending: Option<Duration>, delay: Duration) -> Duration {
    pending.map_or(delay, |pending| pending.min(delay))
}
