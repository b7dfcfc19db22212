use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

use crate::config::{ClientConfig, LoggingConfig, PollingSettings, ServerConfig};
use crate::poll::{FetchFailure, FetchOutcome, HttpSource, PollSource};

use super::utils::{config_path, init_logging};

/// Options gathered from `webpilot setup`
pub struct SetupOptions {
    pub base_url: String,
    pub endpoint: String,
    pub csrf_token: Option<String>,
    pub session_cookie: Option<String>,
    pub short_ms: u64,
    pub long_ms: u64,
}

/// Write a client configuration after checking the endpoint answers
pub fn setup(options: SetupOptions, explicit_path: Option<&Path>, verbose: bool) -> Result<()> {
    init_logging(verbose, &LoggingConfig::default())?;

    println!("WebPilot Client - Setup");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let mut server = ServerConfig::new(options.base_url, options.endpoint);
    server.csrf_token = options.csrf_token;
    server.session_cookie = options.session_cookie;

    let mut config = ClientConfig::new(server);
    config.polling = PollingSettings {
        short_interval_ms: options.short_ms,
        long_interval_ms: options.long_ms,
        ..PollingSettings::default()
    };

    config.validate().context("Invalid configuration")?;

    println!("Testing connection to {}...", config.server.poll_url()?);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(check_endpoint(&config))?;

    let path = config_path(explicit_path)?;
    config.save(&path)?;
    println!("✓ Configuration saved to: {}", path.display());

    println!();
    println!("Client configured successfully!");
    println!();
    println!("Next steps:");
    println!("  webpilot watch");
    println!();
    println!(
        "The client polls every {} ms after a change and every {} ms once things settle.",
        config.polling.short_interval_ms, config.polling.long_interval_ms
    );

    Ok(())
}

/// One unconditional fetch; fails unless the endpoint returns valid page state
async fn check_endpoint(config: &ClientConfig) -> Result<()> {
    let source = HttpSource::new(&config.server, config.polling.timeout())?;

    match source.fetch(None).await {
        FetchOutcome::Fresh { payload, etag } => {
            if payload.get("version").is_none() || payload.get("data").is_none() {
                anyhow::bail!("Endpoint answered, but without 'version' and 'data'");
            }
            println!("✓ Endpoint reachable, page state is valid");
            if etag.is_none() {
                println!("  Note: no ETag header, every poll will download the full state");
            }
            Ok(())
        }
        FetchOutcome::NotModified => {
            println!("✓ Endpoint reachable");
            Ok(())
        }
        FetchOutcome::Failed(FetchFailure::Unauthorized) => {
            anyhow::bail!("Endpoint requires login; pass --session-cookie")
        }
        FetchOutcome::Failed(failure) => {
            Err(anyhow::anyhow!("{}", failure)).context("Failed to reach the endpoint")
        }
    }
}

/// Print the active configuration with secrets masked
pub fn show_config(config: &ClientConfig) -> Result<()> {
    println!("Current Client Configuration");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let shown = redacted(config);
    let text = toml::to_string_pretty(&shown).context("Failed to serialize config")?;
    println!("{}", text);

    println!("Poll URL: {}", config.server.poll_url()?);
    println!(
        "Intervals: {} / {} after {} polls",
        format_interval(config.polling.short_interval()),
        format_interval(config.polling.long_interval()),
        config.polling.count_for_long
    );

    Ok(())
}

fn redacted(config: &ClientConfig) -> ClientConfig {
    let mut shown = config.clone();
    if shown.server.csrf_token.is_some() {
        shown.server.csrf_token = Some("********".to_string());
    }
    if shown.server.session_cookie.is_some() {
        shown.server.session_cookie = Some("********".to_string());
    }
    shown
}

fn format_interval(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}ms", ms)
    }
}
