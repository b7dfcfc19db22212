use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// WebPilot pump client
///
/// Watches a pump page's state with adaptive polling and sends edits back
/// to the server.
#[derive(Parser, Debug)]
#[command(name = "webpilot")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (defaults to the per-user config)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a configuration file after checking the endpoint responds
    Setup {
        /// Site root, e.g. https://pumps.example.com/
        #[arg(long)]
        base_url: String,

        /// API path for the page, e.g. /api/pump/17
        #[arg(long)]
        endpoint: String,

        /// CSRF token sent with edits
        #[arg(long)]
        csrf_token: Option<String>,

        /// Cookie header value for an authenticated session
        #[arg(long)]
        session_cookie: Option<String>,

        /// Poll interval right after an edit (milliseconds)
        #[arg(long, default_value = "1000")]
        short_ms: u64,

        /// Poll interval at steady state (milliseconds)
        #[arg(long, default_value = "5000")]
        long_ms: u64,
    },
    /// Poll the page and print state as it changes
    Watch {
        /// Sort/query suffix appended to the endpoint
        #[arg(long)]
        sort: Option<String>,
    },
    /// Fetch and print the current state once
    CheckNow,
    /// Change one attribute
    Set {
        /// Attribute name
        attr: String,

        #[command(flatten)]
        value: ValueArgs,

        /// Current password, when changing `password`
        #[arg(long)]
        old_password: Option<String>,

        /// Submit to this path instead of the configured endpoint
        #[arg(long)]
        url: Option<String>,
    },
    /// Create a new object from name=value pairs
    Create {
        /// Fields as name=value
        #[arg(required = true)]
        fields: Vec<String>,

        /// Submit to this path instead of the configured endpoint
        #[arg(long)]
        url: Option<String>,
    },
    /// Delete the page's object
    Delete,
    /// Show the active configuration
    ShowConfig,
}

/// Exactly one way of giving the new value
#[derive(ClapArgs, Debug)]
#[group(required = true, multiple = false)]
pub struct ValueArgs {
    /// Text value
    #[arg(long)]
    pub value: Option<String>,

    /// Time value as H:M:S, submitted as seconds
    #[arg(long)]
    pub time: Option<String>,

    /// Checkbox value (true/false)
    #[arg(long)]
    pub checked: Option<String>,

    /// Select value
    #[arg(long)]
    pub select: Option<String>,
}
