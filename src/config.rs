use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::poll::Navigation;

/// Client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub notice: NoticeSettings,
    #[serde(default)]
    pub fields: FieldsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server and endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Site root, e.g. https://pumps.example.com/
    pub base_url: String,

    /// API path polled for state and used for edits, e.g. /api/pump/17
    pub endpoint: String,

    /// Suffix appended to the endpoint when polling (e.g. "?sort=name")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sort_by: String,

    /// Unit system flag sent with every edit
    #[serde(default = "default_units")]
    pub units: i64,

    /// Sent as X-CSRFToken on unsafe requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,

    /// Raw Cookie header value for an authenticated session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_cookie: Option<String>,

    #[serde(default = "default_site_root")]
    pub login_path: String,

    #[serde(default = "default_site_root")]
    pub home_path: String,
}

/// Adaptive polling settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingSettings {
    /// Delay between polls right after a user action (milliseconds)
    #[serde(default = "default_short_interval")]
    pub short_interval_ms: u64,

    /// Delay between polls once activity has settled (milliseconds)
    #[serde(default = "default_long_interval")]
    pub long_interval_ms: u64,

    /// Number of polls after an action before switching to the long interval
    #[serde(default = "default_count_for_long")]
    pub count_for_long: u32,

    /// Per-request timeout (milliseconds)
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

/// Transient notice settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NoticeSettings {
    #[serde(default = "default_notice_hide")]
    pub hide_ms: u64,
}

/// How individual data fields are rendered
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FieldsConfig {
    /// Fields holding a number of seconds, rendered as HH:MM:SS
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time: Vec<String>,

    /// Fields rendered as on/off toggles
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub toggles: BTreeMap<String, ToggleConfig>,
}

/// Labels for a toggle field, indexed by the field's integer value
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToggleConfig {
    pub labels: Vec<String>,

    #[serde(default = "default_true_values")]
    pub true_values: Vec<i64>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// Default values
fn default_units() -> i64 {
    -1
}

fn default_site_root() -> String {
    "/".to_string()
}

fn default_short_interval() -> u64 {
    1_000
}

fn default_long_interval() -> u64 {
    5_000
}

fn default_count_for_long() -> u32 {
    15
}

fn default_timeout() -> u64 {
    15_000
}

fn default_notice_hide() -> u64 {
    5_000
}

fn default_true_values() -> Vec<i64> {
    vec![1]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            short_interval_ms: default_short_interval(),
            long_interval_ms: default_long_interval(),
            count_for_long: default_count_for_long(),
            timeout_ms: default_timeout(),
        }
    }
}

impl PollingSettings {
    pub fn short_interval(&self) -> Duration {
        Duration::from_millis(self.short_interval_ms)
    }

    pub fn long_interval(&self) -> Duration {
        Duration::from_millis(self.long_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for NoticeSettings {
    fn default() -> Self {
        Self {
            hide_ms: default_notice_hide(),
        }
    }
}

impl NoticeSettings {
    pub fn hide_after(&self) -> Duration {
        Duration::from_millis(self.hide_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl ServerConfig {
    /// Create server settings with defaults for everything but the location
    pub fn new(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            sort_by: String::new(),
            units: default_units(),
            csrf_token: None,
            session_cookie: None,
            login_path: default_site_root(),
            home_path: default_site_root(),
        }
    }

    /// Resolve a site-relative path against the base URL
    pub fn resolve(&self, path: &str) -> Result<Url> {
        let base = Url::parse(&self.base_url).context("Invalid base URL")?;
        base.join(path)
            .with_context(|| format!("Invalid path '{}' for base URL {}", path, base))
    }

    /// URL used for edits (POST/PUT/DELETE)
    pub fn endpoint_url(&self) -> Result<Url> {
        self.resolve(&self.endpoint)
    }

    /// URL used for polling: the endpoint plus the sort suffix
    pub fn poll_url(&self) -> Result<Url> {
        let endpoint = self.endpoint_url()?;
        if self.sort_by.is_empty() {
            return Ok(endpoint);
        }

        let combined = format!("{}{}", endpoint, self.sort_by);
        Url::parse(&combined).with_context(|| format!("Invalid sort suffix: {}", self.sort_by))
    }

    /// Where a navigation request sends the user
    pub fn navigation_url(&self, navigation: Navigation) -> Result<Url> {
        match navigation {
            Navigation::Login => self.resolve(&self.login_path),
            Navigation::Home => self.resolve(&self.home_path),
        }
    }
}

impl ClientConfig {
    /// Build a configuration with default polling, notice and logging settings
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            polling: PollingSettings::default(),
            notice: NoticeSettings::default(),
            fields: FieldsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ClientConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let toml = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        // The file may hold a session cookie and CSRF token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.server.base_url).context("Invalid base URL")?;

        if url.scheme() != "https" && url.scheme() != "http" {
            anyhow::bail!("Base URL must use http or https (got: {})", url.scheme());
        }

        if url.scheme() == "http" {
            tracing::warn!("Base URL is not HTTPS; session cookie and CSRF token travel in clear text");
        }

        if self.server.endpoint.is_empty() {
            anyhow::bail!("Endpoint must not be empty");
        }

        self.server.poll_url()?;

        let polling = &self.polling;
        if polling.short_interval_ms == 0 {
            anyhow::bail!("Short poll interval must be greater than zero");
        }

        if polling.long_interval_ms < polling.short_interval_ms {
            anyhow::bail!(
                "Long poll interval ({} ms) must not be shorter than the short interval ({} ms)",
                polling.long_interval_ms,
                polling.short_interval_ms
            );
        }

        if polling.count_for_long == 0 {
            anyhow::bail!("count_for_long must be at least 1");
        }

        if polling.timeout_ms == 0 {
            anyhow::bail!("Request timeout must be greater than zero");
        }

        for (name, toggle) in &self.fields.toggles {
            if toggle.labels.is_empty() {
                anyhow::bail!("Toggle field '{}' needs at least one label", name);
            }
        }

        Ok(())
    }
}

/// Get the per-user config file path
pub fn get_config_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "webpilot")
        .context("Could not determine config directory")?;

    Ok(dirs.config_dir().join("client.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    fn sample_config() -> ClientConfig {
        ClientConfig::new(ServerConfig::new("https://pumps.example.com/", "/api/pump/17"))
    }

    #[test]
    fn client_config_accepts_https() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn client_config_rejects_other_schemes() {
        let mut config = sample_config();
        config.server.base_url = "ftp://pumps.example.com/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn client_config_rejects_long_shorter_than_short() {
        let mut config = sample_config();
        config.polling.short_interval_ms = 5_000;
        config.polling.long_interval_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn client_config_rejects_zero_threshold() {
        let mut config = sample_config();
        config.polling.count_for_long = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn polling_settings_default_values() {
        let polling = PollingSettings::default();
        assert_eq!(polling.short_interval(), Duration::from_secs(1));
        assert_eq!(polling.long_interval(), Duration::from_secs(5));
        assert_eq!(polling.count_for_long, 15);
        assert_eq!(polling.timeout(), Duration::from_secs(15));
    }

    #[test]
    fn poll_url_appends_sort_suffix() {
        let mut config = sample_config();
        config.server.sort_by = "?sort=-last_seen".to_string();

        let url = config.server.poll_url().unwrap();
        assert_eq!(url.as_str(), "https://pumps.example.com/api/pump/17?sort=-last_seen");
        assert_eq!(
            config.server.endpoint_url().unwrap().as_str(),
            "https://pumps.example.com/api/pump/17"
        );
    }

    #[test]
    fn navigation_resolves_against_site_root() {
        let mut config = sample_config();
        config.server.login_path = "/accounts/login/".to_string();

        assert_eq!(
            config.server.navigation_url(Navigation::Login).unwrap().as_str(),
            "https://pumps.example.com/accounts/login/"
        );
        assert_eq!(
            config.server.navigation_url(Navigation::Home).unwrap().as_str(),
            "https://pumps.example.com/"
        );
    }

    #[test]
    fn load_applies_defaults_for_missing_sections() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("client.toml");
        file.write_str(
            r#"
[server]
base_url = "https://pumps.example.com/"
endpoint = "/api/pump/17"

[fields]
time = ["runtime"]

[fields.toggles.pump_on]
labels = ["Off", "On"]
"#,
        )
        .unwrap();

        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.server.units, -1);
        assert_eq!(config.polling.count_for_long, 15);
        assert_eq!(config.notice.hide_ms, 5_000);
        assert_eq!(config.fields.time, vec!["runtime".to_string()]);
        assert_eq!(config.fields.toggles["pump_on"].true_values, vec![1]);
    }

    #[test]
    fn save_then_load_preserves_server_settings() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("nested").child("client.toml");

        let mut config = sample_config();
        config.server.csrf_token = Some("tok".to_string());
        config.save(file.path()).unwrap();

        file.assert(predicate::path::exists());
        file.assert(predicate::str::contains("endpoint = \"/api/pump/17\""));

        let loaded = ClientConfig::load(file.path()).unwrap();
        assert_eq!(loaded.server.csrf_token.as_deref(), Some("tok"));
        assert_eq!(loaded.server.endpoint, "/api/pump/17");
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[server\nbase_url = 1").unwrap();
        assert!(ClientConfig::load(file.path()).is_err());
    }
}
