use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use validator::Validate;
use watch_store::StorageConfig;

/// Errors raised while building the configuration. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid YAML for this schema
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A value is outside its allowed range
    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// A required environment variable is missing or empty
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
}

/// How the target page is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    /// Fetch the page itself and read its text
    #[serde(alias = "playwright")]
    Page,
    /// Query a dedicated endpoint, falling back to the page on failure
    Endpoint,
}

/// Complete watcher configuration.
///
/// Every section has defaults, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct WatchConfig {
    /// Page being watched
    #[validate(nested)]
    pub target: TargetConfig,
    /// Text matchers
    pub matchers: MatchersConfig,
    /// Check cadence
    #[validate(nested)]
    pub schedule: ScheduleConfig,
    /// Rate limits, timeouts and backoff
    #[validate(nested)]
    pub limits: LimitsConfig,
    /// Notification triggers and email settings
    #[validate(nested)]
    pub notify: NotifyConfig,
    /// Persistence
    pub storage: StorageConfig,
    /// Runtime settings for the checker
    pub runtime: RuntimeConfig,
}

/// Page being watched
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct TargetConfig {
    /// Page URL
    #[validate(url)]
    pub url: String,
    /// Checking strategy
    pub mode: CheckMode,
    /// Endpoint queried in [`CheckMode::Endpoint`]
    #[validate(url)]
    pub endpoint_url: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: "https://www.terminland.de/DAAMuenchenDeutschkurse/".to_string(),
            mode: CheckMode::Page,
            endpoint_url: None,
        }
    }
}

/// Text matchers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchersConfig {
    /// Case-insensitive phrases meaning "nothing free"
    pub unavailable_text_substrings: Vec<String>,
}

impl Default for MatchersConfig {
    fn default() -> Self {
        Self {
            unavailable_text_substrings: vec!["keine freien Termine".to_string()],
        }
    }
}

/// Check cadence
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Nominal delay between checks
    #[validate(range(min = 1))]
    pub interval_seconds: u64,
    /// Random spread applied to the interval, in percent
    #[validate(range(max = 100))]
    pub jitter_percent: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 420,
            jitter_percent: 20,
        }
    }
}

/// Rate limits, timeouts and backoff
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct LimitsConfig {
    /// Upper bound of checks in any trailing hour; 0 disables the limit
    pub max_checks_per_hour: u32,
    /// Timeout for reaching the page
    #[validate(range(min = 1))]
    pub navigation_timeout_ms: u64,
    /// Timeout for reading the page content
    #[validate(range(min = 1))]
    pub selector_timeout_ms: u64,
    /// First backoff step after a failure
    #[validate(range(min = 1))]
    pub backoff_base_seconds: u64,
    /// Backoff ceiling
    #[validate(range(min = 1))]
    pub max_backoff_seconds: u64,
    /// How long to stop checking once the site blocks us, at most one year
    #[validate(range(max = 8760))]
    pub blocked_cooldown_hours: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_checks_per_hour: 12,
            navigation_timeout_ms: 30_000,
            selector_timeout_ms: 15_000,
            backoff_base_seconds: 60,
            max_backoff_seconds: 900,
            blocked_cooldown_hours: 12,
        }
    }
}

impl LimitsConfig {
    /// Navigation timeout as a duration
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Content read timeout as a duration
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }
}

/// Notification triggers and email settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct NotifyConfig {
    /// Notify when the page turns available
    pub on_available: bool,
    /// Notify whenever available content changes
    pub on_change: bool,
    /// Email delivery
    #[validate(nested)]
    pub email: EmailConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            on_available: true,
            on_change: false,
            email: EmailConfig::default(),
        }
    }
}

/// Email delivery settings. Credentials are read from the named environment variables.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct EmailConfig {
    /// SMTP relay host
    #[validate(length(min = 1))]
    pub smtp_host: String,
    /// SMTP relay port
    pub smtp_port: u16,
    /// Upgrade the connection with STARTTLS
    pub use_tls: bool,
    /// Sender address
    #[validate(email)]
    pub from: String,
    /// Recipient address
    #[validate(email)]
    pub to: String,
    /// Environment variable holding the SMTP user name
    pub username_env: String,
    /// Environment variable holding the SMTP password
    pub password_env: String,
    /// Maximum number of slots listed in one email
    pub max_slots_in_email: usize,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            use_tls: true,
            from: "watcher@example.com".to_string(),
            to: "me@example.com".to_string(),
            username_env: "SMTP_USER".to_string(),
            password_env: "SMTP_PASS".to_string(),
            max_slots_in_email: 10,
        }
    }
}

/// Runtime settings for the checker
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Where raw HTML of blocked/failed checks is kept
    pub html_dir: String,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            html_dir: "./data/html".to_string(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
        }
    }
}

impl WatchConfig {
    /// Loads the config file at `path` on top of the defaults and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parses YAML on top of the defaults and validates the result.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: WatchConfig = if content.trim().is_empty() {
            WatchConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }
}

/// Reads an environment variable that must be present and non-empty.
pub fn require_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnv(key.to_string())),
    }
}
