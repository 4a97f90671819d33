//! Configuration for the air-quality bot.
//!
//! Everything a run needs (endpoints, credentials, limits, paths) lives in
//! [`Config`] and is handed to each component when it is constructed.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Air-quality data source
    pub source: SourceConfig,

    /// Report formatting
    pub report: ReportConfig,

    /// Change detection between runs
    pub change_detection: ChangeDetectionConfig,

    /// Screenshot capture of the dashboard map
    pub screenshot: ScreenshotConfig,

    /// Destination platforms
    pub publish: PublishConfig,

    /// Operator alerting
    pub telegram: Option<TelegramConfig>,

    /// Path for storing the sensor snapshot and run statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aire-bot");

        Self {
            source: SourceConfig::default(),
            report: ReportConfig::default(),
            change_detection: ChangeDetectionConfig::default(),
            screenshot: ScreenshotConfig::default(),
            publish: PublishConfig::default(),
            telegram: None,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist. Environment overrides are applied last.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            serde_json::from_str::<Config>(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Save configuration to `config_path`.
    pub fn save_to(&self, config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aire-bot")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.screenshot.output_dir)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Location of the persisted sensor snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_path.join("sensors.json")
    }

    /// Location of the persisted run statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Overlay credentials from the environment.
    ///
    /// `lookup` is injected so tests do not have to touch the process env.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("AIRE_TWITTER_TOKEN") {
            self.publish
                .twitter
                .get_or_insert_with(TwitterConfig::default)
                .access_token = token;
        }
        if let Some(handle) = lookup("AIRE_BLUESKY_HANDLE") {
            self.publish
                .bluesky
                .get_or_insert_with(BlueskyConfig::default)
                .handle = handle;
        }
        if let Some(password) = lookup("AIRE_BLUESKY_PASSWORD") {
            self.publish
                .bluesky
                .get_or_insert_with(BlueskyConfig::default)
                .app_password = password;
        }
        if let Some(token) = lookup("AIRE_MASTODON_TOKEN") {
            self.publish
                .mastodon
                .get_or_insert_with(MastodonConfig::default)
                .access_token = token;
        }
        if let Some(token) = lookup("AIRE_TELEGRAM_TOKEN") {
            self.telegram
                .get_or_insert_with(TelegramConfig::default)
                .bot_token = token;
        }
        if let Some(chat_id) = lookup("AIRE_TELEGRAM_CHAT_ID") {
            self.telegram
                .get_or_insert_with(TelegramConfig::default)
                .chat_id = chat_id;
        }
    }

    /// Copy of the configuration with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(ref mut t) = copy.publish.twitter {
            t.access_token = redact(&t.access_token);
        }
        if let Some(ref mut b) = copy.publish.bluesky {
            b.app_password = redact(&b.app_password);
        }
        if let Some(ref mut m) = copy.publish.mastodon {
            m.access_token = redact(&m.access_token);
        }
        if let Some(ref mut t) = copy.telegram {
            t.bot_token = redact(&t.bot_token);
        }
        copy
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}

/// Air-quality API endpoint and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub endpoint: String,
    /// Trailing window queried on each run, in minutes
    pub window_minutes: i64,
    pub retry: RetryConfig,
    /// Per-request timeout
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://rald-dev.greenbeep.com/api/v1/aqi".to_string(),
            window_minutes: 30,
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Exponential backoff for transient HTTP failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of requests, including the first one
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff_factor * 2^(n-1)`
    pub backoff_factor_ms: u64,
    #[serde(with = "duration_serde")]
    pub max_backoff: Duration,
    pub retry_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff_factor_ms: 1000,
            max_backoff: Duration::from_secs(120),
            retry_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

/// Text layout of the published report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub header: String,
    pub footer: String,
    /// IANA timezone used for the timestamp under the header
    pub timezone: String,
    /// Character budget used when no platform limit applies
    pub chunk_limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            header: "Koa nde aire? #AireLibre".to_string(),
            footer: "Más info en airelib.re".to_string(),
            timezone: "America/Asuncion".to_string(),
            chunk_limit: 250,
        }
    }
}

impl ReportConfig {
    /// Resolve the configured timezone, defaulting to UTC when unknown.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::Tz::UTC)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeDetectionConfig {
    /// Also report sensors that came online. Off by default: historically
    /// only disappearing sensors were ever reported.
    pub track_new_sensors: bool,
}

/// Headless browser capture of the dashboard map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    pub url: String,
    /// Chromium-compatible binary
    pub browser: String,
    pub viewport: (u32, u32),
    /// Crop rectangle as (left, top, right, bottom)
    pub crop: (u32, u32, u32, u32),
    #[serde(with = "duration_serde")]
    pub settle: Duration,
    pub latitude: f64,
    pub longitude: f64,
    pub output_dir: PathBuf,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://airelib.re".to_string(),
            browser: "chromium".to_string(),
            viewport: (900, 900),
            crop: (200, 170, 700, 550),
            settle: Duration::from_secs(6),
            latitude: -25.250,
            longitude: -57.536,
            output_dir: PathBuf::from("screenshots"),
        }
    }
}

/// Destination platforms, posted to in this order: Twitter, Bluesky, Mastodon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Post every chunk as a reply chain instead of only the first one
    pub thread_replies: bool,
    pub twitter: Option<TwitterConfig>,
    pub bluesky: Option<BlueskyConfig>,
    pub mastodon: Option<MastodonConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub api_base: String,
    /// OAuth2 user-context token with tweet.write and media.write scopes
    pub access_token: String,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.x.com".to_string(),
            access_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlueskyConfig {
    pub pds_url: String,
    pub handle: String,
    pub app_password: String,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            pds_url: "https://bsky.social".to_string(),
            handle: String::new(),
            app_password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MastodonConfig {
    pub instance_url: String,
    pub access_token: String,
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            instance_url: "https://mastodon.social".to_string(),
            access_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
    /// Mentioned in network-down alerts, e.g. "@operator"
    pub network_down_user: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            bot_token: String::new(),
            chat_id: String::new(),
            network_down_user: String::new(),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.source.window_minutes, 30);
        assert_eq!(config.source.retry.max_attempts, 8);
        assert_eq!(config.source.retry.retry_statuses, vec![429, 500, 502, 503, 504]);
        assert_eq!(config.report.chunk_limit, 250);
        assert!(!config.change_detection.track_new_sensors);
        assert!(!config.publish.thread_replies);
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"source": {"window_minutes": 60}}"#).unwrap();
        assert_eq!(config.source.window_minutes, 60);
        assert_eq!(config.source.retry.max_attempts, 8);
        assert_eq!(config.report.header, "Koa nde aire? #AireLibre");
    }

    #[test]
    fn test_env_overrides_credentials() {
        let env: HashMap<&str, &str> = [
            ("AIRE_TWITTER_TOKEN", "tw"),
            ("AIRE_TELEGRAM_TOKEN", "tg"),
            ("AIRE_TELEGRAM_CHAT_ID", "42"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.publish.twitter.as_ref().unwrap().access_token, "tw");
        let telegram = config.telegram.as_ref().unwrap();
        assert_eq!(telegram.bot_token, "tg");
        assert_eq!(telegram.chat_id, "42");
        assert!(config.publish.bluesky.is_none());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = Config::default();
        config.apply_env(|k| (k == "AIRE_MASTODON_TOKEN").then(|| "secret".to_string()));

        let shown = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("********"));
    }

    #[test]
    fn test_save_then_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aire-bot").join("config.json");

        let mut config = Config::default();
        config.source.window_minutes = 45;
        config.publish.thread_replies = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.source.window_minutes, 45);
        assert!(loaded.publish.thread_replies);
        assert_eq!(loaded.source.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let report = ReportConfig {
            timezone: "Mars/Olympus".to_string(),
            ..ReportConfig::default()
        };
        assert_eq!(report.tz(), chrono_tz::Tz::UTC);
        assert_eq!(ReportConfig::default().tz(), chrono_tz::America::Asuncion);
    }
}
