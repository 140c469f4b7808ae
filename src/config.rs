//! Configuration loader and validator for the tag bot.
use crate::model::normalize_handle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub delivery_timeout_ms: u64,
    pub delivery_attempts: u32,
    pub retry_backoff_ms: u64,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    #[serde(default)]
    pub repost_tagged_messages: bool,
    #[serde(default)]
    pub watch_list: Vec<WatchEntry>,
}

/// A user who receives a private copy of messages mentioning them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchEntry {
    pub handle: String,
    pub user_id: i64,
}

/// Retry/timeout policy applied to each private notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl DeliveryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(6);
        self.backoff.saturating_mul(1 << shift)
    }
}

/// Read-only watch-list, built once from configuration.
///
/// Handles are stored normalized (no `@`, lower-cased) so lookups can compare
/// them directly with resolved mention keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    entries: Vec<WatchEntry>,
}

impl WatchList {
    pub fn new(entries: impl IntoIterator<Item = WatchEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| WatchEntry {
                handle: normalize_handle(&e.handle),
                user_id: e.user_id,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[WatchEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            timeout: Duration::from_millis(self.app.delivery_timeout_ms),
            attempts: self.app.delivery_attempts,
            backoff: Duration::from_millis(self.app.retry_backoff_ms),
        }
    }

    pub fn watch_list(&self) -> WatchList {
        WatchList::new(self.telegram.watch_list.iter().cloned())
    }

    pub fn default_database_url(&self) -> String {
        format!("sqlite://{}/tagbot.db", self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.delivery_timeout_ms == 0 {
        return Err(ConfigError::Invalid("app.delivery_timeout_ms must be > 0"));
    }
    if cfg.app.delivery_attempts == 0 {
        return Err(ConfigError::Invalid("app.delivery_attempts must be >= 1"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }

    for entry in &cfg.telegram.watch_list {
        let handle = normalize_handle(&entry.handle);
        if handle.is_empty() {
            return Err(ConfigError::Invalid("telegram.watch_list.handle must be non-empty"));
        }
        if handle.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "telegram.watch_list.handle must not contain whitespace",
            ));
        }
    }

    Ok(())
}

/// Returns a sample configuration that passes validation.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  delivery_timeout_ms: 5000
  delivery_attempts: 3
  retry_backoff_ms: 500

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  # Delete tagged messages and repost them with the mention list appended.
  repost_tagged_messages: false
  # Users that get a private copy whenever a message mentions them.
  watch_list:
    - handle: "@Alice"
      user_id: 123456789
    - handle: "bob"
      user_id: 987654321
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert!(!cfg.telegram.repost_tagged_messages);
    }

    #[test]
    fn invalid_bot_token() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.bot_token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("telegram.bot_token")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_delivery_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.delivery_attempts = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("delivery_attempts")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.delivery_timeout_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_watch_list_handles() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.watch_list[0].handle = "@".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.watch_list[1].handle = "bob smith".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn watch_list_is_normalized() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        let list = cfg.watch_list();
        let handles: Vec<&str> = list.entries().iter().map(|e| e.handle.as_str()).collect();
        assert_eq!(handles, vec!["alice", "bob"]);
        assert_eq!(list.entries()[0].user_id, 123456789);
    }

    #[test]
    fn watch_list_defaults_to_empty() {
        let yaml = r#"app:
  data_dir: "./data"
  delivery_timeout_ms: 1000
  delivery_attempts: 1
  retry_backoff_ms: 0
telegram:
  bot_token: "t"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert!(cfg.watch_list().is_empty());
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = DeliveryPolicy {
            timeout: Duration::from_secs(1),
            attempts: 4,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.telegram.watch_list.len(), 2);
        assert_eq!(cfg.delivery_policy().attempts, 3);
    }
}
