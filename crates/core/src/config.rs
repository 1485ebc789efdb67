use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Key lookup with optional profile prefix: tries `{PROFILE}_{KEY}` first,
/// falls back to `{KEY}`.
struct ProfiledEnv<'a> {
    profile: &'a str,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl ProfiledEnv<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = (self.lookup)(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        (self.lookup)(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.opt(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub archiver: ArchiverConfig,
    pub queue: QueueConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `LICARCH_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_opt("LICARCH_PROFILE").unwrap_or_default();
        Self::from_lookup(&profile, &env_opt)
    }

    /// Build config from an arbitrary key lookup (used for the process
    /// environment and for tests).
    pub fn from_lookup(profile: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let profile = profile.to_uppercase();
        let env = ProfiledEnv {
            profile: &profile,
            lookup,
        };
        Self {
            archiver: ArchiverConfig::from_env(&env),
            queue: QueueConfig::from_env(&env),
            profile,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() {
            "default"
        } else {
            &self.profile
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  archiver:  log_dir={}, extension=.{}, db={}, tracker={}",
            self.archiver.log_dir.display(),
            self.archiver.log_extension,
            self.archiver.db_path.display(),
            self.archiver.tracker_path.display()
        );
        tracing::info!(
            "  queue:     {}:{}/{} queue={}",
            self.queue.host,
            self.queue.port,
            self.queue.db,
            self.queue.queue_name
        );
    }
}

// ── Archiver ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiverConfig {
    /// Directory scanned for vendor log files.
    pub log_dir: PathBuf,
    /// File extension filter, without the leading dot.
    pub log_extension: String,
    /// SQLite archive location.
    pub db_path: PathBuf,
    /// JSON record of fully ingested files.
    pub tracker_path: PathBuf,
}

impl ArchiverConfig {
    fn from_env(env: &ProfiledEnv<'_>) -> Self {
        let extension = env.or("LOG_EXTENSION", "log");
        Self {
            log_dir: PathBuf::from(env.or("LOG_DIRECTORY", "logs")),
            log_extension: extension.trim_start_matches('.').to_string(),
            db_path: PathBuf::from(env.or("ARCHIVE_DB_PATH", "data/license_logs.db")),
            tracker_path: PathBuf::from(env.or("PARSED_TRACKER", "data/parsed_files.json")),
        }
    }
}

// ── Queue (Redis list) ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub queue_name: String,
    pub connect_timeout_secs: u64,
    pub pop_timeout_secs: u64,
    pub backoff_secs: u64,
}

impl QueueConfig {
    fn from_env(env: &ProfiledEnv<'_>) -> Self {
        Self {
            host: env.or("REDIS_HOST", "127.0.0.1"),
            port: env.parsed("REDIS_PORT", 6379),
            db: env.parsed("REDIS_DB", 0),
            queue_name: env.or("REDIS_QUEUE", "license_log_queue"),
            connect_timeout_secs: env.parsed("REDIS_CONNECT_TIMEOUT_SECS", 2),
            pop_timeout_secs: env.parsed("QUEUE_POP_TIMEOUT_SECS", 5),
            backoff_secs: env.parsed("QUEUE_BACKOFF_SECS", 5),
        }
    }

    pub fn connection_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_secs(self.pop_timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig::from_env(&ProfiledEnv {
            profile: "",
            lookup: &|_: &str| None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(profile: &str, pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(profile, &move |key: &str| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from("", &[]);
        assert_eq!(config.profile_label(), "default");
        assert_eq!(config.archiver.log_dir, PathBuf::from("logs"));
        assert_eq!(config.archiver.log_extension, "log");
        assert_eq!(config.queue.host, "127.0.0.1");
        assert_eq!(config.queue.port, 6379);
        assert_eq!(config.queue.db, 0);
        assert_eq!(config.queue.queue_name, "license_log_queue");
        assert_eq!(config.queue.pop_timeout(), Duration::from_secs(5));
        assert_eq!(config.queue.backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_overrides_and_connection_url() {
        let config = config_from(
            "",
            &[
                ("REDIS_HOST", "redis.internal"),
                ("REDIS_PORT", "6380"),
                ("REDIS_DB", "3"),
                ("REDIS_QUEUE", "lic"),
                ("LOG_EXTENSION", ".txt"),
            ],
        );
        assert_eq!(config.queue.connection_url(), "redis://redis.internal:6380/3");
        assert_eq!(config.queue.queue_name, "lic");
        assert_eq!(config.archiver.log_extension, "txt");
    }

    #[test]
    fn test_unparseable_number_falls_back() {
        let config = config_from("", &[("REDIS_PORT", "not-a-port"), ("REDIS_DB", "")]);
        assert_eq!(config.queue.port, 6379);
        assert_eq!(config.queue.db, 0);
    }

    #[test]
    fn test_profile_prefix_wins_over_plain_key() {
        let config = config_from(
            "prod",
            &[
                ("REDIS_HOST", "localhost"),
                ("PROD_REDIS_HOST", "redis.prod"),
                ("LOG_DIRECTORY", "/var/log/flexlm"),
            ],
        );
        assert_eq!(config.profile_label(), "PROD");
        assert_eq!(config.queue.host, "redis.prod");
        assert_eq!(config.archiver.log_dir, PathBuf::from("/var/log/flexlm"));
    }

    #[test]
    fn test_queue_config_default() {
        let queue = QueueConfig::default();
        assert_eq!(queue.connection_url(), "redis://127.0.0.1:6379/0");
        assert_eq!(queue.connect_timeout(), Duration::from_secs(2));
    }
}
