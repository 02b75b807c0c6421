//! `roadmap.toml` configuration.
//!
//! Settings are layered: file, then environment (`ROADMAP_DB_PATH`,
//! `ROADMAP_PORT`), then CLI flags applied by the command handlers.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::db::RetryPolicy;
use crate::board::merge::MergePolicy;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "roadmap.toml";

pub const ENV_DB_PATH: &str = "ROADMAP_DB_PATH";
pub const ENV_PORT: &str = "ROADMAP_PORT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a locally served front-end.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3142
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// How long SQLite waits on a locked database before reporting busy.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Transaction retries after a busy error.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".roadmap/roadmap.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    25
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl StorageSection {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

/// The complete roadmap.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RoadmapToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub merge: MergePolicy,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl RoadmapToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse roadmap.toml")
    }

    /// Load an explicit config file, or `roadmap.toml` from the working
    /// directory if present, or defaults. Environment overrides are applied.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load(path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `ROADMAP_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.is_empty()) {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: {}", ENV_PORT, port))?;
        }
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize roadmap.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0: the OS will pick a random port".to_string());
        }
        if self.storage.db_path.as_os_str().is_empty() {
            warnings.push("storage.db_path is empty".to_string());
        }
        if self.storage.busy_timeout_ms == 0 {
            warnings.push(
                "storage.busy_timeout_ms is 0: every lock collision becomes a retry".to_string(),
            );
        }
        if self.storage.max_retries > 10 {
            warnings.push(format!(
                "storage.max_retries = {} is unusually high",
                self.storage.max_retries
            ));
        }
        if self.logging.filter.trim().is_empty() {
            warnings.push("logging.filter is empty; falling back to 'info'".to_string());
        }
        if self.merge.allow_duplicate_target {
            warnings.push(
                "merge.allow_duplicate_target is on: merge chains will not be flattened"
                    .to_string(),
            );
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = RoadmapToml::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3142);
        assert!(!config.server.dev_mode);
        assert_eq!(config.storage.db_path, PathBuf::from(".roadmap/roadmap.db"));
        assert_eq!(config.storage.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.storage.retry_policy(), RetryPolicy::default());
        assert!(!config.merge.allow_duplicate_target);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = RoadmapToml::parse(
            r#"
            [server]
            port = 8080

            [merge]
            allow_duplicate_target = true

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.merge.allow_duplicate_target);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.filter, "info");
        assert_eq!(config.storage.max_retries, 3);
    }

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(RoadmapToml::parse("").unwrap(), RoadmapToml::default());
    }

    #[test]
    fn test_parse_rejects_bad_format() {
        let err = RoadmapToml::parse("[logging]\nformat = \"xml\"\n").unwrap_err();
        assert!(err.to_string().contains("roadmap.toml"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roadmap.toml");
        let mut config = RoadmapToml::default();
        config.storage.db_path = PathBuf::from("/var/lib/roadmap.db");
        config.storage.retry_base_delay_ms = 50;
        config.save(&path).unwrap();
        assert_eq!(RoadmapToml::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempdir().unwrap();
        let err = RoadmapToml::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RoadmapToml::default();
        config
            .apply_overrides(|key| match key {
                ENV_DB_PATH => Some("/tmp/other.db".to_string()),
                ENV_PORT => Some("9000".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_env_override_bad_port() {
        let mut config = RoadmapToml::default();
        let err = config
            .apply_overrides(|key| (key == ENV_PORT).then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ROADMAP_PORT"));
    }

    #[test]
    fn test_validate_warnings() {
        let mut config = RoadmapToml::default();
        config.server.port = 0;
        config.storage.busy_timeout_ms = 0;
        config.storage.max_retries = 50;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("server.port")));
        assert!(warnings.iter().any(|w| w.contains("busy_timeout_ms")));
        assert!(warnings.iter().any(|w| w.contains("max_retries")));
    }
}
