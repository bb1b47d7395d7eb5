//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tally_core::normalize::{DEFAULT_MAX_MINUTES, DEFAULT_MIN_MINUTES};
use tally_core::{
    BatchConfig, EventLog, MalformedLinePolicy, NormalizePolicy, PolicyError, RecoveryOrder,
};
use tally_notion::{NOTION_API_URL, PropertyNames};

/// Required settings that are missing or unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing Notion token (set TALLY_NOTION_TOKEN or notion_token in config.toml)")]
    MissingNotionToken,

    #[error(
        "missing Notion database id (set TALLY_NOTION_DATABASE_ID or notion_database_id in config.toml)"
    )]
    MissingDatabaseId,

    #[error("invalid period bounds: {0}")]
    Policy(#[from] PolicyError),
}

/// Credentials needed to deliver to Notion.
#[derive(Clone, PartialEq, Eq)]
pub struct NotionCredentials {
    pub token: String,
    pub database_id: String,
}

impl fmt::Debug for NotionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionCredentials")
            .field("token", &"[REDACTED]")
            .field("database_id", &self.database_id)
            .finish()
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transition log written by the timer.
    pub log_path: PathBuf,

    /// Periods waiting for another delivery attempt.
    pub recovery_log_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notion_database_id: Option<String>,

    pub notion_base_url: String,
    pub title_property: String,
    pub date_property: String,

    pub min_minutes: u32,
    pub max_minutes: u32,

    pub recovery_order: RecoveryOrder,
    pub malformed_lines: MalformedLinePolicy,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("log_path", &self.log_path)
            .field("recovery_log_path", &self.recovery_log_path)
            .field(
                "notion_token",
                &self.notion_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("notion_database_id", &self.notion_database_id)
            .field("notion_base_url", &self.notion_base_url)
            .field("title_property", &self.title_property)
            .field("date_property", &self.date_property)
            .field("min_minutes", &self.min_minutes)
            .field("max_minutes", &self.max_minutes)
            .field("recovery_order", &self.recovery_order)
            .field("malformed_lines", &self.malformed_lines)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            log_path: data_dir.join("transitions.jsonl"),
            recovery_log_path: data_dir.join("recovery.jsonl"),
            notion_token: None,
            notion_database_id: None,
            notion_base_url: NOTION_API_URL.to_string(),
            title_property: "Name".to_string(),
            date_property: "Date".to_string(),
            min_minutes: DEFAULT_MIN_MINUTES,
            max_minutes: DEFAULT_MAX_MINUTES,
            recovery_order: RecoveryOrder::default(),
            malformed_lines: MalformedLinePolicy::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TALLY_*)
        figment = figment.merge(Env::prefixed("TALLY_"));

        figment.extract()
    }

    /// Batch settings, validating the period bounds.
    pub fn batch_config(&self) -> Result<BatchConfig, ConfigError> {
        Ok(BatchConfig {
            policy: NormalizePolicy::new(self.min_minutes, self.max_minutes)?,
            recovery_order: self.recovery_order,
            malformed_lines: self.malformed_lines,
        })
    }

    /// Token and database id, both required for delivery.
    pub fn notion_credentials(&self) -> Result<NotionCredentials, ConfigError> {
        let token =
            non_blank(self.notion_token.as_deref()).ok_or(ConfigError::MissingNotionToken)?;
        let database_id =
            non_blank(self.notion_database_id.as_deref()).ok_or(ConfigError::MissingDatabaseId)?;
        Ok(NotionCredentials {
            token: token.to_string(),
            database_id: database_id.to_string(),
        })
    }

    pub fn property_names(&self) -> PropertyNames {
        PropertyNames {
            title: self.title_property.clone(),
            date: self.date_property.clone(),
        }
    }

    pub fn primary_log(&self) -> EventLog {
        EventLog::new(&self.log_path)
    }

    pub fn recovery_log(&self) -> EventLog {
        EventLog::new(&self.recovery_log_path)
    }

    /// Lock file guarding a sync run, next to the transition log.
    pub fn lock_path(&self) -> PathBuf {
        self.log_path
            .parent()
            .map_or_else(|| PathBuf::from(".tally.lock"), |dir| dir.join(".tally.lock"))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Returns the platform-specific config directory for tally.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tally"))
}

/// Returns the platform-specific data directory for tally.
///
/// On Linux: `~/.local/share/tally`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tally"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_dirs_data_path_ends_with_tally() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "tally");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_logs() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.log_path, data_dir.join("transitions.jsonl"));
        assert_eq!(config.recovery_log_path, data_dir.join("recovery.jsonl"));
        assert_eq!(config.lock_path(), data_dir.join(".tally.lock"));
    }

    #[test]
    fn test_default_bounds() {
        let batch = Config::default().batch_config().unwrap();
        assert_eq!(batch.policy, NormalizePolicy::default());
        assert_eq!(batch.recovery_order, RecoveryOrder::Append);
        assert_eq!(batch.malformed_lines, MalformedLinePolicy::Skip);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_path = "/tmp/tally-test/log.jsonl"
notion_token = "secret_abc"
notion_database_id = "db-1"
max_minutes = 50
recovery_order = "prepend"
malformed_lines = "abort"
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();

        assert_eq!(config.log_path, PathBuf::from("/tmp/tally-test/log.jsonl"));
        assert_eq!(config.max_minutes, 50);
        assert_eq!(config.recovery_order, RecoveryOrder::Prepend);
        assert_eq!(config.malformed_lines, MalformedLinePolicy::Abort);
        let credentials = config.notion_credentials().unwrap();
        assert_eq!(credentials.database_id, "db-1");
    }

    #[test]
    fn test_missing_credentials() {
        let mut config = Config::default();
        assert!(matches!(
            config.notion_credentials(),
            Err(ConfigError::MissingNotionToken)
        ));

        config.notion_token = Some("secret_abc".to_string());
        config.notion_database_id = Some("   ".to_string());
        assert!(matches!(
            config.notion_credentials(),
            Err(ConfigError::MissingDatabaseId)
        ));
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let config = Config {
            min_minutes: 30,
            ..Config::default()
        };
        assert!(matches!(
            config.batch_config(),
            Err(ConfigError::Policy(PolicyError::InvertedBounds { .. }))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = Config {
            notion_token: Some("secret_abc".to_string()),
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret_abc"));
        assert!(debug.contains("[REDACTED]"));
    }
}
