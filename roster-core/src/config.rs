//! Configuration for the roster store.
//!
//! Maps directly to `roster.toml`. Every field has a default, so an empty
//! file (or no file at all) yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};

/// Top-level roster configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Where and how documents are written.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background persistence queue.
    #[serde(default)]
    pub writer: WriterConfig,
}

impl RosterConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `RosterError::Config` if the TOML is invalid or fails
    /// [`RosterConfig::validate`].
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| RosterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Reject values the store cannot run with.
    ///
    /// # Errors
    /// Returns `RosterError::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.writer.queue_capacity == 0 {
            return Err(RosterError::Config("writer.queue_capacity must be at least 1".into()));
        }
        if self.writer.max_attempts == 0 {
            return Err(RosterError::Config("writer.max_attempts must be at least 1".into()));
        }
        if self.storage.indent > MAX_INDENT {
            return Err(RosterError::Config(format!(
                "storage.indent must be at most {MAX_INDENT}, got {}",
                self.storage.indent
            )));
        }
        Ok(())
    }
}

/// Largest accepted `storage.indent`.
pub const MAX_INDENT: usize = 16;

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error) or a full `EnvFilter`
    /// directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Document storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the documents. Relative paths are resolved against
    /// the user-data directory handed to the store at startup.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Spaces of indentation in written documents.
    #[serde(default = "default_indent")]
    pub indent: usize,
}

impl StorageConfig {
    /// Resolve the data directory against the runtime user-data path.
    #[must_use]
    pub fn resolve(&self, user_dir: &Path) -> PathBuf {
        if self.data_dir.is_absolute() {
            self.data_dir.clone()
        } else {
            user_dir.join(&self.data_dir)
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            indent: default_indent(),
        }
    }
}

/// Background writer settings (ban / mute / unmute persistence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Maximum queued jobs before callers write inline instead.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Attempts per job before it is abandoned and logged.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (required by serde)
// ---------------------------------------------------------------------------

fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("playersData")
}
fn default_indent() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    256
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = RosterConfig::from_toml("").expect("parse");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.storage.data_dir, PathBuf::from("playersData"));
        assert_eq!(config.storage.indent, 4);
        assert_eq!(config.writer.queue_capacity, 256);
        assert_eq!(config.writer.max_attempts, 3);
        assert_eq!(config.writer.retry_backoff_ms, 50);
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let config = RosterConfig::from_toml(
            r#"
            [general]
            log_level = "debug"

            [writer]
            queue_capacity = 8
            "#,
        )
        .expect("parse");
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.writer.queue_capacity, 8);
        assert_eq!(config.writer.max_attempts, 3);
        assert_eq!(config.storage.indent, 4);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err =
            RosterConfig::from_toml("[writer]\nqueue_capacity = 0").expect_err("zero capacity");
        assert!(matches!(err, RosterError::Config(msg) if msg.contains("queue_capacity")));

        let err = RosterConfig::from_toml("[writer]\nmax_attempts = 0").expect_err("zero attempts");
        assert!(matches!(err, RosterError::Config(msg) if msg.contains("max_attempts")));

        let err = RosterConfig::from_toml("[storage]\nindent = 64").expect_err("huge indent");
        assert!(matches!(err, RosterError::Config(msg) if msg.contains("indent")));

        assert!(matches!(
            RosterConfig::from_toml("[writer\n"),
            Err(RosterError::Config(_))
        ));
    }

    #[test]
    fn data_dir_resolution() {
        let storage = StorageConfig::default();
        assert_eq!(
            storage.resolve(Path::new("/srv/user")),
            PathBuf::from("/srv/user/playersData")
        );

        let absolute = StorageConfig {
            data_dir: PathBuf::from("/var/lib/roster"),
            ..StorageConfig::default()
        };
        assert_eq!(absolute.resolve(Path::new("/srv/user")), PathBuf::from("/var/lib/roster"));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("roster.toml");
        std::fs::write(&path, "[storage]\nindent = 2\n").expect("write");
        let config = RosterConfig::from_file(&path).expect("load");
        assert_eq!(config.storage.indent, 2);

        let missing = RosterConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(RosterError::Io(_))));
    }
}
