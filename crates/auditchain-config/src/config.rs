//! Configuration schema and loading.
//!
//! Every section and field has a default, so an empty document is a valid
//! configuration (in-memory storage, five second lock bound, `warn` logs).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use auditchain_contracts::error::{LedgerError, LedgerResult};

/// Top-level configuration document.
///
/// ```toml
/// [chain]
/// lock_timeout_ms = 5000
///
/// [storage]
/// backend = "sqlite"
/// path = "auditchain.db"
/// busy_timeout_ms = 5000
///
/// [logging]
/// filter = "info"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub chain: ChainConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    /// Longest wait for a tenant's append lock before `ConcurrencyTimeout`.
    pub lock_timeout_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
        }
    }
}

impl ChainConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Which `EventRepository` adapter to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file; required by the `sqlite` backend.
    pub path: Option<PathBuf>,
    /// How long a SQLite writer waits on another connection's transaction.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `LedgerError::Config` if the TOML is malformed, names an
    /// unknown field, or fails validation.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(s).map_err(|e| LedgerError::Config {
            reason: format!("failed to parse config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it with `from_toml_str`.
    ///
    /// A relative `storage.path` is resolved against the file's directory.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LedgerError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        let mut config = Self::from_toml_str(&contents)?;

        if let (Some(db), Some(dir)) = (config.storage.path.as_mut(), path.parent()) {
            if db.is_relative() {
                *db = dir.join(&*db);
            }
        }
        debug!(path = %path.display(), backend = ?config.storage.backend, "config loaded");
        Ok(config)
    }

    /// Reject settings the store cannot run with.
    pub fn validate(&self) -> LedgerResult<()> {
        let mut problems = Vec::new();

        if self.chain.lock_timeout_ms == 0 {
            problems.push("chain.lock_timeout_ms must be greater than zero");
        }
        if self.storage.busy_timeout_ms == 0 {
            problems.push("storage.busy_timeout_ms must be greater than zero");
        }
        if self.storage.backend == StorageBackend::Sqlite && self.storage.path.is_none() {
            problems.push("storage.path is required for the sqlite backend");
        }
        if self.logging.filter.trim().is_empty() {
            problems.push("logging.filter must not be empty");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Config {
                reason: problems.join("; "),
            })
        }
    }
}
