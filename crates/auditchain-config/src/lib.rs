//! auditchain-config: TOML configuration for the auditchain binary.
//!
//! ```rust,ignore
//! use auditchain_config::LedgerConfig;
//!
//! let config = LedgerConfig::from_file(Path::new("auditchain.toml"))?;
//! let store = ImmutableStore::with_lock_timeout(repo, config.chain.lock_timeout());
//! ```

pub mod config;

pub use config::{ChainConfig, LedgerConfig, LoggingConfig, StorageBackend, StorageConfig};
