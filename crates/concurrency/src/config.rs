//! Store configuration via `matchstore.toml`
//!
//! Every field has a default, so an empty file (or no file at all) gives a
//! working in-memory setup with the `default` and `cache` databases.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use matchstore_core::{Result, StoreError};

/// Config file name
pub const CONFIG_FILE_NAME: &str = "matchstore.toml";

/// Name of the database handed out by `ClientManager::client`
pub const DEFAULT_DATABASE: &str = "default";

/// Name of the database used for cached lookups
pub const CACHE_DATABASE: &str = "cache";

/// Which store implementation backs the configured databases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process `MemoryStore`
    #[default]
    Memory,
}

/// Configuration loaded from `matchstore.toml`
///
/// # Example
///
/// ```toml
/// backend = "memory"
/// databases = ["default", "cache"]
/// max_dequeue = 1000
/// slow_commit_threshold_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store implementation
    #[serde(default)]
    pub backend: BackendKind,
    /// Logical databases; each gets its own keyspace
    #[serde(default = "default_databases")]
    pub databases: Vec<String>,
    /// Largest number of ids a single dequeue may pop
    #[serde(default = "default_max_dequeue")]
    pub max_dequeue: usize,
    /// Commits slower than this are logged at warn level
    #[serde(default = "default_slow_commit_threshold_ms")]
    pub slow_commit_threshold_ms: u64,
}

fn default_databases() -> Vec<String> {
    vec![DEFAULT_DATABASE.to_string(), CACHE_DATABASE.to_string()]
}

fn default_max_dequeue() -> usize {
    1000
}

fn default_slow_commit_threshold_ms() -> u64 {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            databases: default_databases(),
            max_dequeue: default_max_dequeue(),
            slow_commit_threshold_ms: default_slow_commit_threshold_ms(),
        }
    }
}

impl StoreConfig {
    /// Parse and validate a TOML document
    ///
    /// # Errors
    ///
    /// `Config` if the document is malformed or fails validation.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(text)
            .map_err(|e| StoreError::Config(format!("Invalid {}: {}", CONFIG_FILE_NAME, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Load `matchstore.toml` from a directory, writing the default template
    /// first if the file does not exist yet
    pub fn load_or_create(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            std::fs::write(&path, Self::default_toml()).map_err(|e| {
                StoreError::Config(format!("Cannot write {}: {}", path.display(), e))
            })?;
            tracing::info!(path = %path.display(), "created default store config");
        }
        Self::from_file(&path)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.databases.is_empty() {
            return Err(StoreError::Config(
                "At least one database must be configured".to_string(),
            ));
        }
        if !self.databases.iter().any(|db| db == DEFAULT_DATABASE) {
            return Err(StoreError::Config(format!(
                "The '{}' database must be configured",
                DEFAULT_DATABASE
            )));
        }
        if self.max_dequeue == 0 {
            return Err(StoreError::Config("max_dequeue must be positive".to_string()));
        }
        Ok(())
    }

    /// Per-transaction limits derived from this config
    pub fn transaction_settings(&self) -> TransactionSettings {
        TransactionSettings {
            max_dequeue: self.max_dequeue,
            slow_commit_threshold: Duration::from_millis(self.slow_commit_threshold_ms),
        }
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# matchstore configuration
#
# Store implementation. Only "memory" is built in.
backend = "memory"

# Logical databases. "default" is required; "cache" holds cached lookups.
databases = ["default", "cache"]

# Largest number of ids one dequeue may pop.
max_dequeue = 1000

# Commits slower than this many milliseconds are logged as warnings.
slow_commit_threshold_ms = 100
"#
    }
}

/// Limits applied to every transaction a client opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionSettings {
    /// Largest number of ids a single dequeue may pop
    pub max_dequeue: usize,
    /// Commits slower than this are logged at warn level
    pub slow_commit_threshold: Duration,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        StoreConfig::default().transaction_settings()
    }
}
