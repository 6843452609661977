//! Client manager: logical databases to store clients
//!
//! Each configured database name gets its own backend, so keys in `default`
//! and `cache` never see each other. Transaction ids are allocated from one
//! counter shared by every client the manager hands out.

use rustc_hash::FxHashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use matchstore_core::{Result, StoreBackend, StoreError};
use matchstore_storage::MemoryStore;

use crate::client::StoreClient;
use crate::config::{BackendKind, StoreConfig, TransactionSettings, DEFAULT_DATABASE};

/// Hands out a [`StoreClient`] per logical database
#[derive(Debug)]
pub struct ClientManager {
    default: StoreClient,
    clients: FxHashMap<String, StoreClient>,
}

impl ClientManager {
    /// Build one backend per configured database
    ///
    /// # Errors
    ///
    /// `Config` if the config is invalid or names a database twice.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let backends = config.databases.iter().map(|name| {
            let backend: Arc<dyn StoreBackend> = match config.backend {
                BackendKind::Memory => Arc::new(MemoryStore::new()),
            };
            (name.clone(), backend)
        });
        let manager = Self::with_backends(backends, config.transaction_settings())?;
        tracing::info!(
            backend = ?config.backend,
            databases = config.databases.len(),
            "store clients ready"
        );
        Ok(manager)
    }

    /// Build a manager over caller-provided backends
    ///
    /// One of them must be named `default`.
    pub fn with_backends<I>(backends: I, settings: TransactionSettings) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Arc<dyn StoreBackend>)>,
    {
        let next_txn_id = Arc::new(AtomicU64::new(1));
        let mut clients = FxHashMap::default();
        for (name, backend) in backends {
            let client = StoreClient::with_txn_counter(backend, settings, Arc::clone(&next_txn_id));
            if clients.insert(name.clone(), client).is_some() {
                return Err(StoreError::Config(format!(
                    "Database '{}' configured twice",
                    name
                )));
            }
        }
        let default = clients
            .get(DEFAULT_DATABASE)
            .cloned()
            .ok_or_else(|| {
                StoreError::Config(format!("The '{}' database must be configured", DEFAULT_DATABASE))
            })?;
        Ok(Self { default, clients })
    }

    /// Client for the `default` database
    pub fn client(&self) -> StoreClient {
        self.default.clone()
    }

    /// Client for a named database
    ///
    /// # Errors
    ///
    /// `UnknownDatabase` if the name was not configured.
    pub fn client_for(&self, name: &str) -> Result<StoreClient> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownDatabase(name.to_string()))
    }

    /// Configured database names, sorted
    pub fn databases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.clients.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
