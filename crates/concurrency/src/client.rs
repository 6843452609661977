//! StoreClient: point reads and transaction factory
//!
//! A client is a cheap, cloneable handle to one logical database. Reads go
//! straight to the backend and are not part of any transaction; writes go
//! through a [`Transaction`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use matchstore_core::{decode_entry, Entry, Key, Result, ScoredMember, StoreBackend};

use crate::config::TransactionSettings;
use crate::transaction::{Committed, Transaction};

/// Handle to one logical database
#[derive(Debug, Clone)]
pub struct StoreClient {
    backend: Arc<dyn StoreBackend>,
    settings: TransactionSettings,
    next_txn_id: Arc<AtomicU64>,
}

impl StoreClient {
    /// Create a client over a backend with default settings
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self::with_settings(backend, TransactionSettings::default())
    }

    /// Create a client with explicit transaction settings
    pub fn with_settings(backend: Arc<dyn StoreBackend>, settings: TransactionSettings) -> Self {
        Self::with_txn_counter(backend, settings, Arc::new(AtomicU64::new(1)))
    }

    pub(crate) fn with_txn_counter(
        backend: Arc<dyn StoreBackend>,
        settings: TransactionSettings,
        next_txn_id: Arc<AtomicU64>,
    ) -> Self {
        Self {
            backend,
            settings,
            next_txn_id,
        }
    }

    /// The backend this client talks to
    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }

    /// Settings applied to new transactions
    pub fn settings(&self) -> TransactionSettings {
        self.settings
    }

    /// Open an empty transaction bound to this client
    pub fn create_transaction(&self) -> Transaction {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        Transaction::new(txn_id, Arc::clone(&self.backend), self.settings)
    }

    /// Stage operations in `stage` and commit them
    ///
    /// ```ignore
    /// client.transact(|tx| {
    ///     tx.update_all(&[party]);
    /// }).await?;
    /// ```
    pub async fn transact<F>(&self, stage: F) -> Result<Committed>
    where
        F: FnOnce(&mut Transaction),
    {
        let mut tx = self.create_transaction();
        stage(&mut tx);
        tx.commit().await
    }

    /// Load an entry by id
    ///
    /// Returns `Ok(None)` if absent or empty. A loaded entry carries the
    /// exact string it was decoded from as its previous state.
    pub async fn get<T: Entry>(&self, id: &str) -> Result<Option<T>> {
        let key = Key::for_entry::<T>(id);
        match self.backend.get_string(&key).await? {
            Some(raw) if !raw.is_empty() => decode_entry(raw).map(Some),
            _ => Ok(None),
        }
    }

    /// Every field of a hash; empty if absent
    pub async fn get_hash(&self, hash: impl Into<Key>) -> Result<BTreeMap<String, String>> {
        self.backend.get_hash(&hash.into()).await
    }

    /// Number of ids in a queue
    pub async fn queue_length(&self, queue: &str) -> Result<usize> {
        Ok(self.queue_members(queue).await?.len())
    }

    /// Ids in a queue with their scores, lowest score first
    pub async fn queue_members(&self, queue: &str) -> Result<Vec<ScoredMember>> {
        self.backend.get_sorted_set(&Key::for_queue(queue)).await
    }

    /// Whether a key of any type exists
    pub async fn key_exists(&self, key: impl Into<Key>) -> Result<bool> {
        self.backend.exists(&key.into()).await
    }
}
