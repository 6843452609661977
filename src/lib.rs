//! matchstore - transactional memory-store engine for matchmaking services
//!
//! Optimistically concurrent, all-or-nothing transactions over a shared
//! key-value store, with an atomic pop-lowest-scores queue operation and
//! commit failures diagnosed into a single actionable kind.
//!
//! # Quick Start
//!
//! ```ignore
//! use matchstore::prelude::*;
//!
//! let manager = ClientManager::from_config(&StoreConfig::default())?;
//! let client = manager.client();
//!
//! let mut tx = client.create_transaction();
//! let ticket = tx.dequeue("ranked", 2);
//! let committed = tx.commit().await?;
//! let party_ids = committed.dequeued(ticket);
//! ```
//!
//! # Architecture
//!
//! - `matchstore-core`: entries, keys, the store command vocabulary and errors
//! - `matchstore-storage`: the in-process `MemoryStore` backend
//! - `matchstore-concurrency`: clients, transactions, failure diagnosis and config
//! - `matchstore-primitives`: parties, join requests and the matchmaking flows

pub use matchstore_concurrency::{
    ClientManager, Committed, DequeueTicket, StoreClient, StoreConfig, Transaction,
};
pub use matchstore_core::{
    Entry, FailureKind, Key, PreviousState, QueuedEntry, Result, StoreBackend, StoreError,
    TransactionFailure,
};
pub use matchstore_storage::MemoryStore;

pub mod prelude;
