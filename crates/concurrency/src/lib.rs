//! Transactions for matchstore
//!
//! This crate implements optimistic-concurrency transactions over a
//! [`StoreBackend`](matchstore_core::StoreBackend):
//! - StoreClient: point reads and transaction factory
//! - Transaction: staged writes, queue operations and preconditions,
//!   committed as one conditional batch
//! - ConditionRegistry: commit-failure diagnosis
//! - ClientManager: one client per logical database
//! - StoreConfig: `matchstore.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod conditions;
pub mod config;
pub mod manager;
pub mod transaction;

pub use client::StoreClient;
pub use conditions::{ConditionClass, ConditionRecord, ConditionRegistry};
pub use config::{
    BackendKind, StoreConfig, TransactionSettings, CACHE_DATABASE, CONFIG_FILE_NAME,
    DEFAULT_DATABASE,
};
pub use manager::ClientManager;
pub use transaction::{Committed, DequeueTicket, Transaction};
