//! Core types and traits for matchstore
//!
//! This crate defines the foundational types used throughout the system:
//! - Entry: typed records with a captured previous state
//! - Key: deterministic entry and queue keys
//! - Condition / Command / Batch: what a transaction sends to a store
//! - StoreBackend: the store abstraction
//! - StoreError / TransactionFailure: error hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod entry;
pub mod error;
pub mod traits;
pub mod types;

pub use command::{Batch, BatchOutcome, Command, Condition, Reply, ScoredMember};
pub use entry::{decode_entry, Entry, PreviousState, QueuedEntry};
pub use error::{FailureKind, Result, StoreError, TransactionFailure};
pub use traits::StoreBackend;
pub use types::{Key, KEY_SEPARATOR, QUEUE_NAMESPACE};
