//! Storage layer for matchstore
//!
//! This crate implements the in-process store backend:
//! - MemoryStore: keyspace behind a single RwLock, conditional atomic batches
//! - SortedSet: score-ordered members backing queues
//! - StoredValue: string, sorted set, hash and list values

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod stored_value;

pub use memory::MemoryStore;
pub use stored_value::{SortedSet, StoredValue, ValueType};
