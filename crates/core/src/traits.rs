//! Backend abstraction
//!
//! [`StoreBackend`] is the seam between the transaction engine and the
//! store that holds the data. The engine only needs point reads and atomic
//! conditional batch execution, so any store that can evaluate a list of
//! conditions and apply a list of commands as one step can sit behind it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::command::{Batch, BatchOutcome, ScoredMember};
use crate::error::Result;
use crate::types::Key;

/// A store reachable by every service replica
///
/// Thread safety: implementations are shared across tasks behind an `Arc`
/// and must tolerate any number of concurrent calls.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Read a string value
    ///
    /// Returns `Ok(None)` if the key is absent.
    ///
    /// # Errors
    ///
    /// `WrongType` if the key holds a non-string value.
    async fn get_string(&self, key: &Key) -> Result<Option<String>>;

    /// Read every field of a hash; empty if the key is absent
    async fn get_hash(&self, key: &Key) -> Result<BTreeMap<String, String>>;

    /// Read a sorted set in ascending score order; empty if absent
    async fn get_sorted_set(&self, key: &Key) -> Result<Vec<ScoredMember>>;

    /// Whether a key of any type is present
    async fn exists(&self, key: &Key) -> Result<bool>;

    /// Evaluate the batch's conditions and, if all hold, apply its commands,
    /// all as one indivisible step
    async fn execute(&self, batch: Batch) -> Result<BatchOutcome>;
}
