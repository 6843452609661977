//! Error types for matchstore
//!
//! Two layers of failure are modelled here:
//!
//! - [`TransactionFailure`]: the engine's own verdict on a rejected commit,
//!   tagged with a [`FailureKind`] and the diagnostic key of the condition
//!   that caused it.
//! - [`StoreError`]: everything that can go wrong talking to a store,
//!   including transaction failures, serialization and backend errors.
//!
//! Callers decide between retrying and giving up by matching on
//! [`StoreError::failure_kind`] or calling [`StoreError::is_retryable`].

use std::fmt;
use thiserror::Error;

/// Result type alias for matchstore operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Why a transaction was rejected by the store
///
/// The variants are listed in diagnosis precedence order, with the
/// exception of `Aborted` which is the fallback when no individual
/// condition can be blamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// A dequeue asked for more members than the queue held
    InsufficientEntries,
    /// A key, hash or list was present where it had to be absent
    AlreadyExists,
    /// A key or hash field was absent where it had to be present
    NotFound,
    /// A named hash-value condition did not hold
    FailedCondition,
    /// The commit lost an optimistic race
    Aborted,
}

impl FailureKind {
    /// Whether the same transaction may succeed if simply retried
    ///
    /// Lost races and empty queues resolve themselves over time; the other
    /// kinds need different input.
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureKind::Aborted | FailureKind::InsufficientEntries)
    }

    /// Stable lowercase name, used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::InsufficientEntries => "insufficient entries",
            FailureKind::AlreadyExists => "entry already exists",
            FailureKind::NotFound => "entry not found",
            FailureKind::FailedCondition => "failed condition",
            FailureKind::Aborted => "transaction aborted",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected commit, with the kind of failure and the diagnostic key
/// of the condition responsible for it (if one could be identified)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFailure {
    /// Failure classification
    pub kind: FailureKind,
    /// Diagnostic key of the failing condition
    pub key: Option<String>,
}

impl TransactionFailure {
    /// Create a failure of the given kind
    pub fn new(kind: FailureKind, key: Option<String>) -> Self {
        Self { kind, key }
    }

    /// The target was absent
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, Some(key.into()))
    }

    /// The target was present
    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::new(FailureKind::AlreadyExists, Some(key.into()))
    }

    /// A named condition failed
    pub fn failed_condition(key: impl Into<String>) -> Self {
        Self::new(FailureKind::FailedCondition, Some(key.into()))
    }

    /// The queue was too short
    pub fn insufficient_entries(queue: impl Into<String>) -> Self {
        Self::new(FailureKind::InsufficientEntries, Some(queue.into()))
    }

    /// The commit lost a race
    pub fn aborted() -> Self {
        Self::new(FailureKind::Aborted, None)
    }
}

impl fmt::Display for TransactionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}: {}", self.kind, key),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for TransactionFailure {}

/// Error types for store access
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected a transaction
    #[error("Transaction failed: {0}")]
    Transaction(#[from] TransactionFailure),

    /// An entry could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A command or read addressed a key holding another value type
    #[error("Wrong type for key {key}: expected {expected}")]
    WrongType {
        /// The offending key
        key: String,
        /// The type the operation needed
        expected: &'static str,
    },

    /// A request that can never be executed
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The backend itself failed (connection, protocol)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// A client was requested for a database that is not configured
    #[error("Unknown database: {0}")]
    UnknownDatabase(String),
}

impl StoreError {
    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        StoreError::InvalidOperation(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        StoreError::Backend(msg.into())
    }

    /// The transaction failure kind, if this is a rejected commit
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            StoreError::Transaction(failure) => Some(failure.kind),
            _ => None,
        }
    }

    /// The diagnostic key of a rejected commit
    pub fn diagnostic_key(&self) -> Option<&str> {
        match self {
            StoreError::Transaction(failure) => failure.key.as_deref(),
            _ => None,
        }
    }

    /// Check whether this is a rejected commit of the given kind
    pub fn is(&self, kind: FailureKind) -> bool {
        self.failure_kind() == Some(kind)
    }

    /// Whether retrying the same transaction may succeed
    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_some_and(FailureKind::is_retryable)
    }
}
