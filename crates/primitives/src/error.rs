//! Consumer-facing error type
//!
//! Engine failures are mapped onto outcomes a caller can act on: "retry",
//! "wait for more players", "you may not do that" and so on. The mapping
//! depends on the operation, so every facade goes through [`commit_error`]
//! with its own choice for `AlreadyExists`.

use thiserror::Error;

use matchstore_core::{FailureKind, StoreError};

/// Errors returned by the matchmaking facades
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Player, party, request or metadata entry does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Entry already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Party is already queued for matchmaking
    #[error("party already queued: {0}")]
    AlreadyQueued(String),

    /// Caller may not perform the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation is not valid in the current state
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Argument out of range
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lost a race with a concurrent modification; safe to retry
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Not enough queued entries; poll again later
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Any other store error, unchanged
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Unavailable(_) | GatewayError::ResourceExhausted(_)
        )
    }
}

/// Result type for the matchmaking facades
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Map a commit error for the operation `op`
///
/// `AlreadyExists` failures go through `on_exists`, since what an existing
/// key means differs per operation.
pub fn commit_error(
    op: &str,
    err: StoreError,
    on_exists: impl FnOnce(String) -> GatewayError,
) -> GatewayError {
    let key = err.diagnostic_key().unwrap_or_default().to_string();
    match err.failure_kind() {
        Some(FailureKind::NotFound) => GatewayError::NotFound(key),
        Some(FailureKind::AlreadyExists) => on_exists(key),
        Some(FailureKind::FailedCondition) => GatewayError::FailedPrecondition(key),
        Some(FailureKind::InsufficientEntries) => {
            GatewayError::ResourceExhausted(format!("not enough entries in {}", key))
        }
        Some(FailureKind::Aborted) => {
            tracing::warn!(op, "transaction aborted");
            GatewayError::Unavailable(format!(
                "{} aborted due to concurrent modification; safe to retry",
                op
            ))
        }
        None => GatewayError::Store(err),
    }
}
