//! Remote deletion boundary and the outcomes collected from it.

use crate::models::object_ref::StorageKey;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("object `{0}` not found")]
    NotFound(StorageKey),
    #[error("store refuses key `{0}`")]
    InvalidKey(StorageKey),
    #[error("failed to delete `{key}`: {reason}")]
    Failed { key: StorageKey, reason: String },
}

/// Deletes a single object from the remote store.
///
/// Implementations report a missing object as [`GatewayError::NotFound`];
/// callers treat that as a successful deletion. A key the store could
/// never address is [`GatewayError::InvalidKey`] and is not retried.
#[async_trait]
pub trait DeletionGateway: Send + Sync {
    async fn delete(&self, key: &StorageKey) -> Result<(), GatewayError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
    /// The key can never name a stored object.
    Rejected(String),
    Failed(String),
}

impl DeleteOutcome {
    /// `true` for both a deletion and an object that was already gone.
    pub fn is_success(&self) -> bool {
        matches!(self, DeleteOutcome::Deleted | DeleteOutcome::AlreadyAbsent)
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeleteOutcome::Failed(_))
    }
}

/// Result of one delete attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupAttempt {
    pub url: String,
    pub key: StorageKey,
    pub outcome: DeleteOutcome,
}

/// Everything a fan-out deletion did: one attempt per distinct key, plus the
/// URLs whose key could not be derived.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub attempts: Vec<CleanupAttempt>,
    pub skipped: Vec<String>,
}

impl CleanupReport {
    /// Attempts that failed and may succeed on retry.
    pub fn failures(&self) -> impl Iterator<Item = &CleanupAttempt> {
        self.attempts.iter().filter(|a| a.outcome.is_retryable())
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn rejected(&self) -> impl Iterator<Item = &CleanupAttempt> {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, DeleteOutcome::Rejected(_)))
    }
}
