//! Error types for the Submarine operator.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while reconciling a Submarine.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Object store call failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A child name is taken by an object the Submarine does not control.
    ///
    /// The squatting object is never mutated; the key keeps retrying until
    /// the conflicting object is removed.
    #[error("resource \"{name}\" already exists and is not managed by Submarine")]
    ResourceExists {
        /// Name of the conflicting object.
        name: String,
    },

    /// A work-queue item whose key is not of the form `namespace/name`.
    #[error("invalid work item key: {key:?}")]
    InvalidWorkItem {
        /// The malformed key.
        key: String,
    },

    /// The parent carries no UID yet, so owner references cannot be built.
    #[error("submarine {name} has no uid recorded")]
    MissingUid {
        /// Parent name.
        name: String,
    },

    /// Chart engine (sub-release install/uninstall) failure.
    #[error("chart engine error: {0}")]
    Chart(String),
}

impl OperatorError {
    /// Whether the failed work item should be put back on the queue with
    /// backoff. Malformed items are dropped instead of retried.
    pub fn requeues(&self) -> bool {
        !matches!(self, OperatorError::InvalidWorkItem { .. })
    }
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;
