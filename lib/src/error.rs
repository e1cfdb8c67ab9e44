use thiserror::Error;

/// The push payload did not match the expected shape.
#[derive(Debug, Error)]
#[error("invalid push payload: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// A collaborator (team directory, task store, link store or notifier) failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Backend(String),

    #[error("notification dispatch failed: {0}")]
    Notify(String),

    #[error("lock poisoned")]
    LockPoisoned,
}
