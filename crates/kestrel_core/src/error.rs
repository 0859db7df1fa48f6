//! Error types for the conversation store.

use thiserror::Error;

/// Faults raised by the persistence layer.
///
/// `append` is the only path allowed to surface these to the caller of the
/// orchestrator; every other fault is folded into the reply text.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("exchange {0} not found")]
    NotFound(i64),

    #[error("exchange {0} already has a reply")]
    AlreadyCompleted(i64),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
