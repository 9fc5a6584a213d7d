//! Per-float ingestion errors.

use argo_core::archive::ArchiveError;
use thiserror::Error;

/// Why one float failed to ingest.
///
/// Every variant rolls back that float's transaction. Only
/// [`IngestError::is_fatal`] errors stop the whole run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IngestError {
    /// Connection-level failures: no later float could be written either.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Database(
                sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)
            )
        )
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, IngestError::Archive(ArchiveError::Identity { .. }))
    }
}
