//! Error types for blob store operations.

use std::path::PathBuf;

/// Result type for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob store operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BlobError {
    /// Identifier is negative or wider than the configured digit width.
    #[error("invalid blob id {id}: {reason}")]
    InvalidIdentifier { id: i64, reason: String },

    /// No blob is stored under a well-formed identifier.
    #[error("blob {id} not found")]
    NotFound { id: u64 },

    /// Filesystem failure, annotated with the failing operation.
    #[error("{op} failed for {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The caller-supplied chunk source or sink failed mid-transfer.
    #[error("{op}: chunk transfer failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Every exclusive-create attempt collided with a concurrent upload.
    #[error("unable to reserve a blob id after {attempts} attempts")]
    Conflict { attempts: usize },

    /// The shard tree could not be created at startup.
    #[error("failed to create shard directory {}: {source}", path.display())]
    Startup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Layout or store configuration is unusable.
    #[error("invalid blob storage config: {reason}")]
    InvalidConfig { reason: String },
}

impl BlobError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BlobError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transport(op: &'static str, source: impl Into<anyhow::Error>) -> Self {
        BlobError::Transport {
            op,
            source: source.into(),
        }
    }

    /// Faults that callers should only ever see as an opaque internal error.
    ///
    /// `InvalidIdentifier` and `NotFound` are caller-facing and are the only
    /// variants for which this returns `false`.
    pub fn is_internal(&self) -> bool {
        !matches!(
            self,
            BlobError::InvalidIdentifier { .. } | BlobError::NotFound { .. }
        )
    }
}
