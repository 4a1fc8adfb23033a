//! Engine error taxonomy.

use trackflow_core::ValidationError;
use trackflow_storage::StorageError;

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, TrackError>;

/// Errors returned by engine commands.
///
/// Access denials are not errors; see [`trackflow_core::ModuleAccess`].
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    /// Track or module absent or unpublished
    #[error("not found: {0}")]
    NotFound(String),

    /// Mutating call without a user id
    #[error("unauthorized: a user id is required")]
    Unauthorized,

    /// Caller-supplied data rejected
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Authored content clashes with stored content
    #[error("conflict: {0}")]
    Conflict(String),

    /// Store unreachable, failing, or too slow; safe to retry
    #[error("store unavailable: {0}")]
    TransientStore(String),
}

impl TrackError {
    /// Whether the caller may retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackError::TransientStore(_))
    }
}

impl From<StorageError> for TrackError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => TrackError::NotFound(what),
            StorageError::Conflict(what) => TrackError::Conflict(what),
            other => TrackError::TransientStore(other.to_string()),
        }
    }
}
