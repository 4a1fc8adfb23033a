//! Storage trait abstraction.

use async_trait::async_trait;
use trackflow_core::{
    Module, ModuleId, RatingStats, Time, Track, TrackId, TrackReview, UserId,
    UserModuleProgress, UserProfile, UserTrackProgress,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database driver error
    #[error("Database error: {0}")]
    Database(String),

    /// Uniqueness constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Persistence collaborator for the progression engine.
///
/// Every method is a single atomic operation against the backing store.
/// Operations keyed by (user, track) or (user, track, module) are upserts
/// honoring the uniqueness of those keys; implementations must not turn
/// them into read-then-write sequences that another caller can interleave.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Catalog ===

    /// Save a track (create or update).
    async fn save_track(&self, track: &Track) -> Result<()>;

    /// Load a track by ID, published or not.
    async fn load_track(&self, id: TrackId) -> Result<Option<Track>>;

    /// List all tracks.
    async fn list_tracks(&self) -> Result<Vec<Track>>;

    /// Save a module (create or update).
    ///
    /// Fails with [`StorageError::Conflict`] if another module of the same
    /// track already holds `order_index`.
    async fn save_module(&self, module: &Module) -> Result<()>;

    /// List a track's modules ordered by ascending `order_index`.
    async fn list_modules(&self, track_id: TrackId) -> Result<Vec<Module>>;

    // === Profiles ===

    /// Save a user profile.
    async fn save_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Load a user profile.
    async fn load_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>>;

    // === Track progress ===

    /// Insert `progress` unless a row for its (user, track) exists.
    ///
    /// Returns the stored row and whether it was created by this call.
    async fn start_track(&self, progress: &UserTrackProgress) -> Result<(UserTrackProgress, bool)>;

    /// Load the (user, track) progress row.
    async fn load_track_progress(
        &self,
        user_id: &UserId,
        track_id: TrackId,
    ) -> Result<Option<UserTrackProgress>>;

    /// Set `completed_at` to `at` only if it is unset.
    ///
    /// Returns the stored row, or `None` if the user never started the track.
    async fn mark_track_completed(
        &self,
        user_id: &UserId,
        track_id: TrackId,
        at: Time,
    ) -> Result<Option<UserTrackProgress>>;

    // === Module progress ===

    /// Record a module completion; the first completion wins.
    ///
    /// Returns the stored row and whether this call completed the module.
    async fn complete_module(
        &self,
        completion: &UserModuleProgress,
    ) -> Result<(UserModuleProgress, bool)>;

    /// List all module progress rows for (user, track).
    async fn list_module_progress(
        &self,
        user_id: &UserId,
        track_id: TrackId,
    ) -> Result<Vec<UserModuleProgress>>;

    /// Count completed modules for (user, track) restricted to `modules`.
    async fn count_completed_modules(
        &self,
        user_id: &UserId,
        track_id: TrackId,
        modules: &[ModuleId],
    ) -> Result<usize>;

    // === Favorites ===

    /// Atomically negate the favorite flag (absent counts as `false`) and
    /// return the new value.
    async fn toggle_favorite(&self, user_id: &UserId, track_id: TrackId) -> Result<bool>;

    /// Read the favorite flag (absent counts as `false`).
    async fn load_favorite(&self, user_id: &UserId, track_id: TrackId) -> Result<bool>;

    // === Reviews ===

    /// Insert or replace the (user, track) review and update the track's
    /// rating stats in the same transaction. An existing review keeps its
    /// `id` and `created_at`.
    async fn upsert_review(&self, review: &TrackReview) -> Result<TrackReview>;

    /// Load the (user, track) review.
    async fn load_review(&self, user_id: &UserId, track_id: TrackId) -> Result<Option<TrackReview>>;

    /// Delete the (user, track) review, adjusting rating stats. Returns
    /// whether a review existed.
    async fn delete_review(&self, user_id: &UserId, track_id: TrackId) -> Result<bool>;

    /// Running rating totals for a track.
    async fn load_rating_stats(&self, track_id: TrackId) -> Result<RatingStats>;

    // === Maintenance ===

    /// Check that the store is reachable.
    async fn health_check(&self) -> Result<()>;
}
