//! Favorite flag, kept apart from progress.

use trackflow_core::{Identity, TrackId};
use tracing::info;

use crate::engine::{require_user, TrackEngine};
use crate::error::{Result, TrackError};

impl TrackEngine {
    /// Flip the caller's favorite flag and return the new value.
    ///
    /// Favoriting never starts the track.
    pub async fn toggle_favorite(&self, identity: &Identity, track_id: TrackId) -> Result<bool> {
        let user_id = &identity.user_id;
        require_user(user_id)?;

        if self
            .bounded("load_track", self.storage.load_track(track_id))
            .await?
            .is_none()
        {
            return Err(TrackError::NotFound(format!("track {}", track_id)));
        }

        let is_favorite = self
            .bounded(
                "toggle_favorite",
                self.storage.toggle_favorite(user_id, track_id),
            )
            .await?;
        info!(user = %user_id, track = %track_id, is_favorite, "favorite toggled");
        Ok(is_favorite)
    }
}
