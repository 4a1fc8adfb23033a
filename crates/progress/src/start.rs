//! Start/resume of a track.

use trackflow_core::{Identity, ProgressView, TrackId, UserTrackProgress};
use tracing::info;

use crate::engine::{require_user, TrackEngine};
use crate::error::Result;

impl TrackEngine {
    /// Start a track, or resume it if already started.
    ///
    /// The stored row is never modified by a repeat call.
    pub async fn start_track(&self, identity: &Identity, track_id: TrackId) -> Result<ProgressView> {
        let user_id = &identity.user_id;
        require_user(user_id)?;
        self.published_track(track_id).await?;

        let (progress, created) = self
            .bounded(
                "start_track",
                self.storage
                    .start_track(&UserTrackProgress::started(user_id.clone(), track_id)),
            )
            .await?;
        if created {
            info!(user = %user_id, track = %track_id, "track started");
        }

        let modules = self.modules(track_id).await?;
        let (view, _) = self.view_of(&progress, &modules).await?;
        Ok(view)
    }
}
