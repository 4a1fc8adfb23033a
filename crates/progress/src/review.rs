//! Reviews and the aggregate rating.

use trackflow_core::{
    normalize_comment, Identity, Rating, RatingSummary, ReviewId, TrackId, TrackReview, UserId,
};
use tracing::info;

use crate::engine::{require_user, TrackEngine};
use crate::error::Result;

impl TrackEngine {
    /// Create or replace the caller's review of a track.
    ///
    /// A resubmission keeps the review's id and `created_at`.
    pub async fn submit_review(
        &self,
        identity: &Identity,
        track_id: TrackId,
        rating: i64,
        comment: Option<&str>,
    ) -> Result<TrackReview> {
        let user_id = &identity.user_id;
        require_user(user_id)?;
        let rating = Rating::new(rating)?;
        let comment = normalize_comment(comment, self.config.max_comment_chars)?;
        self.published_track(track_id).await?;

        let now = chrono::Utc::now();
        let review = TrackReview {
            id: ReviewId::new(),
            user_id: user_id.clone(),
            track_id,
            rating,
            comment,
            created_at: now,
            updated_at: now,
        };
        let stored = self
            .bounded("upsert_review", self.storage.upsert_review(&review))
            .await?;
        info!(
            user = %user_id,
            track = %track_id,
            rating = stored.rating.value(),
            "review saved"
        );
        Ok(stored)
    }

    /// Average rating and review count of a track.
    pub async fn aggregate_rating(&self, track_id: TrackId) -> Result<RatingSummary> {
        let stats = self
            .bounded("load_rating_stats", self.storage.load_rating_stats(track_id))
            .await?;
        Ok(stats.summary())
    }

    /// The review `user_id` left on a track, if any.
    pub async fn user_review(
        &self,
        user_id: &UserId,
        track_id: TrackId,
    ) -> Result<Option<TrackReview>> {
        require_user(user_id)?;
        self.bounded("load_review", self.storage.load_review(user_id, track_id))
            .await
    }

    /// Remove the caller's review. Returns false when there was none.
    pub async fn delete_review(&self, identity: &Identity, track_id: TrackId) -> Result<bool> {
        let user_id = &identity.user_id;
        require_user(user_id)?;
        let removed = self
            .bounded("delete_review", self.storage.delete_review(user_id, track_id))
            .await?;
        if removed {
            info!(user = %user_id, track = %track_id, "review deleted");
        }
        Ok(removed)
    }
}
