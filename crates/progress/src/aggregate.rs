//! The `TrackWithModules` read model.

use serde::Serialize;
use trackflow_core::{Identity, Module, ProgressView, Track, TrackId, TrackReview, UserModuleProgress};

use crate::access::{completed_set, derive_states, ModuleStateEntry};
use crate::engine::{derive_view, TrackEngine};
use crate::error::Result;

/// A track with its modules, rating, and the caller's own state.
///
/// User fields are empty for anonymous callers.
#[derive(Debug, Clone, Serialize)]
pub struct TrackWithModules {
    /// The track
    pub track: Track,
    /// Ordered by `order_index`
    pub modules: Vec<Module>,
    /// Caller's progress, if started
    pub user_progress: Option<ProgressView>,
    /// Caller's completions of modules in the track
    pub module_progress: Vec<UserModuleProgress>,
    /// Caller's state per module
    pub module_states: Vec<ModuleStateEntry>,
    /// Mean rating, absent without reviews
    pub average_rating: Option<f64>,
    /// Number of reviews
    pub total_reviews: u64,
    /// Caller's own review
    pub user_review: Option<TrackReview>,
}

impl TrackEngine {
    /// Load a published track for display.
    ///
    /// A failing store is an error, never an absent track.
    pub async fn track_with_modules(
        &self,
        track_id: TrackId,
        caller: Option<&Identity>,
    ) -> Result<TrackWithModules> {
        let (track, modules, rating) = tokio::try_join!(
            self.published_track(track_id),
            self.modules(track_id),
            self.aggregate_rating(track_id),
        )?;

        let mut aggregate = TrackWithModules {
            track,
            modules,
            user_progress: None,
            module_progress: Vec::new(),
            module_states: Vec::new(),
            average_rating: rating.average_rating,
            total_reviews: rating.total_reviews,
            user_review: None,
        };

        let Some(identity) = caller.filter(|c| !c.user_id.is_blank()) else {
            return Ok(aggregate);
        };
        let user_id = &identity.user_id;

        let (progress, completions, is_favorite, review) = tokio::try_join!(
            self.bounded(
                "load_track_progress",
                self.storage.load_track_progress(user_id, track_id)
            ),
            self.bounded(
                "list_module_progress",
                self.storage.list_module_progress(user_id, track_id)
            ),
            self.bounded("load_favorite", self.storage.load_favorite(user_id, track_id)),
            self.bounded("load_review", self.storage.load_review(user_id, track_id)),
        )?;

        aggregate.user_progress = progress
            .map(|p| derive_view(&p, &aggregate.modules, &completions, is_favorite));
        aggregate.module_states = derive_states(
            &aggregate.track,
            &aggregate.modules,
            &completed_set(&completions),
            identity.is_premium,
        );
        aggregate.module_progress = completions
            .into_iter()
            .filter(|c| aggregate.modules.iter().any(|m| m.id == c.module_id))
            .collect();
        aggregate.user_review = review;
        Ok(aggregate)
    }
}
