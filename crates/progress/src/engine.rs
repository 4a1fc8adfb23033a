//! The progression engine and its shared store plumbing.

use std::future::Future;
use std::sync::Arc;
use trackflow_core::{
    Identity, Module, ModuleId, ProgressView, Track, TrackId, UserId, UserModuleProgress,
    UserProfile, UserTrackProgress,
};
use trackflow_storage::Storage;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{Result, TrackError};

/// Track progression and access-control engine.
///
/// Stateless between calls: every command reads and writes through the
/// [`Storage`] collaborator, and every store call is bounded by
/// [`EngineConfig::store_timeout`].
#[derive(Clone)]
pub struct TrackEngine {
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) config: EngineConfig,
}

impl TrackEngine {
    /// Create an engine over `storage` with default configuration.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            config: EngineConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve an identity from the stored profile. Users without a profile
    /// are on the free tier.
    pub async fn identity(&self, user_id: UserId) -> Result<Identity> {
        let profile = self
            .bounded("load_profile", self.storage.load_profile(&user_id))
            .await?;
        Ok(Identity {
            is_premium: profile.map(|p| p.is_premium).unwrap_or(false),
            user_id,
        })
    }

    /// Record a user's premium entitlement.
    pub async fn set_premium(&self, user_id: UserId, is_premium: bool) -> Result<()> {
        require_user(&user_id)?;
        self.bounded(
            "save_profile",
            self.storage.save_profile(&UserProfile { user_id, is_premium }),
        )
        .await
    }

    /// Check that the store answers within the timeout.
    pub async fn health_check(&self) -> Result<()> {
        self.bounded("health_check", self.storage.health_check()).await
    }

    /// Run a store call under the configured timeout.
    pub(crate) async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = trackflow_storage::Result<T>>,
    {
        match tokio::time::timeout(self.config.store_timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                warn!(op, error = %e, "store call failed");
                TrackError::from(e)
            }),
            Err(_) => {
                warn!(op, timeout = ?self.config.store_timeout, "store call timed out");
                Err(TrackError::TransientStore(format!(
                    "{} timed out after {:?}",
                    op, self.config.store_timeout
                )))
            }
        }
    }

    /// Load a track visible to learners.
    pub(crate) async fn published_track(&self, track_id: TrackId) -> Result<Track> {
        match self.bounded("load_track", self.storage.load_track(track_id)).await? {
            Some(track) if track.is_published => Ok(track),
            Some(_) => {
                debug!(%track_id, "track is unpublished");
                Err(TrackError::NotFound(format!("track {}", track_id)))
            }
            None => Err(TrackError::NotFound(format!("track {}", track_id))),
        }
    }

    /// Modules of a track, ordered by `order_index`.
    pub(crate) async fn modules(&self, track_id: TrackId) -> Result<Vec<Module>> {
        self.bounded("list_modules", self.storage.list_modules(track_id)).await
    }

    /// Build the reader view of a stored progress row.
    pub(crate) async fn view_of(
        &self,
        progress: &UserTrackProgress,
        modules: &[Module],
    ) -> Result<(ProgressView, Vec<UserModuleProgress>)> {
        let completions = self
            .bounded(
                "list_module_progress",
                self.storage
                    .list_module_progress(&progress.user_id, progress.track_id),
            )
            .await?;
        let is_favorite = self
            .bounded(
                "load_favorite",
                self.storage.load_favorite(&progress.user_id, progress.track_id),
            )
            .await?;
        let view = derive_view(progress, modules, &completions, is_favorite);
        Ok((view, completions))
    }
}

/// Reject calls without a usable user id.
pub(crate) fn require_user(user_id: &UserId) -> Result<()> {
    if user_id.is_blank() {
        Err(TrackError::Unauthorized)
    } else {
        Ok(())
    }
}

/// Derive percentage and current module from completion rows.
///
/// Only completions of modules currently in the track count.
pub(crate) fn derive_view(
    progress: &UserTrackProgress,
    modules: &[Module],
    completions: &[UserModuleProgress],
    is_favorite: bool,
) -> ProgressView {
    let done = |id: ModuleId| completions.iter().any(|c| c.module_id == id && c.is_completed);
    let completed = modules.iter().filter(|m| done(m.id)).count();

    ProgressView {
        user_id: progress.user_id.clone(),
        track_id: progress.track_id,
        started_at: progress.started_at,
        completed_at: progress.completed_at,
        progress_percentage: trackflow_core::progress_percentage(completed, modules.len()),
        current_module_id: modules.iter().map(|m| m.id).find(|id| !done(*id)),
        is_favorite,
    }
}
