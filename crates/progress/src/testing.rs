//! Test fixtures shared by the engine's unit tests.

use std::sync::Arc;
use std::time::Duration;
use trackflow_core::{
    Level, Module, ModuleId, RatingStats, Time, Track, TrackId, TrackReview, UserId,
    UserModuleProgress, UserProfile, UserTrackProgress,
};
use trackflow_storage::{JsonStorage, Result as StoreResult, Storage, StorageError};

use crate::{EngineConfig, TrackEngine};

/// Engine over a JSON store in a temporary directory.
pub(crate) struct TestEnv {
    _dir: tempfile::TempDir,
    pub storage: Arc<JsonStorage>,
    pub engine: TrackEngine,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        let engine = TrackEngine::new(storage.clone());
        Self { _dir: dir, storage, engine }
    }
}

/// Save a published track with `n` sequential modules.
pub(crate) async fn seed_track(
    env: &TestEnv,
    title: &str,
    level: Level,
    n: u32,
    premium: bool,
) -> (Track, Vec<Module>) {
    let mut track = Track::new(title, level);
    track.is_premium = premium;
    track.total_modules = n;
    env.storage.save_track(&track).await.unwrap();

    let mut modules = Vec::new();
    for i in 0..n {
        let module = Module::new(track.id, format!("M{}", i), i);
        env.storage.save_module(&module).await.unwrap();
        modules.push(module);
    }
    (track, modules)
}

/// A store that is down: every call fails, or never answers when `stall`.
pub(crate) struct BrokenStorage {
    pub stall: bool,
}

impl BrokenStorage {
    pub fn engine(stall: bool) -> TrackEngine {
        TrackEngine::new(Arc::new(BrokenStorage { stall })).with_config(
            EngineConfig::default().with_store_timeout(Duration::from_millis(50)),
        )
    }

    async fn fail<T>(&self) -> StoreResult<T> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        Err(StorageError::Database("connection refused".into()))
    }
}

#[async_trait::async_trait]
impl Storage for BrokenStorage {
    async fn save_track(&self, _track: &Track) -> StoreResult<()> {
        self.fail().await
    }

    async fn load_track(&self, _id: TrackId) -> StoreResult<Option<Track>> {
        self.fail().await
    }

    async fn list_tracks(&self) -> StoreResult<Vec<Track>> {
        self.fail().await
    }

    async fn save_module(&self, _module: &Module) -> StoreResult<()> {
        self.fail().await
    }

    async fn list_modules(&self, _track_id: TrackId) -> StoreResult<Vec<Module>> {
        self.fail().await
    }

    async fn save_profile(&self, _profile: &UserProfile) -> StoreResult<()> {
        self.fail().await
    }

    async fn load_profile(&self, _user_id: &UserId) -> StoreResult<Option<UserProfile>> {
        self.fail().await
    }

    async fn start_track(
        &self,
        _progress: &UserTrackProgress,
    ) -> StoreResult<(UserTrackProgress, bool)> {
        self.fail().await
    }

    async fn load_track_progress(
        &self,
        _user_id: &UserId,
        _track_id: TrackId,
    ) -> StoreResult<Option<UserTrackProgress>> {
        self.fail().await
    }

    async fn mark_track_completed(
        &self,
        _user_id: &UserId,
        _track_id: TrackId,
        _at: Time,
    ) -> StoreResult<Option<UserTrackProgress>> {
        self.fail().await
    }

    async fn complete_module(
        &self,
        _completion: &UserModuleProgress,
    ) -> StoreResult<(UserModuleProgress, bool)> {
        self.fail().await
    }

    async fn list_module_progress(
        &self,
        _user_id: &UserId,
        _track_id: TrackId,
    ) -> StoreResult<Vec<UserModuleProgress>> {
        self.fail().await
    }

    async fn count_completed_modules(
        &self,
        _user_id: &UserId,
        _track_id: TrackId,
        _modules: &[ModuleId],
    ) -> StoreResult<usize> {
        self.fail().await
    }

    async fn toggle_favorite(&self, _user_id: &UserId, _track_id: TrackId) -> StoreResult<bool> {
        self.fail().await
    }

    async fn load_favorite(&self, _user_id: &UserId, _track_id: TrackId) -> StoreResult<bool> {
        self.fail().await
    }

    async fn upsert_review(&self, _review: &TrackReview) -> StoreResult<TrackReview> {
        self.fail().await
    }

    async fn load_review(
        &self,
        _user_id: &UserId,
        _track_id: TrackId,
    ) -> StoreResult<Option<TrackReview>> {
        self.fail().await
    }

    async fn delete_review(&self, _user_id: &UserId, _track_id: TrackId) -> StoreResult<bool> {
        self.fail().await
    }

    async fn load_rating_stats(&self, _track_id: TrackId) -> StoreResult<RatingStats> {
        self.fail().await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.fail().await
    }
}
