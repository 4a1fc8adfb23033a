//! JSON file storage implementation.
//!
//! Stores one JSON file per entity or per unique key under a root directory.
//! Every read-modify-write runs under a single async mutex and files are
//! replaced via rename, so each [`Storage`] operation is atomic with respect
//! to other callers sharing the same `JsonStorage` instance. Separate
//! processes writing the same directory are not coordinated.

use std::path::{Path, PathBuf};
use trackflow_core::{
    Module, ModuleId, RatingStats, Time, Track, TrackFavorite, TrackId, TrackReview, UserId,
    UserModuleProgress, UserProfile, UserTrackProgress,
};
use super::{Result, Storage, StorageError};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStorage {
    /// Create storage, creating the top-level directories under `root`.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        for dir in [
            "tracks",
            "modules",
            "profiles",
            "user_tracks",
            "module_progress",
            "favorites",
            "reviews",
            "rating_stats",
        ] {
            fs::create_dir_all(root.join(dir)).await?;
        }

        debug!("Opened JSON storage at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn track_path(&self, id: TrackId) -> PathBuf {
        self.root.join("tracks").join(format!("{}.json", id))
    }
    fn module_dir(&self, track_id: TrackId) -> PathBuf {
        self.root.join("modules").join(track_id.to_string())
    }
    fn module_path(&self, track_id: TrackId, id: ModuleId) -> PathBuf {
        self.module_dir(track_id).join(format!("{}.json", id))
    }
    fn profile_path(&self, user_id: &UserId) -> PathBuf {
        self.root.join("profiles").join(format!("{}.json", user_key(user_id)))
    }
    fn user_track_path(&self, user_id: &UserId, track_id: TrackId) -> PathBuf {
        self.root
            .join("user_tracks")
            .join(user_key(user_id))
            .join(format!("{}.json", track_id))
    }
    fn module_progress_dir(&self, user_id: &UserId, track_id: TrackId) -> PathBuf {
        self.root
            .join("module_progress")
            .join(user_key(user_id))
            .join(track_id.to_string())
    }
    fn module_progress_path(&self, user_id: &UserId, track_id: TrackId, module_id: ModuleId) -> PathBuf {
        self.module_progress_dir(user_id, track_id)
            .join(format!("{}.json", module_id))
    }
    fn favorite_path(&self, user_id: &UserId, track_id: TrackId) -> PathBuf {
        self.root
            .join("favorites")
            .join(user_key(user_id))
            .join(format!("{}.json", track_id))
    }
    fn review_path(&self, user_id: &UserId, track_id: TrackId) -> PathBuf {
        self.root
            .join("reviews")
            .join(track_id.to_string())
            .join(format!("{}.json", user_key(user_id)))
    }
    fn rating_stats_path(&self, track_id: TrackId) -> PathBuf {
        self.root.join("rating_stats").join(format!("{}.json", track_id))
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_track(&self, track: &Track) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.track_path(track.id), track).await
    }

    async fn load_track(&self, id: TrackId) -> Result<Option<Track>> {
        read_json(&self.track_path(id)).await
    }

    async fn list_tracks(&self) -> Result<Vec<Track>> {
        list_dir(&self.root.join("tracks")).await
    }

    async fn save_module(&self, module: &Module) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let siblings: Vec<Module> = list_dir(&self.module_dir(module.track_id)).await?;
        if let Some(other) = siblings
            .iter()
            .find(|m| m.id != module.id && m.order_index == module.order_index)
        {
            return Err(StorageError::Conflict(format!(
                "track {} already has module {} at order_index {}",
                module.track_id, other.id, module.order_index
            )));
        }

        write_json(&self.module_path(module.track_id, module.id), module).await
    }

    async fn list_modules(&self, track_id: TrackId) -> Result<Vec<Module>> {
        let mut modules: Vec<Module> = list_dir(&self.module_dir(track_id)).await?;
        modules.sort_by_key(|m| m.order_index);
        Ok(modules)
    }

    async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.profile_path(&profile.user_id), profile).await
    }

    async fn load_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        read_json(&self.profile_path(user_id)).await
    }

    async fn start_track(&self, progress: &UserTrackProgress) -> Result<(UserTrackProgress, bool)> {
        let _guard = self.write_lock.lock().await;
        let path = self.user_track_path(&progress.user_id, progress.track_id);

        if let Some(existing) = read_json::<UserTrackProgress>(&path).await? {
            return Ok((existing, false));
        }
        write_json(&path, progress).await?;
        Ok((progress.clone(), true))
    }

    async fn load_track_progress(
        &self,
        user_id: &UserId,
        track_id: TrackId,
    ) -> Result<Option<UserTrackProgress>> {
        read_json(&self.user_track_path(user_id, track_id)).await
    }

    async fn mark_track_completed(
        &self,
        user_id: &UserId,
        track_id: TrackId,
        at: Time,
    ) -> Result<Option<UserTrackProgress>> {
        let _guard = self.write_lock.lock().await;
        let path = self.user_track_path(user_id, track_id);

        let Some(mut progress) = read_json::<UserTrackProgress>(&path).await? else {
            return Ok(None);
        };
        if progress.completed_at.is_none() {
            progress.completed_at = Some(at);
            write_json(&path, &progress).await?;
        }
        Ok(Some(progress))
    }

    async fn complete_module(
        &self,
        completion: &UserModuleProgress,
    ) -> Result<(UserModuleProgress, bool)> {
        let _guard = self.write_lock.lock().await;
        let path = self.module_progress_path(
            &completion.user_id,
            completion.track_id,
            completion.module_id,
        );

        let stored = match read_json::<UserModuleProgress>(&path).await? {
            Some(existing) if existing.is_completed => return Ok((existing, false)),
            Some(mut existing) => {
                existing.is_completed = true;
                existing.completed_at = existing.completed_at.or(completion.completed_at);
                existing
            }
            None => completion.clone(),
        };
        write_json(&path, &stored).await?;
        Ok((stored, true))
    }

    async fn list_module_progress(
        &self,
        user_id: &UserId,
        track_id: TrackId,
    ) -> Result<Vec<UserModuleProgress>> {
        list_dir(&self.module_progress_dir(user_id, track_id)).await
    }

    async fn count_completed_modules(
        &self,
        user_id: &UserId,
        track_id: TrackId,
        modules: &[ModuleId],
    ) -> Result<usize> {
        let rows = self.list_module_progress(user_id, track_id).await?;
        Ok(rows
            .iter()
            .filter(|p| p.is_completed && modules.contains(&p.module_id))
            .count())
    }

    async fn toggle_favorite(&self, user_id: &UserId, track_id: TrackId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.favorite_path(user_id, track_id);

        let current = read_json::<TrackFavorite>(&path)
            .await?
            .map(|f| f.is_favorite)
            .unwrap_or(false);
        let favorite = TrackFavorite {
            user_id: user_id.clone(),
            track_id,
            is_favorite: !current,
            updated_at: chrono::Utc::now(),
        };
        write_json(&path, &favorite).await?;
        Ok(favorite.is_favorite)
    }

    async fn load_favorite(&self, user_id: &UserId, track_id: TrackId) -> Result<bool> {
        Ok(read_json::<TrackFavorite>(&self.favorite_path(user_id, track_id))
            .await?
            .map(|f| f.is_favorite)
            .unwrap_or(false))
    }

    async fn upsert_review(&self, review: &TrackReview) -> Result<TrackReview> {
        let _guard = self.write_lock.lock().await;
        let path = self.review_path(&review.user_id, review.track_id);
        let stats_path = self.rating_stats_path(review.track_id);

        let existing = read_json::<TrackReview>(&path).await?;
        let mut stats = read_json::<RatingStats>(&stats_path).await?.unwrap_or_default();
        stats.apply_upsert(existing.as_ref().map(|r| r.rating), review.rating);

        let stored = match existing {
            Some(prev) => TrackReview {
                id: prev.id,
                created_at: prev.created_at,
                ..review.clone()
            },
            None => review.clone(),
        };
        // Stats first: a failed review write leaves totals short, never over.
        write_json(&stats_path, &stats).await?;
        write_json(&path, &stored).await?;
        Ok(stored)
    }

    async fn load_review(&self, user_id: &UserId, track_id: TrackId) -> Result<Option<TrackReview>> {
        read_json(&self.review_path(user_id, track_id)).await
    }

    async fn delete_review(&self, user_id: &UserId, track_id: TrackId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.review_path(user_id, track_id);

        let Some(existing) = read_json::<TrackReview>(&path).await? else {
            return Ok(false);
        };
        let stats_path = self.rating_stats_path(track_id);
        let mut stats = read_json::<RatingStats>(&stats_path).await?.unwrap_or_default();
        stats.apply_delete(existing.rating);

        write_json(&stats_path, &stats).await?;
        fs::remove_file(&path).await?;
        Ok(true)
    }

    async fn load_rating_stats(&self, track_id: TrackId) -> Result<RatingStats> {
        Ok(read_json(&self.rating_stats_path(track_id)).await?.unwrap_or_default())
    }

    async fn health_check(&self) -> Result<()> {
        let meta = fs::metadata(&self.root).await?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StorageError::Other(format!("{} is not a directory", self.root.display())))
        }
    }
}

/// Filesystem-safe key for an opaque user id.
fn user_key(user_id: &UserId) -> String {
    user_id
        .as_str()
        .bytes()
        .map(|b| format!("{:02x}", b))
        .collect()
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(items),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Some(item) = read_json(&entry.path()).await? {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trackflow_core::{Level, Rating, ReviewId};

    async fn storage() -> (tempfile::TempDir, JsonStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    fn review(user: &str, track_id: TrackId, rating: i64) -> TrackReview {
        let now = chrono::Utc::now();
        TrackReview {
            id: ReviewId::new(),
            user_id: UserId::new(user),
            track_id,
            rating: Rating::new(rating).unwrap(),
            comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_modules_listed_in_order() {
        let (_dir, storage) = storage().await;
        let track = Track::new("Growth 101", Level::Beginner);
        storage.save_track(&track).await.unwrap();

        for (title, idx) in [("M2", 2), ("M0", 0), ("M1", 1)] {
            storage.save_module(&Module::new(track.id, title, idx)).await.unwrap();
        }

        let titles: Vec<_> = storage
            .list_modules(track.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.title)
            .collect();
        assert_eq!(titles, vec!["M0", "M1", "M2"]);
    }

    #[tokio::test]
    async fn test_duplicate_order_index_conflicts() {
        let (_dir, storage) = storage().await;
        let track = Track::new("Growth 101", Level::Beginner);

        let mut first = Module::new(track.id, "M0", 0);
        storage.save_module(&first).await.unwrap();
        let err = storage
            .save_module(&Module::new(track.id, "Other", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        // re-saving the same module is an update, not a conflict
        first.title = "M0 renamed".into();
        storage.save_module(&first).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_track_keeps_first_row() {
        let (_dir, storage) = storage().await;
        let track_id = TrackId::new();
        let user = UserId::new("u-1");

        let first = UserTrackProgress::started(user.clone(), track_id);
        let (row, created) = storage.start_track(&first).await.unwrap();
        assert!(created);
        assert_eq!(row, first);

        let again = UserTrackProgress::started(user, track_id);
        let (row, created) = storage.start_track(&again).await.unwrap();
        assert!(!created);
        assert_eq!(row.started_at, first.started_at);
    }

    #[tokio::test]
    async fn test_complete_module_first_writer_wins() {
        let (_dir, storage) = storage().await;
        let user = UserId::new("u-1");
        let track_id = TrackId::new();
        let module_id = ModuleId::new();

        let first = UserModuleProgress::completed_now(user.clone(), track_id, module_id);
        let (_, was_first) = storage.complete_module(&first).await.unwrap();
        assert!(was_first);

        let second = UserModuleProgress::completed_now(user.clone(), track_id, module_id);
        let (row, was_first) = storage.complete_module(&second).await.unwrap();
        assert!(!was_first);
        assert_eq!(row.completed_at, first.completed_at);

        let other = ModuleId::new();
        assert_eq!(
            storage
                .count_completed_modules(&user, track_id, &[module_id, other])
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            storage.count_completed_modules(&user, track_id, &[other]).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_mark_track_completed_is_set_once() {
        let (_dir, storage) = storage().await;
        let user = UserId::new("u-1");
        let track_id = TrackId::new();

        assert!(storage
            .mark_track_completed(&user, track_id, chrono::Utc::now())
            .await
            .unwrap()
            .is_none());

        storage
            .start_track(&UserTrackProgress::started(user.clone(), track_id))
            .await
            .unwrap();
        let first_at = chrono::Utc::now();
        let row = storage.mark_track_completed(&user, track_id, first_at).await.unwrap().unwrap();
        assert_eq!(row.completed_at, Some(first_at));

        let later = first_at + chrono::Duration::seconds(30);
        let row = storage.mark_track_completed(&user, track_id, later).await.unwrap().unwrap();
        assert_eq!(row.completed_at, Some(first_at));
    }

    #[tokio::test]
    async fn test_concurrent_toggles_do_not_lose_updates() {
        let (_dir, storage) = storage().await;
        let storage = Arc::new(storage);
        let user = UserId::new("u-1");
        let track_id = TrackId::new();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let storage = storage.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                storage.toggle_favorite(&user, track_id).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // an even number of flips lands back on the default
        assert!(!storage.load_favorite(&user, track_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_review_upsert_maintains_stats() {
        let (_dir, storage) = storage().await;
        let track_id = TrackId::new();

        let first = storage.upsert_review(&review("a", track_id, 3)).await.unwrap();
        let replaced = storage.upsert_review(&review("a", track_id, 5)).await.unwrap();
        assert_eq!(replaced.id, first.id);
        assert_eq!(replaced.created_at, first.created_at);
        assert_eq!(replaced.rating.value(), 5);

        storage.upsert_review(&review("b", track_id, 1)).await.unwrap();
        assert_eq!(
            storage.load_rating_stats(track_id).await.unwrap(),
            RatingStats { sum: 6, count: 2 }
        );

        assert!(storage.delete_review(&UserId::new("b"), track_id).await.unwrap());
        assert!(!storage.delete_review(&UserId::new("b"), track_id).await.unwrap());
        assert_eq!(
            storage.load_rating_stats(track_id).await.unwrap(),
            RatingStats { sum: 5, count: 1 }
        );
    }

    #[tokio::test]
    async fn test_resubmission_after_lost_stats() {
        let (_dir, storage) = storage().await;
        let track_id = TrackId::new();

        storage.upsert_review(&review("a", track_id, 4)).await.unwrap();
        fs::remove_file(storage.rating_stats_path(track_id)).await.unwrap();

        storage.upsert_review(&review("a", track_id, 2)).await.unwrap();
        assert_eq!(
            storage.load_rating_stats(track_id).await.unwrap(),
            RatingStats { sum: 2, count: 1 }
        );
    }

    #[tokio::test]
    async fn test_user_ids_with_path_characters() {
        let (_dir, storage) = storage().await;
        let user = UserId::new("../../etc/passwd");
        let profile = UserProfile { user_id: user.clone(), is_premium: true };
        storage.save_profile(&profile).await.unwrap();
        assert_eq!(storage.load_profile(&user).await.unwrap(), Some(profile));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_dir, storage) = storage().await;
        assert!(storage.health_check().await.is_ok());
    }
}
