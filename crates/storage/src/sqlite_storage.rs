//! SQLite storage backend.
//!
//! Relational tables with the uniqueness constraints the engine relies on.
//! Conditional writes (insert-or-ignore, set-if-unset, boolean negation) are
//! expressed in SQL so they stay atomic across connections.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use trackflow_core::{
    Module, ModuleId, Rating, RatingStats, Time, Track, TrackId, TrackReview, UserId,
    UserModuleProgress, UserProfile, UserTrackProgress,
};
use tracing::debug;

use super::trait_::{Result, Storage, StorageError};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if missing) the database at `url`, e.g. `sqlite://trackflow.db`.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;
        debug!("Opened SQLite storage at {}", url);

        Ok(storage)
    }

    /// Create an in-memory SQLite storage for testing.
    ///
    /// A single connection is used since every in-memory connection would
    /// otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS tracks (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS track_modules (
                id TEXT PRIMARY KEY,
                track_id TEXT NOT NULL,
                order_index INTEGER NOT NULL,
                data TEXT NOT NULL,
                UNIQUE (track_id, order_index)
            )",
            "CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                is_premium INTEGER NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS user_tracks (
                user_id TEXT NOT NULL,
                track_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                PRIMARY KEY (user_id, track_id)
            )",
            "CREATE TABLE IF NOT EXISTS user_module_progress (
                user_id TEXT NOT NULL,
                track_id TEXT NOT NULL,
                module_id TEXT NOT NULL,
                is_completed INTEGER NOT NULL,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, track_id, module_id)
            )",
            "CREATE TABLE IF NOT EXISTS track_favorites (
                user_id TEXT NOT NULL,
                track_id TEXT NOT NULL,
                is_favorite INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, track_id)
            )",
            "CREATE TABLE IF NOT EXISTS track_reviews (
                id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                track_id TEXT NOT NULL,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                comment TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, track_id)
            )",
            "CREATE TABLE IF NOT EXISTS track_rating_stats (
                track_id TEXT PRIMARY KEY,
                rating_sum INTEGER NOT NULL,
                rating_count INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_track_modules_order ON track_modules(track_id, order_index)",
        ];

        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await.map_err(db_err)?;
        }

        Ok(())
    }

    fn track_progress_from_row(row: &SqliteRow) -> Result<UserTrackProgress> {
        Ok(UserTrackProgress {
            user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(db_err)?),
            track_id: parse_id(row, "track_id")?,
            started_at: parse_time(row, "started_at")?,
            completed_at: parse_opt_time(row, "completed_at")?,
        })
    }

    fn module_progress_from_row(row: &SqliteRow) -> Result<UserModuleProgress> {
        Ok(UserModuleProgress {
            user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(db_err)?),
            track_id: parse_id(row, "track_id")?,
            module_id: parse_id(row, "module_id")?,
            is_completed: row.try_get::<bool, _>("is_completed").map_err(db_err)?,
            completed_at: parse_opt_time(row, "completed_at")?,
            created_at: parse_time(row, "created_at")?,
        })
    }

    fn review_from_row(row: &SqliteRow) -> Result<TrackReview> {
        let rating: i64 = row.try_get("rating").map_err(db_err)?;
        Ok(TrackReview {
            id: parse_id(row, "id")?,
            user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(db_err)?),
            track_id: parse_id(row, "track_id")?,
            rating: Rating::new(rating).map_err(|e| StorageError::Other(e.to_string()))?,
            comment: row.try_get("comment").map_err(db_err)?,
            created_at: parse_time(row, "created_at")?,
            updated_at: parse_time(row, "updated_at")?,
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    // === Catalog ===

    async fn save_track(&self, track: &Track) -> Result<()> {
        let data = serde_json::to_string(track)?;

        sqlx::query(
            "INSERT INTO tracks (id, data, created_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(track.id.to_string())
        .bind(data)
        .bind(track.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn load_track(&self, id: TrackId) -> Result<Option<Track>> {
        let row = sqlx::query("SELECT data FROM tracks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_tracks(&self) -> Result<Vec<Track>> {
        let rows = sqlx::query("SELECT data FROM tracks ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let data: String = row.try_get("data").map_err(db_err)?;
                serde_json::from_str(&data).map_err(StorageError::from)
            })
            .collect()
    }

    async fn save_module(&self, module: &Module) -> Result<()> {
        let data = serde_json::to_string(module)?;

        sqlx::query(
            "INSERT INTO track_modules (id, track_id, order_index, data) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                track_id = excluded.track_id,
                order_index = excluded.order_index,
                data = excluded.data",
        )
        .bind(module.id.to_string())
        .bind(module.track_id.to_string())
        .bind(i64::from(module.order_index))
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict(format!(
                "track {} already has a module at order_index {}",
                module.track_id, module.order_index
            )),
            _ => db_err(e),
        })?;

        Ok(())
    }

    async fn list_modules(&self, track_id: TrackId) -> Result<Vec<Module>> {
        let rows = sqlx::query(
            "SELECT data FROM track_modules WHERE track_id = ? ORDER BY order_index ASC",
        )
        .bind(track_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                let data: String = row.try_get("data").map_err(db_err)?;
                serde_json::from_str(&data).map_err(StorageError::from)
            })
            .collect()
    }

    // === Profiles ===

    async fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO profiles (user_id, is_premium) VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET is_premium = excluded.is_premium",
        )
        .bind(profile.user_id.as_str())
        .bind(profile.is_premium)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn load_profile(&self, user_id: &UserId) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT is_premium FROM profiles WHERE user_id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(UserProfile {
                user_id: user_id.clone(),
                is_premium: row.try_get("is_premium").map_err(db_err)?,
            })),
            None => Ok(None),
        }
    }

    // === Track progress ===

    async fn start_track(&self, progress: &UserTrackProgress) -> Result<(UserTrackProgress, bool)> {
        let inserted = sqlx::query(
            "INSERT INTO user_tracks (user_id, track_id, started_at, completed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, track_id) DO NOTHING",
        )
        .bind(progress.user_id.as_str())
        .bind(progress.track_id.to_string())
        .bind(progress.started_at.to_rfc3339())
        .bind(progress.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected()
            == 1;

        let stored = self
            .load_track_progress(&progress.user_id, progress.track_id)
            .await?
            .ok_or_else(|| StorageError::Other("user_tracks row vanished after insert".into()))?;
        Ok((stored, inserted))
    }

    async fn load_track_progress(
        &self,
        user_id: &UserId,
        track_id: TrackId,
    ) -> Result<Option<UserTrackProgress>> {
        let row = sqlx::query(
            "SELECT user_id, track_id, started_at, completed_at FROM user_tracks
            WHERE user_id = ? AND track_id = ?",
        )
        .bind(user_id.as_str())
        .bind(track_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(Self::track_progress_from_row).transpose()
    }

    async fn mark_track_completed(
        &self,
        user_id: &UserId,
        track_id: TrackId,
        at: Time,
    ) -> Result<Option<UserTrackProgress>> {
        sqlx::query(
            "UPDATE user_tracks SET completed_at = COALESCE(completed_at, ?)
            WHERE user_id = ? AND track_id = ?",
        )
        .bind(at.to_rfc3339())
        .bind(user_id.as_str())
        .bind(track_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.load_track_progress(user_id, track_id).await
    }

    // === Module progress ===

    async fn complete_module(
        &self,
        completion: &UserModuleProgress,
    ) -> Result<(UserModuleProgress, bool)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let user = completion.user_id.as_str();
        let track = completion.track_id.to_string();
        let module = completion.module_id.to_string();
        let completed_at = completion.completed_at.map(|t| t.to_rfc3339());

        let inserted = sqlx::query(
            "INSERT INTO user_module_progress
                (user_id, track_id, module_id, is_completed, completed_at, created_at)
            VALUES (?, ?, ?, 1, ?, ?)
            ON CONFLICT(user_id, track_id, module_id) DO NOTHING",
        )
        .bind(user)
        .bind(&track)
        .bind(&module)
        .bind(&completed_at)
        .bind(completion.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected()
            == 1;

        let first = if inserted {
            true
        } else {
            // Row exists; only an incomplete row may flip, keeping any earlier timestamp.
            sqlx::query(
                "UPDATE user_module_progress
                SET is_completed = 1, completed_at = COALESCE(completed_at, ?)
                WHERE user_id = ? AND track_id = ? AND module_id = ? AND is_completed = 0",
            )
            .bind(&completed_at)
            .bind(user)
            .bind(&track)
            .bind(&module)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected()
                == 1
        };

        let row = sqlx::query(
            "SELECT user_id, track_id, module_id, is_completed, completed_at, created_at
            FROM user_module_progress WHERE user_id = ? AND track_id = ? AND module_id = ?",
        )
        .bind(user)
        .bind(&track)
        .bind(&module)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let stored = Self::module_progress_from_row(&row)?;

        tx.commit().await.map_err(db_err)?;
        Ok((stored, first))
    }

    async fn list_module_progress(
        &self,
        user_id: &UserId,
        track_id: TrackId,
    ) -> Result<Vec<UserModuleProgress>> {
        let rows = sqlx::query(
            "SELECT user_id, track_id, module_id, is_completed, completed_at, created_at
            FROM user_module_progress WHERE user_id = ? AND track_id = ?",
        )
        .bind(user_id.as_str())
        .bind(track_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(Self::module_progress_from_row).collect()
    }

    async fn count_completed_modules(
        &self,
        user_id: &UserId,
        track_id: TrackId,
        modules: &[ModuleId],
    ) -> Result<usize> {
        let rows = sqlx::query(
            "SELECT module_id FROM user_module_progress
            WHERE user_id = ? AND track_id = ? AND is_completed = 1",
        )
        .bind(user_id.as_str())
        .bind(track_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut count = 0;
        for row in &rows {
            let id: ModuleId = parse_id(row, "module_id")?;
            if modules.contains(&id) {
                count += 1;
            }
        }
        Ok(count)
    }

    // === Favorites ===

    async fn toggle_favorite(&self, user_id: &UserId, track_id: TrackId) -> Result<bool> {
        let row = sqlx::query(
            "INSERT INTO track_favorites (user_id, track_id, is_favorite, updated_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(user_id, track_id) DO UPDATE SET
                is_favorite = NOT track_favorites.is_favorite,
                updated_at = excluded.updated_at
            RETURNING is_favorite",
        )
        .bind(user_id.as_str())
        .bind(track_id.to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.try_get::<bool, _>("is_favorite").map_err(db_err)
    }

    async fn load_favorite(&self, user_id: &UserId, track_id: TrackId) -> Result<bool> {
        let row = sqlx::query(
            "SELECT is_favorite FROM track_favorites WHERE user_id = ? AND track_id = ?",
        )
        .bind(user_id.as_str())
        .bind(track_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => row.try_get::<bool, _>("is_favorite").map_err(db_err),
            None => Ok(false),
        }
    }

    // === Reviews ===

    async fn upsert_review(&self, review: &TrackReview) -> Result<TrackReview> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let user = review.user_id.as_str();
        let track = review.track_id.to_string();

        // Write before reading: a deferred transaction that reads first
        // cannot upgrade to a write lock while another writer holds one.
        sqlx::query(
            "INSERT INTO track_rating_stats (track_id, rating_sum, rating_count) VALUES (?, 0, 0)
            ON CONFLICT(track_id) DO NOTHING",
        )
        .bind(&track)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let previous: Option<i64> = sqlx::query(
            "SELECT rating FROM track_reviews WHERE user_id = ? AND track_id = ?",
        )
        .bind(user)
        .bind(&track)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .map(|row| row.try_get("rating"))
        .transpose()
        .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO track_reviews (id, user_id, track_id, rating, comment, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, track_id) DO UPDATE SET
                rating = excluded.rating,
                comment = excluded.comment,
                updated_at = excluded.updated_at",
        )
        .bind(review.id.to_string())
        .bind(user)
        .bind(&track)
        .bind(i64::from(review.rating.value()))
        .bind(&review.comment)
        .bind(review.created_at.to_rfc3339())
        .bind(review.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let (sum_delta, count_delta) = match previous {
            Some(prev) => (i64::from(review.rating.value()) - prev, 0),
            None => (i64::from(review.rating.value()), 1),
        };
        sqlx::query(
            "INSERT INTO track_rating_stats (track_id, rating_sum, rating_count) VALUES (?, ?, ?)
            ON CONFLICT(track_id) DO UPDATE SET
                rating_sum = rating_sum + excluded.rating_sum,
                rating_count = rating_count + excluded.rating_count",
        )
        .bind(&track)
        .bind(sum_delta)
        .bind(count_delta)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let row = sqlx::query("SELECT * FROM track_reviews WHERE user_id = ? AND track_id = ?")
            .bind(user)
            .bind(&track)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        let stored = Self::review_from_row(&row)?;

        tx.commit().await.map_err(db_err)?;
        Ok(stored)
    }

    async fn load_review(&self, user_id: &UserId, track_id: TrackId) -> Result<Option<TrackReview>> {
        let row = sqlx::query("SELECT * FROM track_reviews WHERE user_id = ? AND track_id = ?")
            .bind(user_id.as_str())
            .bind(track_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(Self::review_from_row).transpose()
    }

    async fn delete_review(&self, user_id: &UserId, track_id: TrackId) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let track = track_id.to_string();

        let removed = sqlx::query(
            "DELETE FROM track_reviews WHERE user_id = ? AND track_id = ? RETURNING rating",
        )
        .bind(user_id.as_str())
        .bind(&track)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = removed else {
            tx.rollback().await.map_err(db_err)?;
            return Ok(false);
        };
        let rating: i64 = row.try_get("rating").map_err(db_err)?;

        sqlx::query(
            "UPDATE track_rating_stats
            SET rating_sum = MAX(rating_sum - ?, 0), rating_count = MAX(rating_count - 1, 0)
            WHERE track_id = ?",
        )
        .bind(rating)
        .bind(&track)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    async fn load_rating_stats(&self, track_id: TrackId) -> Result<RatingStats> {
        let row = sqlx::query(
            "SELECT rating_sum, rating_count FROM track_rating_stats WHERE track_id = ?",
        )
        .bind(track_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => {
                let sum: i64 = row.try_get("rating_sum").map_err(db_err)?;
                let count: i64 = row.try_get("rating_count").map_err(db_err)?;
                Ok(RatingStats {
                    sum: sum.max(0) as u64,
                    count: count.max(0) as u64,
                })
            }
            None => Ok(RatingStats::default()),
        }
    }

    // === Maintenance ===

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn parse_id<T: FromStr>(row: &SqliteRow, column: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column).map_err(db_err)?;
    raw.parse()
        .map_err(|e: T::Err| StorageError::Other(format!("bad {} '{}': {}", column, raw, e)))
}

fn parse_time(row: &SqliteRow, column: &str) -> Result<Time> {
    let raw: String = row.try_get(column).map_err(db_err)?;
    to_time(column, &raw)
}

fn parse_opt_time(row: &SqliteRow, column: &str) -> Result<Option<Time>> {
    let raw: Option<String> = row.try_get(column).map_err(db_err)?;
    raw.map(|s| to_time(column, &s)).transpose()
}

fn to_time(column: &str, raw: &str) -> Result<Time> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| StorageError::Other(format!("bad {} '{}': {}", column, raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackflow_core::{Level, ReviewId};

    fn review(user: &str, track_id: TrackId, rating: i64) -> TrackReview {
        let now = chrono::Utc::now();
        TrackReview {
            id: ReviewId::new(),
            user_id: UserId::new(user),
            track_id,
            rating: Rating::new(rating).unwrap(),
            comment: Some("ok".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_modules_ordered_and_unique() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let track = Track::new("Growth 101", Level::Beginner);
        storage.save_track(&track).await.unwrap();

        storage.save_module(&Module::new(track.id, "M1", 1)).await.unwrap();
        storage.save_module(&Module::new(track.id, "M0", 0)).await.unwrap();
        let err = storage.save_module(&Module::new(track.id, "Dup", 1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));

        let modules = storage.list_modules(track.id).await.unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].title, "M0");
        assert_eq!(storage.load_track(track.id).await.unwrap(), Some(track));
    }

    #[tokio::test]
    async fn test_toggle_favorite_is_involutive() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let user = UserId::new("u-1");
        let track_id = TrackId::new();

        assert!(!storage.load_favorite(&user, track_id).await.unwrap());
        assert!(storage.toggle_favorite(&user, track_id).await.unwrap());
        assert!(!storage.toggle_favorite(&user, track_id).await.unwrap());
        assert!(!storage.load_favorite(&user, track_id).await.unwrap());
        // favoriting creates no progress row
        assert!(storage.load_track_progress(&user, track_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_module_keeps_first_timestamp() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let user = UserId::new("u-1");
        let track_id = TrackId::new();
        let module_id = ModuleId::new();

        let first = UserModuleProgress::completed_now(user.clone(), track_id, module_id);
        let (row, was_first) = storage.complete_module(&first).await.unwrap();
        assert!(was_first);
        assert_eq!(row.completed_at, first.completed_at);

        let mut later = UserModuleProgress::completed_now(user.clone(), track_id, module_id);
        later.completed_at = Some(chrono::Utc::now() + chrono::Duration::minutes(5));
        let (row, was_first) = storage.complete_module(&later).await.unwrap();
        assert!(!was_first);
        assert_eq!(row.completed_at, first.completed_at);

        assert_eq!(
            storage.count_completed_modules(&user, track_id, &[module_id]).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_track_progress_start_and_complete_once() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let user = UserId::new("u-1");
        let track_id = TrackId::new();

        let (row, created) = storage
            .start_track(&UserTrackProgress::started(user.clone(), track_id))
            .await
            .unwrap();
        assert!(created);
        let (again, created) = storage
            .start_track(&UserTrackProgress::started(user.clone(), track_id))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.started_at, row.started_at);

        let at = chrono::Utc::now();
        let done = storage.mark_track_completed(&user, track_id, at).await.unwrap().unwrap();
        assert_eq!(done.completed_at, Some(at));
        let again = storage
            .mark_track_completed(&user, track_id, at + chrono::Duration::hours(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.completed_at, Some(at));
    }

    #[tokio::test]
    async fn test_review_upsert_and_stats() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let track_id = TrackId::new();

        let first = storage.upsert_review(&review("a", track_id, 3)).await.unwrap();
        let second = storage.upsert_review(&review("a", track_id, 5)).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.rating.value(), 5);
        storage.upsert_review(&review("b", track_id, 4)).await.unwrap();

        assert_eq!(
            storage.load_rating_stats(track_id).await.unwrap(),
            RatingStats { sum: 9, count: 2 }
        );

        assert!(storage.delete_review(&UserId::new("a"), track_id).await.unwrap());
        assert!(!storage.delete_review(&UserId::new("a"), track_id).await.unwrap());
        assert_eq!(
            storage.load_rating_stats(track_id).await.unwrap(),
            RatingStats { sum: 4, count: 1 }
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        assert!(storage.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_reviews_on_shared_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("reviews.db").display());
        let storage = std::sync::Arc::new(SqliteStorage::new(&url).await.unwrap());
        let track_id = TrackId::new();

        let mut handles = Vec::new();
        for i in 0..20 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .upsert_review(&review(&format!("u{}", i), track_id, 1 + i % 5))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // ratings 1..=5, four times each
        assert_eq!(
            storage.load_rating_stats(track_id).await.unwrap(),
            RatingStats { sum: 60, count: 20 }
        );
    }
}
