//! Catalog listing and content import.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use trackflow_core::{Identity, Level, Module, Track, TrackStatus, ValidationError};
use tracing::{debug, info};

use crate::engine::TrackEngine;
use crate::error::{Result, TrackError};

/// Catalog filter. Empty lists match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackFilter {
    /// Case-insensitive text matched against title, subtitle and categories
    pub search: Option<String>,
    /// Any-of
    pub categories: Vec<String>,
    /// Any-of
    pub levels: Vec<Level>,
    /// Any-of, evaluated for the caller
    pub statuses: Vec<TrackStatus>,
    /// Maximum number of entries
    pub limit: Option<usize>,
}

impl TrackFilter {
    fn matches_content(&self, track: &Track) -> bool {
        if let Some(term) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let term = term.to_lowercase();
            let hit = track.title.to_lowercase().contains(&term)
                || track
                    .subtitle
                    .as_deref()
                    .is_some_and(|s| s.to_lowercase().contains(&term))
                || track
                    .categories
                    .iter()
                    .any(|c| c.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        if !self.categories.is_empty()
            && !track
                .categories
                .iter()
                .any(|c| self.categories.iter().any(|f| f.eq_ignore_ascii_case(c)))
        {
            return false;
        }
        self.levels.is_empty() || self.levels.contains(&track.level)
    }
}

/// One catalog entry as seen by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    /// The track
    pub track: Track,
    /// Caller's percentage, 0 when anonymous or not started
    pub progress_percentage: u8,
    /// Caller's status
    pub status: TrackStatus,
    /// Caller's favorite flag
    pub is_favorite: bool,
}

impl TrackEngine {
    /// List published tracks, newest first.
    pub async fn list_tracks(
        &self,
        filter: &TrackFilter,
        caller: Option<&Identity>,
    ) -> Result<Vec<TrackSummary>> {
        let mut tracks: Vec<Track> = self
            .bounded("list_tracks", self.storage.list_tracks())
            .await?
            .into_iter()
            .filter(|t| t.is_published && filter.matches_content(t))
            .collect();
        tracks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let user = caller.map(|c| &c.user_id).filter(|u| !u.is_blank());
        let mut summaries = Vec::with_capacity(tracks.len());
        for track in tracks {
            if filter.limit.is_some_and(|limit| summaries.len() >= limit) {
                break;
            }

            let (progress_percentage, status, is_favorite) = match user {
                Some(user_id) => {
                    let progress = self
                        .bounded(
                            "load_track_progress",
                            self.storage.load_track_progress(user_id, track.id),
                        )
                        .await?;
                    let percentage = match &progress {
                        Some(_) => self.percentage_for(user_id, track.id).await?,
                        None => 0,
                    };
                    let status = match progress {
                        Some(p) if p.completed_at.is_some() => TrackStatus::Completed,
                        Some(_) if percentage > 0 => TrackStatus::InProgress,
                        _ => TrackStatus::NotStarted,
                    };
                    let is_favorite = self
                        .bounded(
                            "load_favorite",
                            self.storage.load_favorite(user_id, track.id),
                        )
                        .await?;
                    (percentage, status, is_favorite)
                }
                None => (0, TrackStatus::NotStarted, false),
            };

            if !filter.statuses.is_empty() && !filter.statuses.contains(&status) {
                continue;
            }
            summaries.push(TrackSummary {
                track,
                progress_percentage,
                status,
                is_favorite,
            });
        }

        debug!(count = summaries.len(), "tracks listed");
        Ok(summaries)
    }

    /// Store a track and its modules as authored content.
    ///
    /// Modules are attached to `track` and `total_modules` is set to their
    /// count. Duplicate `order_index` values are a conflict. A prerequisite
    /// must be a module of the same track with a lower `order_index`, so the
    /// first module is always reachable.
    pub async fn import_track(&self, mut track: Track, mut modules: Vec<Module>) -> Result<Track> {
        track.validate()?;
        let mut seen = HashSet::new();
        for module in &mut modules {
            module.track_id = track.id;
            module.validate()?;
            if !seen.insert(module.order_index) {
                return Err(TrackError::Conflict(format!(
                    "order_index {} used twice in track {}",
                    module.order_index, track.id
                )));
            }
        }
        modules.sort_by_key(|m| m.order_index);
        for module in &modules {
            let Some(required) = module.prerequisite else {
                continue;
            };
            let earlier = modules
                .iter()
                .any(|m| m.id == required && m.order_index < module.order_index);
            if !earlier {
                return Err(ValidationError::PrerequisiteNotEarlier {
                    module: module.id.to_string(),
                    prerequisite: required.to_string(),
                }
                .into());
            }
        }
        track.total_modules = modules.len() as u32;
        track.updated_at = chrono::Utc::now();

        self.bounded("save_track", self.storage.save_track(&track))
            .await?;
        for module in &modules {
            self.bounded("save_module", self.storage.save_module(module))
                .await?;
        }
        info!(track = %track.id, title = %track.title, modules = modules.len(), "track imported");
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;
    use chrono::Duration;
    use trackflow_core::ModuleId;
    use trackflow_storage::Storage;

    async fn import(env: &TestEnv, title: &str, level: Level, category: &str, age_days: i64, n: u32) -> (Track, Vec<Module>) {
        let mut track = Track::new(title, level).with_category(category);
        track.created_at = chrono::Utc::now() - Duration::days(age_days);
        let modules: Vec<_> = (0..n)
            .map(|i| Module::new(track.id, format!("{} {}", title, i), i))
            .collect();
        let track = env.engine.import_track(track, modules.clone()).await.unwrap();
        (track, modules)
    }

    #[tokio::test]
    async fn test_newest_first_and_unpublished_hidden() {
        let env = TestEnv::new().await;
        import(&env, "Old", Level::Beginner, "growth", 10, 1).await;
        import(&env, "New", Level::Advanced, "ads", 1, 1).await;
        let draft = Track::new("Draft", Level::Beginner).published(false);
        env.engine.import_track(draft, Vec::new()).await.unwrap();

        let titles: Vec<_> = env
            .engine
            .list_tracks(&TrackFilter::default(), None)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.track.title)
            .collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[tokio::test]
    async fn test_content_filters() {
        let env = TestEnv::new().await;
        import(&env, "Growth 101", Level::Beginner, "Growth", 3, 1).await;
        import(&env, "Paid Ads", Level::Advanced, "Ads", 2, 1).await;
        import(&env, "Copywriting", Level::Intermediate, "Content", 1, 1).await;

        let search = TrackFilter { search: Some("GROW".into()), ..Default::default() };
        let found = env.engine.list_tracks(&search, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].track.title, "Growth 101");

        let levels = TrackFilter {
            levels: vec![Level::Advanced, Level::Intermediate],
            limit: Some(1),
            ..Default::default()
        };
        let found = env.engine.list_tracks(&levels, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].track.title, "Copywriting");

        let categories = TrackFilter { categories: vec!["ads".into()], ..Default::default() };
        let found = env.engine.list_tracks(&categories, None).await.unwrap();
        assert_eq!(found[0].track.title, "Paid Ads");
    }

    #[tokio::test]
    async fn test_status_filter_for_caller() {
        let env = TestEnv::new().await;
        let (started, modules) = import(&env, "Started", Level::Beginner, "a", 2, 2).await;
        import(&env, "Untouched", Level::Beginner, "a", 1, 2).await;
        let learner = Identity::free("u-1");
        env.engine
            .complete_module(&learner, started.id, modules[0].id)
            .await
            .unwrap();
        env.engine.toggle_favorite(&learner, started.id).await.unwrap();

        let filter = TrackFilter { statuses: vec![TrackStatus::InProgress], ..Default::default() };
        let found = env.engine.list_tracks(&filter, Some(&learner)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].progress_percentage, 50);
        assert!(found[0].is_favorite);

        // anonymous callers see nothing in progress
        assert!(env.engine.list_tracks(&filter, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_sets_module_count_and_rejects_duplicates() {
        let env = TestEnv::new().await;
        let (track, _) = import(&env, "Three", Level::Beginner, "a", 0, 3).await;
        assert_eq!(track.total_modules, 3);

        let other = Track::new("Dup", Level::Beginner);
        let modules = vec![Module::new(other.id, "a", 0), Module::new(other.id, "b", 0)];
        let err = env.engine.import_track(other, modules).await.unwrap_err();
        assert!(matches!(err, TrackError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_import_rejects_prerequisites_that_are_not_earlier() {
        let env = TestEnv::new().await;

        // first module waiting on the second would lock the whole track
        let track = Track::new("Loop", Level::Beginner);
        let m1 = Module::new(track.id, "M1", 1);
        let m0 = Module::new(track.id, "M0", 0).with_prerequisite(m1.id);
        let err = env
            .engine
            .import_track(track.clone(), vec![m0, m1])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrackError::Validation(ValidationError::PrerequisiteNotEarlier { .. })
        ));
        assert!(env.storage.load_track(track.id).await.unwrap().is_none());

        // a module outside the track
        let track = Track::new("Foreign", Level::Beginner);
        let modules = vec![
            Module::new(track.id, "M0", 0),
            Module::new(track.id, "M1", 1).with_prerequisite(ModuleId::new()),
        ];
        assert!(env.engine.import_track(track, modules).await.is_err());

        // skipping back further than one step is fine
        let track = Track::new("Branching", Level::Beginner);
        let m0 = Module::new(track.id, "M0", 0);
        let m1 = Module::new(track.id, "M1", 1);
        let m2 = Module::new(track.id, "M2", 2).with_prerequisite(m0.id);
        let (m0_id, m2_id) = (m0.id, m2.id);
        let track = env.engine.import_track(track, vec![m0, m1, m2]).await.unwrap();

        let learner = Identity::free("u-1");
        let access = env
            .engine
            .check_module_access(&learner, track.id, m0_id)
            .await
            .unwrap();
        assert!(access.allowed);
        env.engine.complete_module(&learner, track.id, m0_id).await.unwrap();
        assert!(env
            .engine
            .check_module_access(&learner, track.id, m2_id)
            .await
            .unwrap()
            .allowed);
    }
}
