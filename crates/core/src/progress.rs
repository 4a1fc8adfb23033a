//! Learner progression state and its derived views.

use serde::{Deserialize, Serialize};

use crate::id::{ModuleId, TrackId, UserId};
use crate::Time;

/// Stored per-(user, track) progress row.
///
/// Only facts that are written once live here. The percentage and the
/// current module are derived at read time, see [`ProgressView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTrackProgress {
    /// Learner
    pub user_id: UserId,

    /// Track being followed
    pub track_id: TrackId,

    /// First start
    pub started_at: Time,

    /// Set once, the first time every module was completed
    pub completed_at: Option<Time>,
}

impl UserTrackProgress {
    /// A freshly started track.
    pub fn started(user_id: UserId, track_id: TrackId) -> Self {
        Self {
            user_id,
            track_id,
            started_at: chrono::Utc::now(),
            completed_at: None,
        }
    }
}

/// Stored per-(user, track, module) completion row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserModuleProgress {
    /// Learner
    pub user_id: UserId,

    /// Owning track
    pub track_id: TrackId,

    /// Completed module
    pub module_id: ModuleId,

    /// Completion flag
    pub is_completed: bool,

    /// First completion; never overwritten
    pub completed_at: Option<Time>,

    /// Row creation
    pub created_at: Time,
}

impl UserModuleProgress {
    /// A completion happening now.
    pub fn completed_now(user_id: UserId, track_id: TrackId, module_id: ModuleId) -> Self {
        let now = chrono::Utc::now();
        Self {
            user_id,
            track_id,
            module_id,
            is_completed: true,
            completed_at: Some(now),
            created_at: now,
        }
    }
}

/// Favorite flag, kept apart from [`UserTrackProgress`] so favoriting never
/// implies having started a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFavorite {
    /// Learner
    pub user_id: UserId,

    /// Favorited track
    pub track_id: TrackId,

    /// Current flag
    pub is_favorite: bool,

    /// Last flip
    pub updated_at: Time,
}

/// Stored profile facts the engine needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Learner
    pub user_id: UserId,

    /// Premium entitlement
    pub is_premium: bool,
}

/// Progress as presented to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressView {
    /// Learner
    pub user_id: UserId,

    /// Track
    pub track_id: TrackId,

    /// First start
    pub started_at: Time,

    /// Set-once completion time
    pub completed_at: Option<Time>,

    /// round(100 * completed / total), derived
    pub progress_percentage: u8,

    /// First incomplete module in order, derived
    pub current_module_id: Option<ModuleId>,

    /// From the favorite flag
    pub is_favorite: bool,
}

impl ProgressView {
    /// Learner-facing status of the track.
    pub fn status(&self) -> TrackStatus {
        if self.completed_at.is_some() {
            TrackStatus::Completed
        } else if self.progress_percentage > 0 {
            TrackStatus::InProgress
        } else {
            TrackStatus::NotStarted
        }
    }
}

/// round(100 * completed / total), half rounding up, 0 for an empty track.
pub fn progress_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total);
    ((200 * completed + total) / (2 * total)) as u8
}

/// Coarse track status used by listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    /// No progress yet
    NotStarted,
    /// Some modules completed
    InProgress,
    /// Every module was completed at some point
    Completed,
}

impl TrackStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::NotStarted => "not_started",
            TrackStatus::InProgress => "in_progress",
            TrackStatus::Completed => "completed",
        }
    }
}

/// Per-module state for a learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Already completed
    Completed,
    /// First accessible, incomplete module
    Current,
    /// Accessible but not the next one in order
    Available,
    /// Access denied
    Locked,
}

/// Why access to a module was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Track is premium and the user is not
    PremiumRequired,
    /// Prerequisite module not completed
    PreviousIncomplete,
    /// Track or module absent or unpublished
    NotFound,
}

impl DenyReason {
    /// Wire code for the presentation layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::PremiumRequired => "premium_required",
            DenyReason::PreviousIncomplete => "previous_incomplete",
            DenyReason::NotFound => "not_found",
        }
    }
}

/// Outcome of an access check. Denials are data, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleAccess {
    /// Module asked about
    pub module_id: ModuleId,

    /// Whether the learner may open it
    pub allowed: bool,

    /// Set when denied
    pub reason: Option<DenyReason>,
}

impl ModuleAccess {
    /// Access granted.
    pub fn allow(module_id: ModuleId) -> Self {
        Self { module_id, allowed: true, reason: None }
    }

    /// Access denied for `reason`.
    pub fn deny(module_id: ModuleId, reason: DenyReason) -> Self {
        Self { module_id, allowed: false, reason: Some(reason) }
    }
}

/// Authenticated caller as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Trusted user id
    pub user_id: UserId,

    /// Premium entitlement
    pub is_premium: bool,
}

impl Identity {
    /// Free-tier identity.
    pub fn free(user_id: impl Into<UserId>) -> Self {
        Self { user_id: user_id.into(), is_premium: false }
    }

    /// Premium identity.
    pub fn premium(user_id: impl Into<UserId>) -> Self {
        Self { user_id: user_id.into(), is_premium: true }
    }
}
