//! trackflow core data models.
//!
//! This crate defines the tracks, modules, progression records and reviews
//! that the progression engine operates on.

#![warn(missing_docs)]

// Core identities
mod id;

// Authored content
mod track;

// Learner state
mod progress;
mod review;

mod validation;

// Re-exports
pub use id::*;

pub use track::{
    Level, Module, ModuleContent, ModulePrompt, ModuleResource, ModuleTool, Track,
};
pub use progress::{
    progress_percentage, DenyReason, Identity, ModuleAccess, ModuleState, ProgressView,
    TrackFavorite, TrackStatus, UserModuleProgress, UserProfile, UserTrackProgress,
};
pub use review::{
    normalize_comment, Rating, RatingStats, RatingSummary, TrackReview, MAX_COMMENT_CHARS,
};
pub use validation::ValidationError;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
