//! Track reviews and rating aggregates.

use serde::{Deserialize, Serialize};

use crate::id::{ReviewId, TrackId, UserId};
use crate::validation::ValidationError;
use crate::Time;

/// Longest accepted review comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// A star rating, guaranteed to be within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// Validate a raw rating.
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (1..=5).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::RatingOutOfRange(value))
        }
    }

    /// Numeric value.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> Self {
        r.0
    }
}

/// Normalize a review comment: trim, drop when empty, enforce `max` characters.
pub fn normalize_comment(
    comment: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(text) = comment.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    let len = text.chars().count();
    if len > max {
        return Err(ValidationError::CommentTooLong { len, max });
    }
    Ok(Some(text.to_string()))
}

/// One user's review of a track. At most one per (user, track).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackReview {
    /// Unique identifier, stable across resubmissions
    pub id: ReviewId,

    /// Reviewer
    pub user_id: UserId,

    /// Reviewed track
    pub track_id: TrackId,

    /// Star rating
    pub rating: Rating,

    /// Optional free text
    pub comment: Option<String>,

    /// First submission
    pub created_at: Time,

    /// Last resubmission
    pub updated_at: Time,
}

/// Running rating totals for a track.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingStats {
    /// Sum of all ratings
    pub sum: u64,

    /// Number of reviews
    pub count: u64,
}

impl RatingStats {
    /// Account for a new or replaced review.
    pub fn apply_upsert(&mut self, previous: Option<Rating>, rating: Rating) {
        match previous {
            // totals that lost track of an existing review count it again
            Some(_) if self.count == 0 => self.count = 1,
            Some(prev) => self.sum = self.sum.saturating_sub(u64::from(prev.value())),
            None => self.count += 1,
        }
        self.sum += u64::from(rating.value());
    }

    /// Account for a removed review.
    pub fn apply_delete(&mut self, removed: Rating) {
        self.sum = self.sum.saturating_sub(u64::from(removed.value()));
        self.count = self.count.saturating_sub(1);
    }

    /// Aggregate view for readers.
    pub fn summary(&self) -> RatingSummary {
        RatingSummary {
            average_rating: (self.count > 0).then(|| self.sum as f64 / self.count as f64),
            total_reviews: self.count,
        }
    }
}

/// Aggregate rating exposed to readers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// Mean rating, absent when nobody reviewed
    pub average_rating: Option<f64>,

    /// Number of reviews
    pub total_reviews: u64,
}
