//! Validation failures for caller-supplied data.

/// Why a value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Rating outside 1..=5
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(i64),

    /// Review comment too long
    #[error("comment is {len} characters, the limit is {max}")]
    CommentTooLong {
        /// Characters supplied
        len: usize,
        /// Characters allowed
        max: usize,
    },

    /// Required text field left blank
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// Malformed URL in a payload
    #[error("{field} is not an http(s) URL: {url}")]
    InvalidUrl {
        /// Offending field
        field: &'static str,
        /// Supplied value
        url: String,
    },

    /// Unrecognized difficulty level
    #[error("unknown level: {0}")]
    UnknownLevel(String),

    /// Module listed as its own prerequisite
    #[error("module {0} cannot be its own prerequisite")]
    SelfPrerequisite(String),

    /// Prerequisite that is not an earlier module of the same track
    #[error("module {module} requires {prerequisite}, which is not an earlier module of the track")]
    PrerequisiteNotEarlier {
        /// Module naming the prerequisite
        module: String,
        /// The prerequisite it names
        prerequisite: String,
    },
}
