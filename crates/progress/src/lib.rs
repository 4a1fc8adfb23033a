//! Track progression engine
//!
//! Progress ledger, module access control, start/resume, favorites,
//! reviews, and the catalog read models, over a pluggable
//! [`trackflow_storage::Storage`].

#![warn(missing_docs)]

pub mod access;
pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod favorite;
pub mod ledger;
pub mod review;
pub mod start;

#[cfg(test)]
pub(crate) mod testing;

pub use access::{derive_states, evaluate_access, ModuleStateEntry};
pub use aggregate::TrackWithModules;
pub use catalog::{TrackFilter, TrackSummary};
pub use config::EngineConfig;
pub use engine::TrackEngine;
pub use error::{Result, TrackError};
pub use ledger::TrackProgressSnapshot;
