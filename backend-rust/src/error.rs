//! Fatal errors for a single mission evaluation.
//!
//! Anything in here aborts the mission and no verdict row is written.
//! Route, classifier and ledger failures have their own error types and are
//! downgraded by the pipeline instead of surfacing here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("no fixes found for mission {mission_id}")]
    NoFixes { mission_id: String },

    #[error("fix file has no '{0}' column")]
    MissingColumn(&'static str),

    #[error("fix #{index} is invalid: {reason}")]
    InvalidFix { index: usize, reason: String },

    #[error("trajectory mixes missions: expected {expected}, found {found}")]
    MixedMission { expected: String, found: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
