//! # mission-verifier
//!
//! Decides whether a recorded GPS mission is plausible. A mission's fixes are
//! turned into a `FeatureVector`, checked against a reference route, run
//! through fixed-threshold rules and a learned classifier, and reduced to one
//! `VerdictRecord` appended to the result log.
//!
//! `pipeline::Pipeline` is the entry point; the other modules are its stages.

pub mod classifier;
pub mod config;
pub mod deviation;
pub mod error;
pub mod fix_store;
pub mod geometry;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod route;
pub mod rules;
pub mod table;
pub mod trajectory;
pub mod verdict;

pub use config::VerifierConfig;
pub use error::VerifyError;
pub use pipeline::{Evaluation, Pipeline, Stage};
