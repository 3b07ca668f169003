//! Trajectory boundary: the only place fixes are validated.
//!
//! Once a `Trajectory` exists it holds ≥1 fix, all for one mission, all with
//! valid coordinates, sorted ascending by timestamp. Everything downstream
//! (metrics, deviation) relies on that and never re-checks it.

use mission_types::{Coordinate, Fix};

use crate::error::VerifyError;

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    mission_id: String,
    fixes: Vec<Fix>,
}

impl Trajectory {
    /// Validate and sort. Fatal for the mission on any bad fix.
    pub fn new(mut fixes: Vec<Fix>) -> Result<Self, VerifyError> {
        let mission_id = match fixes.first() {
            Some(f) => f.mission_id.clone(),
            None => return Err(VerifyError::NoFixes { mission_id: String::new() }),
        };
        if mission_id.trim().is_empty() {
            return Err(VerifyError::InvalidFix { index: 0, reason: "empty mission_id".into() });
        }

        for (index, fix) in fixes.iter().enumerate() {
            if fix.mission_id != mission_id {
                return Err(VerifyError::MixedMission {
                    expected: mission_id,
                    found: fix.mission_id.clone(),
                });
            }
            if !fix.latitude.is_finite() || !fix.longitude.is_finite() {
                return Err(VerifyError::InvalidFix {
                    index,
                    reason: format!("non-finite coordinate ({}, {})", fix.latitude, fix.longitude),
                });
            }
            if !fix.coordinate().is_valid() {
                return Err(VerifyError::InvalidFix {
                    index,
                    reason: format!("coordinate out of range ({}, {})", fix.latitude, fix.longitude),
                });
            }
        }

        // stable: fixes sharing a timestamp keep their arrival order
        fixes.sort_by_key(|f| f.timestamp);

        Ok(Self { mission_id, fixes })
    }

    pub fn mission_id(&self) -> &str { &self.mission_id }
    pub fn fixes(&self) -> &[Fix] { &self.fixes }
    pub fn len(&self) -> usize { self.fixes.len() }

    /// Always false for a constructed trajectory
    pub fn is_empty(&self) -> bool { self.fixes.is_empty() }

    pub fn first(&self) -> &Fix { &self.fixes[0] }
    pub fn last(&self) -> &Fix { &self.fixes[self.fixes.len() - 1] }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.fixes.iter().map(Fix::coordinate).collect()
    }
}
