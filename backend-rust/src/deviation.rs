//! Off-road check: how far each fix lies from the reference polyline.
//!
//! Distances are meters in a local projection centred on each fix
//! (`geometry::LocalProjection`), so the threshold is compared in meters
//! with no implicit unit conversion.

use mission_types::AnomalyFinding;
use serde::Serialize;

use crate::geometry::distance_to_polyline_m;
use crate::route::RouteLookup;
use crate::trajectory::Trajectory;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeviationStatus {
    Checked,
    /// No reference path; contributes nothing to the verdict
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviationReport {
    pub status: DeviationStatus,
    pub threshold_m: f64,
    pub offroad_points: usize,
    /// Indices into the sorted trajectory
    pub offroad_indices: Vec<usize>,
    pub max_deviation_m: Option<f64>,
}

impl DeviationReport {
    pub fn skipped(reason: impl Into<String>, threshold_m: f64) -> Self {
        Self {
            status: DeviationStatus::Skipped { reason: reason.into() },
            threshold_m,
            offroad_points: 0,
            offroad_indices: Vec::new(),
            max_deviation_m: None,
        }
    }

    pub fn finding(&self) -> Option<AnomalyFinding> {
        (self.offroad_points > 0).then_some(AnomalyFinding::OffRoadMovement)
    }
}

pub fn check(trajectory: &Trajectory, lookup: &RouteLookup, threshold_m: f64) -> DeviationReport {
    let path = match lookup {
        RouteLookup::Available { path } if !path.is_empty() => path,
        RouteLookup::Available { .. } => return DeviationReport::skipped("reference path has no points", threshold_m),
        RouteLookup::Unavailable { reason } => return DeviationReport::skipped(reason.clone(), threshold_m),
    };

    let mut offroad_indices = Vec::new();
    let mut max_deviation_m: Option<f64> = None;

    for (i, fix) in trajectory.fixes().iter().enumerate() {
        let Some(d) = distance_to_polyline_m(fix.coordinate(), &path.points) else { continue };
        max_deviation_m = Some(max_deviation_m.map_or(d, |m| m.max(d)));
        if d > threshold_m {
            offroad_indices.push(i);
        }
    }

    DeviationReport {
        status: DeviationStatus::Checked,
        threshold_m,
        offroad_points: offroad_indices.len(),
        offroad_indices,
        max_deviation_m,
    }
}
