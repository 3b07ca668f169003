//! Fixed-threshold rules over the feature vector.

use mission_types::{AnomalyFinding, FeatureVector};

use crate::config::Thresholds;

/// Findings in a fixed order: distance, duration, area.
pub fn evaluate(features: &FeatureVector, thresholds: &Thresholds) -> Vec<AnomalyFinding> {
    let checks = [
        (features.distance_km < thresholds.distance_threshold_km, AnomalyFinding::DistanceTooShort),
        (features.duration_min < thresholds.duration_threshold_min, AnomalyFinding::DurationTooShort),
        (features.area_km2 < thresholds.area_threshold_km2, AnomalyFinding::AreaTooSmall),
    ];
    checks.into_iter()
        .filter_map(|(tripped, finding)| tripped.then_some(finding))
        .collect()
}
