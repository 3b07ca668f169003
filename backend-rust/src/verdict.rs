//! Verdict aggregation: features + findings + classifier label → one record.

use mission_types::{AnomalyFinding, FeatureVector, VerdictRecord, VerdictStatus};

use crate::classifier::MlOutcome;
use crate::deviation::DeviationReport;

/// Rule findings first, then the off-road finding if the check produced one.
pub fn collect_findings(rule_findings: Vec<AnomalyFinding>, deviation: &DeviationReport) -> Vec<AnomalyFinding> {
    let mut findings = rule_findings;
    if let Some(f) = deviation.finding() {
        if !findings.contains(&f) {
            findings.push(f);
        }
    }
    findings
}

/// Anomalous when the classifier says 1 or any finding is present.
pub fn decide(findings: &[AnomalyFinding], ml: &MlOutcome) -> VerdictStatus {
    if ml.label == 1 || !findings.is_empty() {
        VerdictStatus::AnomaliesDetected
    } else {
        VerdictStatus::Valid
    }
}

pub fn aggregate(
    mission_id: &str,
    features: &FeatureVector,
    deviation: &DeviationReport,
    findings: Vec<AnomalyFinding>,
    ml: &MlOutcome,
) -> VerdictRecord {
    let status = decide(&findings, ml);
    VerdictRecord {
        mission_id: mission_id.to_string(),
        distance_km: features.distance_km,
        duration_min: features.duration_min,
        area_km2: features.area_km2,
        avg_speed_kmh: features.avg_speed_kmh,
        num_points: features.num_points,
        offroad_points: deviation.offroad_points,
        ml_pred: ml.status.is_ok().then_some(ml.label),
        anomalies: findings,
        status,
    }
}
