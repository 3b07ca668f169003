//! End-to-end evaluation through the public pipeline API, with in-process
//! route providers and classifiers standing in for the external services.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use mission_types::{AnomalyFinding, Coordinate, FeatureVector, Fix, MlStatus, ReferencePath, VerdictStatus};

use mission_verifier::classifier::{Classifier, ClassifierError, UnavailableClassifier};
use mission_verifier::deviation::DeviationStatus;
use mission_verifier::fix_store::FixStore;
use mission_verifier::geometry::METERS_PER_DEGREE;
use mission_verifier::ledger::{ResultLedger, HEADER};
use mission_verifier::report::report_file_name;
use mission_verifier::route::{FileRouteProvider, RouteError, RouteLookup, RouteProvider};
use mission_verifier::{Pipeline, Stage, VerifierConfig, VerifyError};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const LAT0: f64 = 48.8566;
const LON0: f64 = 2.3522;

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(8, 0, 0).unwrap()
}

fn lon_offset_deg(meters: f64) -> f64 {
    meters / (METERS_PER_DEGREE * LAT0.to_radians().cos())
}

/// 50 fixes heading north over 5 km in 20 minutes, alternating 20 m either
/// side of the centre line like a real GPS track.
fn straight_mission(mission_id: &str) -> Vec<Fix> {
    let step_deg = 5_000.0 / METERS_PER_DEGREE / 49.0;
    (0..50i64)
        .map(|i| {
            let side = if i % 2 == 0 { 20.0 } else { -20.0 };
            Fix::new(
                mission_id,
                t0() + Duration::milliseconds(i * 1_200_000 / 49),
                LAT0 + i as f64 * step_deg,
                LON0 + lon_offset_deg(side),
            )
        })
        .collect()
}

fn centre_line() -> ReferencePath {
    ReferencePath::new(vec![
        Coordinate::new(LAT0, LON0),
        Coordinate::new(LAT0 + 5_000.0 / METERS_PER_DEGREE, LON0),
    ])
}

/// 3 fixes, 100 m, 2 minutes: every rule trips
fn fabricated_mission(mission_id: &str) -> Vec<Fix> {
    (0..3i64)
        .map(|i| Fix::new(mission_id, t0() + Duration::minutes(i), LAT0 + i as f64 * 0.00045, LON0))
        .collect()
}

struct FixedRoute(ReferencePath);

#[async_trait]
impl RouteProvider for FixedRoute {
    fn name(&self) -> &str { "fixed" }

    async fn get_reference(&self, _start: Coordinate, _end: Coordinate) -> Result<ReferencePath, RouteError> {
        Ok(self.0.clone())
    }
}

struct DownRoute;

#[async_trait]
impl RouteProvider for DownRoute {
    fn name(&self) -> &str { "down" }

    async fn get_reference(&self, _start: Coordinate, _end: Coordinate) -> Result<ReferencePath, RouteError> {
        Err(RouteError::Status { status: 503, body: "service unavailable".into() })
    }
}

struct SlowRoute;

#[async_trait]
impl RouteProvider for SlowRoute {
    fn name(&self) -> &str { "slow" }

    async fn get_reference(&self, _start: Coordinate, _end: Coordinate) -> Result<ReferencePath, RouteError> {
        tokio::time::sleep(StdDuration::from_secs(30)).await;
        Ok(centre_line())
    }
}

/// Always returns the same label and counts calls
struct FixedLabel {
    label: u8,
    calls: AtomicUsize,
}

impl FixedLabel {
    fn new(label: u8) -> Arc<Self> {
        Arc::new(Self { label, calls: AtomicUsize::new(0) })
    }
}

impl Classifier for FixedLabel {
    fn name(&self) -> &str { "fixed" }

    fn score(&self, _features: &FeatureVector) -> Result<u8, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.label)
    }
}

fn pipeline_with(
    dir: &Path,
    route: Arc<dyn RouteProvider>,
    classifier: Arc<dyn Classifier>,
) -> Pipeline {
    let mut config = VerifierConfig::default();
    config.route.timeout_ms = 200;
    config.storage.results_path = dir.join("validation_results.csv");
    let ledger = ResultLedger::new(config.storage.results_path.clone());
    Pipeline::new(config, route, classifier, ledger)
}

fn all_stages() -> Vec<Stage> {
    vec![
        Stage::Loaded,
        Stage::MetricsComputed,
        Stage::DeviationChecked,
        Stage::RulesApplied,
        Stage::ClassifierScored,
        Stage::Aggregated,
        Stage::Persisted,
    ]
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn straight_mission_on_its_reference_is_valid() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), Arc::new(FixedRoute(centre_line())), FixedLabel::new(0));

    let eval = pipeline.evaluate(straight_mission("m-straight")).await.unwrap();

    assert_eq!(eval.stages, all_stages());
    assert_eq!(eval.deviation.status, DeviationStatus::Checked);
    assert_eq!(eval.record.offroad_points, 0);
    assert_eq!(eval.record.anomalies_display(), "None");
    assert_eq!(eval.record.status, VerdictStatus::Valid);
    assert_eq!(eval.record.num_points, 50);
    assert!(eval.features.distance_km >= 5.0 && eval.features.distance_km < 6.0, "{:?}", eval.features);
    assert!((eval.features.duration_min - 20.0).abs() < 1e-9);
    assert!(eval.persist_error.is_none());

    let raw = std::fs::read_to_string(dir.path().join("validation_results.csv")).unwrap();
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines[0], HEADER.join(","));
    assert!(lines[1].starts_with("m-straight,"));
    assert!(lines[1].ends_with(",0,0,None,Valid"), "{}", lines[1]);
}

#[tokio::test]
async fn unavailable_route_provider_skips_deviation_only() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), Arc::new(DownRoute), FixedLabel::new(0));

    let eval = pipeline.evaluate(straight_mission("m1")).await.unwrap();

    assert!(eval.reached(Stage::Aggregated));
    assert!(matches!(eval.reference, RouteLookup::Unavailable { .. }));
    assert!(matches!(eval.deviation.status, DeviationStatus::Skipped { .. }));
    assert_eq!(eval.record.offroad_points, 0);
    assert_eq!(eval.record.status, VerdictStatus::Valid);
}

#[tokio::test]
async fn slow_route_provider_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), Arc::new(SlowRoute), FixedLabel::new(0));

    let started = std::time::Instant::now();
    let eval = pipeline.evaluate(straight_mission("m1")).await.unwrap();

    assert!(started.elapsed() < StdDuration::from_secs(5));
    match &eval.deviation.status {
        DeviationStatus::Skipped { reason } => assert!(reason.contains("timed out"), "{reason}"),
        other => panic!("expected skipped, got {other:?}"),
    }
    assert_eq!(eval.stages, all_stages());
}

#[tokio::test]
async fn off_road_fixes_flag_the_mission() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), Arc::new(FixedRoute(centre_line())), FixedLabel::new(0));

    let mut fixes = straight_mission("m-detour");
    for fix in &mut fixes[10..14] {
        fix.longitude = LON0 + lon_offset_deg(150.0);
    }
    let eval = pipeline.evaluate(fixes).await.unwrap();

    assert_eq!(eval.record.offroad_points, 4);
    assert_eq!(eval.deviation.offroad_indices, vec![10, 11, 12, 13]);
    assert_eq!(eval.record.anomalies, vec![AnomalyFinding::OffRoadMovement]);
    assert_eq!(eval.record.status, VerdictStatus::AnomaliesDetected);
    assert!(eval.findings.is_empty());
}

#[tokio::test]
async fn unavailable_classifier_still_applies_rules() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = Arc::new(UnavailableClassifier::new("model artifact missing"));
    let pipeline = pipeline_with(dir.path(), Arc::new(DownRoute), classifier);

    let clean = pipeline.evaluate(straight_mission("m-clean")).await.unwrap();
    assert!(matches!(clean.ml.status, MlStatus::Unavailable { .. }));
    assert_eq!(clean.ml.label, 0);
    assert_eq!(clean.record.ml_pred, None);
    assert_eq!(clean.record.status, VerdictStatus::Valid);

    let fake = pipeline.evaluate(fabricated_mission("m-fake")).await.unwrap();
    assert!(matches!(fake.ml.status, MlStatus::Unavailable { .. }));
    assert_eq!(fake.record.status, VerdictStatus::AnomaliesDetected);
    assert_eq!(fake.record.anomalies, vec![
        AnomalyFinding::DistanceTooShort,
        AnomalyFinding::DurationTooShort,
        AnomalyFinding::AreaTooSmall,
    ]);

    let latest = pipeline.ledger().latest_by_mission().await.unwrap();
    assert_eq!(latest["m-clean"].ml_pred_display(), "unavailable");
}

#[tokio::test]
async fn classifier_label_alone_flags_the_mission() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = FixedLabel::new(1);
    let pipeline = pipeline_with(dir.path(), Arc::new(FixedRoute(centre_line())), classifier.clone());

    let eval = pipeline.evaluate(straight_mission("m1")).await.unwrap();

    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(eval.ml.status, MlStatus::Ok);
    assert_eq!(eval.record.ml_pred, Some(1));
    assert!(eval.record.anomalies.is_empty());
    assert_eq!(eval.record.status, VerdictStatus::AnomaliesDetected);
}

#[tokio::test]
async fn re_evaluation_is_deterministic_and_appends() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), Arc::new(FixedRoute(centre_line())), FixedLabel::new(0));

    let first = pipeline.evaluate(straight_mission("m1")).await.unwrap();
    let second = pipeline.evaluate(straight_mission("m1")).await.unwrap();

    assert_eq!(
        first.features.as_array().map(f64::to_bits),
        second.features.as_array().map(f64::to_bits),
    );
    assert_eq!(first.record, second.record);
    assert_ne!(first.evaluation_id, second.evaluation_id);

    let ledger = pipeline.ledger();
    assert_eq!(ledger.read_all().await.unwrap().len(), 2);
    assert_eq!(ledger.latest_by_mission().await.unwrap().len(), 1);
}

#[tokio::test]
async fn ledger_failure_still_returns_the_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = VerifierConfig::default();
    config.storage.results_path = dir.path().to_path_buf();
    let ledger = ResultLedger::new(dir.path());
    let pipeline = Pipeline::new(config, Arc::new(FixedRoute(centre_line())), FixedLabel::new(0), ledger);

    let eval = pipeline.evaluate(straight_mission("m1")).await.unwrap();

    assert!(eval.persist_error.is_some());
    assert!(!eval.is_persisted());
    assert_eq!(eval.stages.last(), Some(&Stage::Aggregated));
    assert_eq!(eval.record.status, VerdictStatus::Valid);
}

#[tokio::test]
async fn empty_input_is_fatal_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), Arc::new(FixedRoute(centre_line())), FixedLabel::new(0));

    let err = pipeline.evaluate(Vec::new()).await.unwrap_err();
    assert!(matches!(err, VerifyError::NoFixes { .. }));
    assert!(!dir.path().join("validation_results.csv").exists());
}

#[tokio::test]
async fn malformed_fix_is_fatal_and_classifier_never_runs() {
    let dir = tempfile::tempdir().unwrap();
    let classifier = FixedLabel::new(0);
    let pipeline = pipeline_with(dir.path(), Arc::new(FixedRoute(centre_line())), classifier.clone());

    let mut fixes = straight_mission("m1");
    fixes[7].latitude = f64::NAN;
    let err = pipeline.evaluate(fixes).await.unwrap_err();

    assert!(matches!(err, VerifyError::InvalidFix { index: 7, .. }));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("validation_results.csv").exists());
}

#[tokio::test]
async fn concurrent_evaluations_share_one_log() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), Arc::new(FixedRoute(centre_line())), FixedLabel::new(0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.evaluate(straight_mission(&format!("m{i}"))).await })
        })
        .collect();
    for h in handles {
        assert!(h.await.unwrap().unwrap().is_persisted());
    }

    let raw = std::fs::read_to_string(dir.path().join("validation_results.csv")).unwrap();
    assert_eq!(raw.lines().count(), 9);
    assert_eq!(pipeline.ledger().latest_by_mission().await.unwrap().len(), 8);
}

#[tokio::test]
async fn csv_fixes_and_planned_route_files_drive_a_full_run() {
    let dir = tempfile::tempdir().unwrap();

    // Ingestion file, shuffled rows, two missions
    let mut csv = String::from("mission_id,timestamp,latitude,longitude\n");
    let mut fixes = straight_mission("m-north");
    fixes.reverse();
    for f in fixes.iter().chain(fabricated_mission("m-other").iter()) {
        csv.push_str(&format!("{},{},{},{}\n", f.mission_id, f.timestamp.format("%Y-%m-%d %H:%M:%S%.f"), f.latitude, f.longitude));
    }
    let fixes_path = dir.path().join("gps_data.csv");
    std::fs::write(&fixes_path, csv).unwrap();

    let routes = dir.path().join("references");
    std::fs::create_dir(&routes).unwrap();
    std::fs::write(routes.join("m-north.geojson"), centre_line().to_geojson().to_string()).unwrap();

    let mut config = VerifierConfig::default();
    config.storage.results_path = dir.path().join("results.csv");
    let ledger = ResultLedger::new(config.storage.results_path.clone());
    let provider = Arc::new(FileRouteProvider::new(&routes, 250.0));
    let pipeline = Pipeline::new(config, provider, FixedLabel::new(0), ledger);

    let store = FixStore::new(&fixes_path);
    assert_eq!(store.mission_ids().await.unwrap(), vec!["m-north", "m-other"]);

    let eval = pipeline.evaluate(store.load_mission(Some("m-north")).await.unwrap()).await.unwrap();
    assert!(matches!(eval.reference, RouteLookup::Available { .. }));
    assert_eq!(eval.record.status, VerdictStatus::Valid);
    assert_eq!(eval.trajectory.first().timestamp, t0());

    // No mission named: last row's mission, which has no planned route
    let eval = pipeline.evaluate(store.load_mission(None).await.unwrap()).await.unwrap();
    assert_eq!(eval.record.mission_id, "m-other");
    assert!(matches!(eval.deviation.status, DeviationStatus::Skipped { .. }));
    assert_eq!(eval.record.status, VerdictStatus::AnomaliesDetected);
}

#[tokio::test]
async fn report_payload_has_stable_shape() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_with(dir.path(), Arc::new(FixedRoute(centre_line())), FixedLabel::new(0));
    let eval = pipeline.evaluate(straight_mission("m/7")).await.unwrap();

    let report = eval.report();
    let value = serde_json::to_value(&report).unwrap();
    for key in ["evaluation_id", "evaluated_at", "record", "ml_status", "deviation", "trajectory", "reference_path", "start", "end"] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["record"]["status"], "Valid");
    assert_eq!(value["ml_status"]["state"], "ok");
    assert_eq!(value["deviation"]["status"]["state"], "checked");
    assert_eq!(value["trajectory"].as_array().unwrap().len(), 50);
    assert_eq!(value["reference_path"][0][0], LAT0);

    let path = report.write_to(&dir.path().join("reports")).await.unwrap();
    assert_eq!(path.file_name().unwrap().to_str().unwrap(), report_file_name("m/7"));
    assert_ne!(report_file_name("m/7"), report_file_name("m_7"));
    let back: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(back["record"]["mission_id"], "m/7");
}
