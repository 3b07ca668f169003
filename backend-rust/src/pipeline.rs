//! # pipeline
//!
//! One mission evaluation, stage by stage:
//!
//! ```text
//! Loaded → MetricsComputed → DeviationChecked → RulesApplied
//!        → ClassifierScored → Aggregated → Persisted
//! ```
//!
//! Only `Loaded` can fail the evaluation. The route lookup and the classifier
//! degrade to typed "unavailable" states. A ledger write failure stops the
//! trail at `Aggregated` and is returned alongside the verdict in
//! `Evaluation::persist_error`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mission_types::{AnomalyFinding, FeatureVector, Fix, VerdictRecord};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::classifier::{load_classifier, score_with_timeout, Classifier, MlOutcome};
use crate::config::VerifierConfig;
use crate::deviation::{self, DeviationReport};
use crate::error::VerifyError;
use crate::ledger::ResultLedger;
use crate::metrics;
use crate::report::{MissionReport, TrackPoint};
use crate::route::{build_provider, lookup_reference, RouteLookup, RouteProvider};
use crate::rules;
use crate::trajectory::Trajectory;
use crate::verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loaded,
    MetricsComputed,
    DeviationChecked,
    RulesApplied,
    ClassifierScored,
    Aggregated,
    Persisted,
}

/// Everything one evaluation produced. Stage outputs are never modified after
/// the stage that produced them.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub evaluation_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    /// Stages reached, in order
    pub stages: Vec<Stage>,
    pub trajectory: Trajectory,
    pub features: FeatureVector,
    pub reference: RouteLookup,
    pub deviation: DeviationReport,
    /// Rule evaluator output only; the full list is `record.anomalies`
    pub findings: Vec<AnomalyFinding>,
    pub ml: MlOutcome,
    pub record: VerdictRecord,
    pub persist_error: Option<String>,
}

impl Evaluation {
    pub fn reached(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn is_persisted(&self) -> bool {
        self.reached(Stage::Persisted)
    }

    pub fn report(&self) -> MissionReport {
        MissionReport {
            evaluation_id: self.evaluation_id,
            evaluated_at: self.evaluated_at,
            record: self.record.clone(),
            ml_status: self.ml.status.clone(),
            deviation: self.deviation.clone(),
            trajectory: self.trajectory.fixes().iter()
                .map(|f| TrackPoint { timestamp: f.timestamp, lat: f.latitude, lon: f.longitude })
                .collect(),
            reference_path: self.reference.path()
                .map(|p| p.points.iter().map(|c| [c.lat, c.lon]).collect()),
            start: self.trajectory.first().coordinate(),
            end: self.trajectory.last().coordinate(),
        }
    }
}

/// Shared evaluation context. Cheap to clone; concurrent evaluations share
/// nothing mutable except the ledger's write lock.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<VerifierConfig>,
    route_provider: Arc<dyn RouteProvider>,
    classifier: Arc<dyn Classifier>,
    ledger: ResultLedger,
}

impl Pipeline {
    pub fn new(
        config: VerifierConfig,
        route_provider: Arc<dyn RouteProvider>,
        classifier: Arc<dyn Classifier>,
        ledger: ResultLedger,
    ) -> Self {
        Self { config: Arc::new(config), route_provider, classifier, ledger }
    }

    /// Configured route provider, classifier artifact and result log.
    pub fn from_config(config: &VerifierConfig) -> Self {
        let route_provider = build_provider(&config.route);
        let classifier = load_classifier(&config.classifier);
        let ledger = ResultLedger::new(config.storage.results_path.clone());
        info!(
            "Pipeline ready (route: {}, classifier: {}, results: {})",
            route_provider.name(),
            classifier.name(),
            ledger.path().display(),
        );
        Self::new(config.clone(), route_provider, classifier, ledger)
    }

    pub fn config(&self) -> &VerifierConfig { &self.config }
    pub fn ledger(&self) -> &ResultLedger { &self.ledger }

    pub async fn evaluate(&self, fixes: Vec<Fix>) -> Result<Evaluation, VerifyError> {
        let evaluation_id = Uuid::new_v4();
        let mission_id = fixes.first().map(|f| f.mission_id.clone()).unwrap_or_default();
        let span = info_span!("evaluate", %mission_id, %evaluation_id);
        self.run(evaluation_id, fixes).instrument(span).await
    }

    async fn run(&self, evaluation_id: Uuid, fixes: Vec<Fix>) -> Result<Evaluation, VerifyError> {
        let thresholds = &self.config.thresholds;
        let mut stages = Vec::with_capacity(7);
        let mut advance = |stage: Stage| {
            debug!(?stage, "stage reached");
            stages.push(stage);
        };

        // ── Loaded ──
        let trajectory = Trajectory::new(fixes)?;
        advance(Stage::Loaded);

        // ── MetricsComputed ──
        let features = metrics::extract(&trajectory);
        advance(Stage::MetricsComputed);

        // ── DeviationChecked ──
        let reference = lookup_reference(
            self.route_provider.as_ref(),
            trajectory.first().coordinate(),
            trajectory.last().coordinate(),
            self.config.route.timeout(),
        ).await;
        let deviation = deviation::check(&trajectory, &reference, f64::from(thresholds.offroad_threshold_meters));
        advance(Stage::DeviationChecked);

        // ── RulesApplied ──
        let findings = rules::evaluate(&features, thresholds);
        advance(Stage::RulesApplied);

        // ── ClassifierScored ──
        let ml = score_with_timeout(self.classifier.clone(), features, self.config.classifier.timeout()).await;
        advance(Stage::ClassifierScored);

        // ── Aggregated ──
        let all_findings = verdict::collect_findings(findings.clone(), &deviation);
        let record = verdict::aggregate(trajectory.mission_id(), &features, &deviation, all_findings, &ml);
        advance(Stage::Aggregated);

        info!(
            mission_id = %record.mission_id,
            status = %record.status,
            anomalies = %record.anomalies_display(),
            ml_pred = %record.ml_pred_display(),
            offroad_points = record.offroad_points,
            "Verdict"
        );

        // ── Persisted ──
        let persist_error = match self.ledger.append(&record).await {
            Ok(()) => {
                advance(Stage::Persisted);
                None
            }
            Err(e) => {
                warn!("Verdict for {} not persisted: {e}", record.mission_id);
                Some(e.to_string())
            }
        };

        Ok(Evaluation {
            evaluation_id,
            evaluated_at: Utc::now(),
            stages,
            trajectory,
            features,
            reference,
            deviation,
            findings,
            ml,
            record,
            persist_error,
        })
    }
}
