//! # classifier
//!
//! Learned classifier adapter. The trained model is an offline artifact; this
//! module only loads and scores it.
//!
//! ## Artifact format
//! JSON export of a tree ensemble (random forest):
//! ```json
//! { "version": "rf-2025-06",
//!   "features": ["distance_km","duration_min","avg_speed_kmh","area_km2","num_points"],
//!   "trees": [ { "nodes": [ {"feature":0,"threshold":1.0,"left":1,"right":2},
//!                           {"value":1.0}, {"value":0.0} ] } ] }
//! ```
//! Splits go left when `x[feature] <= threshold`. Leaf `value` is the anomaly
//! probability; the ensemble mean above 0.5 is label 1.
//!
//! A classifier that cannot load or score never aborts an evaluation: the
//! outcome is label 0 with `MlStatus::Unavailable`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mission_types::{FeatureVector, MlStatus, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ClassifierConfig;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("could not read model artifact {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
    #[error("could not decode model artifact: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("artifact checksum mismatch: expected {expected}, got {actual}")]
    Checksum { expected: String, actual: String },
    #[error("artifact feature order {0:?} does not match the feature vector")]
    FeatureMismatch(Vec<String>),
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("scoring timed out after {0:?}")]
    Timeout(Duration),
    #[error("scoring task failed: {0}")]
    Task(String),
}

/// Feature vector → label (0 = valid, 1 = anomalous)
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn score(&self, features: &FeatureVector) -> Result<u8, ClassifierError>;
}

// ── Tree ensemble ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split { feature: usize, threshold: f64, left: usize, right: usize },
    Leaf { value: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Children must come after their parent, so the walk always terminates.
    fn validate(&self, tree_idx: usize) -> Result<(), ClassifierError> {
        if self.nodes.is_empty() {
            return Err(ClassifierError::InvalidModel(format!("tree {tree_idx} has no nodes")));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match *node {
                TreeNode::Split { feature, threshold, left, right } => {
                    if feature >= FEATURE_NAMES.len() {
                        return Err(ClassifierError::InvalidModel(format!("tree {tree_idx} node {i}: feature {feature} out of range")));
                    }
                    if !threshold.is_finite() {
                        return Err(ClassifierError::InvalidModel(format!("tree {tree_idx} node {i}: non-finite threshold")));
                    }
                    for child in [left, right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(ClassifierError::InvalidModel(format!("tree {tree_idx} node {i}: bad child {child}")));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !(0.0..=1.0).contains(&value) {
                        return Err(ClassifierError::InvalidModel(format!("tree {tree_idx} node {i}: leaf value {value} outside [0, 1]")));
                    }
                }
            }
        }
        Ok(())
    }

    fn predict(&self, x: &[f64; 5]) -> f64 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split { feature, threshold, left, right } => {
                    i = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForestArtifact {
    version: String,
    features: Vec<String>,
    trees: Vec<Tree>,
}

#[derive(Debug, Clone)]
pub struct ForestClassifier {
    version: String,
    trees: Vec<Tree>,
}

impl ForestClassifier {
    pub fn from_json(raw: &str) -> Result<Self, ClassifierError> {
        let artifact: ForestArtifact = serde_json::from_str(raw)?;

        if artifact.features.len() != FEATURE_NAMES.len()
            || artifact.features.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(ClassifierError::FeatureMismatch(artifact.features));
        }
        if artifact.trees.is_empty() {
            return Err(ClassifierError::InvalidModel("ensemble has no trees".into()));
        }
        for (idx, tree) in artifact.trees.iter().enumerate() {
            tree.validate(idx)?;
        }

        Ok(Self { version: artifact.version, trees: artifact.trees })
    }

    /// Read the artifact, verify its SHA-256 when one is configured, parse it.
    pub fn load(path: &Path, expected_sha256: Option<&str>) -> Result<Self, ClassifierError> {
        let bytes = std::fs::read(path)
            .map_err(|source| ClassifierError::Io { path: path.to_path_buf(), source })?;

        if let Some(expected) = expected_sha256.map(str::trim).filter(|s| !s.is_empty()) {
            let actual = hex::encode(Sha256::digest(&bytes));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(ClassifierError::Checksum { expected: expected.to_string(), actual });
            }
        }

        let raw = String::from_utf8_lossy(&bytes);
        Self::from_json(&raw)
    }

    pub fn version(&self) -> &str { &self.version }

    /// Mean anomaly probability over all trees
    pub fn predict_proba(&self, features: &FeatureVector) -> f64 {
        let x = features.as_array();
        self.trees.iter().map(|t| t.predict(&x)).sum::<f64>() / self.trees.len() as f64
    }
}

impl Classifier for ForestClassifier {
    fn name(&self) -> &str { &self.version }

    fn score(&self, features: &FeatureVector) -> Result<u8, ClassifierError> {
        let p = self.predict_proba(features);
        debug!("Classifier {}: p(anomaly)={p:.3}", self.version);
        Ok(u8::from(p > 0.5))
    }
}

// ── Placeholder for a missing model ───────────────────────────────────────────

pub struct UnavailableClassifier {
    reason: String,
}

impl UnavailableClassifier {
    pub fn new(reason: impl Into<String>) -> Self { Self { reason: reason.into() } }
}

impl Classifier for UnavailableClassifier {
    fn name(&self) -> &str { "unavailable" }

    fn score(&self, _features: &FeatureVector) -> Result<u8, ClassifierError> {
        Err(ClassifierError::Unavailable(self.reason.clone()))
    }
}

/// Load the configured artifact, or an `UnavailableClassifier` explaining why not.
pub fn load_classifier(cfg: &ClassifierConfig) -> Arc<dyn Classifier> {
    match ForestClassifier::load(&cfg.model_path, Some(&cfg.sha256)) {
        Ok(model) => {
            info!("Classifier: loaded {} ({} trees) from {}", model.version, model.trees.len(), cfg.model_path.display());
            Arc::new(model)
        }
        Err(e) => {
            warn!("Classifier: {e} (predictions will be reported as unavailable)");
            Arc::new(UnavailableClassifier::new(e.to_string()))
        }
    }
}

// ── Scoring ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlOutcome {
    /// 0 whenever `status` is unavailable
    pub label: u8,
    pub status: MlStatus,
}

impl MlOutcome {
    fn unavailable(reason: String) -> Self {
        Self { label: 0, status: MlStatus::Unavailable { reason } }
    }
}

/// One bounded scoring attempt on the blocking pool. Never fails.
pub async fn score_with_timeout(
    classifier: Arc<dyn Classifier>,
    features: FeatureVector,
    timeout: Duration,
) -> MlOutcome {
    let result = if let Some((name, v)) = FEATURE_NAMES.iter().zip(features.as_array()).find(|(_, v)| !v.is_finite()) {
        Err(ClassifierError::MalformedInput(format!("{name} = {v}")))
    } else {
        let task = tokio::task::spawn_blocking(move || classifier.score(&features));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(r)) => r,
            Ok(Err(join)) => Err(ClassifierError::Task(join.to_string())),
            Err(_) => Err(ClassifierError::Timeout(timeout)),
        }
    };

    match result {
        Ok(label @ (0 | 1)) => MlOutcome { label, status: MlStatus::Ok },
        Ok(other) => {
            warn!("Classifier returned label {other}, expected 0 or 1");
            MlOutcome::unavailable(format!("invalid label {other}"))
        }
        Err(e) => {
            warn!("Model prediction failed: {e}");
            MlOutcome::unavailable(e.to_string())
        }
    }
}
