//! # config
//!
//! Verifier configuration: a TOML file (every field optional) with
//! environment overrides applied on top. Thresholds are plain data handed to
//! the pipeline at construction; nothing reads globals at evaluation time.
//!
//! ## Environment overrides
//! - `ORS_API_KEY`
//! - `VERIFIER_OFFROAD_THRESHOLD_M`, `VERIFIER_DISTANCE_THRESHOLD_KM`,
//!   `VERIFIER_DURATION_THRESHOLD_MIN`, `VERIFIER_AREA_THRESHOLD_KM2`
//! - `VERIFIER_ROUTE_PROVIDER`, `VERIFIER_MODEL_PATH`
//! - `VERIFIER_FIXES_PATH`, `VERIFIER_RESULTS_PATH`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::VerifyError;

// ── Rule thresholds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Fix farther than this from the reference path is off-road
    pub offroad_threshold_meters: u32,
    pub distance_threshold_km: f64,
    pub duration_threshold_min: f64,
    pub area_threshold_km2: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            offroad_threshold_meters: 30,
            distance_threshold_km: 1.0,
            duration_threshold_min: 5.0,
            area_threshold_km2: 0.01,
        }
    }
}

impl Thresholds {
    /// NaN compares false against everything and would switch a rule off.
    pub fn validate(&self) -> Result<(), VerifyError> {
        for (name, value) in [
            ("distance_threshold_km", self.distance_threshold_km),
            ("duration_threshold_min", self.duration_threshold_min),
            ("area_threshold_km2", self.area_threshold_km2),
        ] {
            if !is_usable_threshold(value) {
                return Err(VerifyError::Config(format!(
                    "thresholds.{name} must be finite and >= 0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn is_usable_threshold(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

// ── Route provider ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteProviderKind {
    OpenRouteService,
    File,
    None,
}

impl RouteProviderKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openrouteservice" | "ors" => Some(Self::OpenRouteService),
            "file" => Some(Self::File),
            "none" | "off" => Some(Self::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub provider: RouteProviderKind,
    pub base_url: String,
    /// Directions profile, e.g. `cycling-regular`
    pub profile: String,
    pub api_key: String,
    /// Directory of `*.geojson` planned routes (file provider)
    pub reference_dir: PathBuf,
    /// File provider: max endpoint distance for a route to match (meters)
    pub match_tolerance_m: f64,
    pub timeout_ms: u64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            provider: RouteProviderKind::OpenRouteService,
            base_url: "https://api.openrouteservice.org".to_string(),
            profile: "cycling-regular".to_string(),
            api_key: String::new(),
            reference_dir: PathBuf::from("data/references"),
            match_tolerance_m: 250.0,
            timeout_ms: 5_000,
        }
    }
}

impl RouteConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

// ── Classifier ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    /// Expected SHA-256 (hex) of the artifact; empty = not checked
    pub sha256: String,
    pub timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/anomaly_model.json"),
            sha256: String::new(),
            timeout_ms: 2_000,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }
}

// ── Storage ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Ingestion CSV: mission_id,timestamp,latitude,longitude
    pub fixes_path: PathBuf,
    /// Append-only verdict log
    pub results_path: PathBuf,
    pub reports_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            fixes_path: PathBuf::from("data/gps_data.csv"),
            results_path: PathBuf::from("data/validation_results.csv"),
            reports_dir: PathBuf::from("reports"),
        }
    }
}

// ── Top level ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub thresholds: Thresholds,
    pub route: RouteConfig,
    pub classifier: ClassifierConfig,
    pub storage: StorageConfig,
}

impl VerifierConfig {
    /// Load from `path` (missing file = defaults), then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, VerifyError> {
        let mut cfg = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                let cfg = Self::from_toml(&raw)?;
                info!("Loaded verifier config from {}", p.display());
                cfg
            }
            Some(p) => {
                warn!("Config {} not found, using defaults", p.display());
                Self::default()
            }
            None => Self::default(),
        };
        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_toml(raw: &str) -> Result<Self, VerifyError> {
        let cfg: Self = toml::from_str(raw).map_err(|e| VerifyError::Config(e.to_string()))?;
        cfg.thresholds.validate()?;
        Ok(cfg)
    }

    /// `lookup` is `std::env::var` in production; injectable for tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring {key}={raw}: not a valid value");
                    None
                }
            }
        }

        fn threshold(key: &str, raw: Option<String>) -> Option<f64> {
            let v: f64 = parsed(key, raw)?;
            if is_usable_threshold(v) {
                Some(v)
            } else {
                warn!("Ignoring {key}={v}: must be finite and >= 0");
                None
            }
        }

        if let Some(key) = lookup("ORS_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.route.api_key = key;
        }
        if let Some(v) = parsed("VERIFIER_OFFROAD_THRESHOLD_M", lookup("VERIFIER_OFFROAD_THRESHOLD_M")) {
            self.thresholds.offroad_threshold_meters = v;
        }
        if let Some(v) = threshold("VERIFIER_DISTANCE_THRESHOLD_KM", lookup("VERIFIER_DISTANCE_THRESHOLD_KM")) {
            self.thresholds.distance_threshold_km = v;
        }
        if let Some(v) = threshold("VERIFIER_DURATION_THRESHOLD_MIN", lookup("VERIFIER_DURATION_THRESHOLD_MIN")) {
            self.thresholds.duration_threshold_min = v;
        }
        if let Some(v) = threshold("VERIFIER_AREA_THRESHOLD_KM2", lookup("VERIFIER_AREA_THRESHOLD_KM2")) {
            self.thresholds.area_threshold_km2 = v;
        }
        if let Some(raw) = lookup("VERIFIER_ROUTE_PROVIDER") {
            match RouteProviderKind::parse(&raw) {
                Some(kind) => self.route.provider = kind,
                None => warn!("Ignoring VERIFIER_ROUTE_PROVIDER={raw}: unknown provider"),
            }
        }
        if let Some(p) = lookup("VERIFIER_MODEL_PATH") {
            self.classifier.model_path = PathBuf::from(p);
        }
        if let Some(p) = lookup("VERIFIER_FIXES_PATH") {
            self.storage.fixes_path = PathBuf::from(p);
        }
        if let Some(p) = lookup("VERIFIER_RESULTS_PATH") {
            self.storage.results_path = PathBuf::from(p);
        }
        debug!(thresholds = ?self.thresholds, provider = ?self.route.provider, "Effective verifier config");
    }
}
