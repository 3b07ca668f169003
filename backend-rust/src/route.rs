//! # route
//!
//! Route Reference Providers: given a mission's first and last fix, return
//! the path the mission was expected to follow.
//!
//! Providers are external and may block (network, disk). `lookup_reference`
//! makes exactly one attempt under a hard timeout; any failure becomes
//! `RouteLookup::Unavailable` and the deviation check is skipped. No retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mission_types::{Coordinate, GeoJsonError, ReferencePath};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{RouteConfig, RouteProviderKind};
use crate::geometry::haversine_coords;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route provider not configured: {0}")]
    NotConfigured(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("bad route geometry: {0}")]
    Geometry(#[from] GeoJsonError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no reference route matches the mission endpoints")]
    NoMatch,
    #[error("route lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of a single reference lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RouteLookup {
    Available { path: ReferencePath },
    Unavailable { reason: String },
}

impl RouteLookup {
    pub fn path(&self) -> Option<&ReferencePath> {
        match self {
            Self::Available { path } => Some(path),
            Self::Unavailable { .. } => None,
        }
    }
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn get_reference(&self, start: Coordinate, end: Coordinate) -> Result<ReferencePath, RouteError>;
}

/// One bounded attempt. Never fails; degrades to `Unavailable`.
pub async fn lookup_reference(
    provider: &dyn RouteProvider,
    start: Coordinate,
    end: Coordinate,
    timeout: Duration,
) -> RouteLookup {
    let result = match tokio::time::timeout(timeout, provider.get_reference(start, end)).await {
        Ok(r) => r,
        Err(_) => Err(RouteError::Timeout(timeout)),
    };

    match result {
        Ok(path) if path.is_empty() => {
            warn!("Route: {} returned an empty path", provider.name());
            RouteLookup::Unavailable { reason: "reference path has no points".into() }
        }
        Ok(path) => {
            debug!("Route: {} returned {} points", provider.name(), path.len());
            RouteLookup::Available { path }
        }
        Err(e) => {
            warn!("Route: {} unavailable: {e}", provider.name());
            RouteLookup::Unavailable { reason: e.to_string() }
        }
    }
}

// ── openrouteservice directions ───────────────────────────────────────────────

pub struct OpenRouteServiceProvider {
    client: reqwest::Client,
    base_url: String,
    profile: String,
    api_key: String,
}

impl OpenRouteServiceProvider {
    pub fn new(cfg: &RouteConfig) -> Result<Self, RouteError> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            profile: cfg.profile.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    fn directions_url(&self) -> String {
        format!("{}/v2/directions/{}/geojson", self.base_url, self.profile)
    }
}

#[async_trait]
impl RouteProvider for OpenRouteServiceProvider {
    fn name(&self) -> &str { "openrouteservice" }

    async fn get_reference(&self, start: Coordinate, end: Coordinate) -> Result<ReferencePath, RouteError> {
        if self.api_key.trim().is_empty() {
            return Err(RouteError::NotConfigured("ORS_API_KEY is not set".into()));
        }

        let body = serde_json::json!({
            "coordinates": [[start.lon, start.lat], [end.lon, end.lat]],
        });
        let res = self.client
            .post(self.directions_url())
            .header("Authorization", &self.api_key)
            .header("Accept", "application/json, application/geo+json")
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(RouteError::Status { status: status.as_u16(), body });
        }

        let value: serde_json::Value = res.json().await?;
        Ok(ReferencePath::from_geojson(&value)?)
    }
}

// ── Planned routes on disk ────────────────────────────────────────────────────

/// Serves planned routes written next to the fixes (e.g. by `mission-sim`).
/// A route matches when both its endpoints are within `tolerance_m` of the
/// requested start/end; the closest match wins.
pub struct FileRouteProvider {
    dir: PathBuf,
    tolerance_m: f64,
}

impl FileRouteProvider {
    pub fn new(dir: impl Into<PathBuf>, tolerance_m: f64) -> Self {
        Self { dir: dir.into(), tolerance_m }
    }

    async fn load_routes(dir: &Path) -> Result<Vec<(PathBuf, ReferencePath)>, RouteError> {
        let mut routes = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("geojson") {
                continue;
            }
            let raw = tokio::fs::read_to_string(&path).await?;
            let parsed = serde_json::from_str::<serde_json::Value>(&raw)
                .map_err(RouteError::from)
                .and_then(|v| ReferencePath::from_geojson(&v).map_err(RouteError::from));
            match parsed {
                Ok(route) => routes.push((path, route)),
                Err(e) => warn!("Route: skipping {}: {e}", path.display()),
            }
        }
        Ok(routes)
    }
}

#[async_trait]
impl RouteProvider for FileRouteProvider {
    fn name(&self) -> &str { "file" }

    async fn get_reference(&self, start: Coordinate, end: Coordinate) -> Result<ReferencePath, RouteError> {
        let routes = Self::load_routes(&self.dir).await?;

        let best = routes.into_iter()
            .filter_map(|(file, route)| {
                let (rs, re) = (route.start()?, route.end()?);
                let ds = haversine_coords(start, rs);
                let de = haversine_coords(end, re);
                (ds <= self.tolerance_m && de <= self.tolerance_m).then_some((ds + de, file, route))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));

        match best {
            Some((_, file, route)) => {
                debug!("Route: matched planned route {}", file.display());
                Ok(route)
            }
            None => Err(RouteError::NoMatch),
        }
    }
}

// ── Disabled ──────────────────────────────────────────────────────────────────

pub struct NoRouteProvider;

#[async_trait]
impl RouteProvider for NoRouteProvider {
    fn name(&self) -> &str { "none" }

    async fn get_reference(&self, _start: Coordinate, _end: Coordinate) -> Result<ReferencePath, RouteError> {
        Err(RouteError::NotConfigured("route checks disabled".into()))
    }
}

/// Build the configured provider. Construction failure degrades to `NoRouteProvider`.
pub fn build_provider(cfg: &RouteConfig) -> Arc<dyn RouteProvider> {
    match cfg.provider {
        RouteProviderKind::OpenRouteService => match OpenRouteServiceProvider::new(cfg) {
            Ok(p) => Arc::new(p),
            Err(e) => {
                warn!("Route: could not build openrouteservice client: {e} (route checks disabled)");
                Arc::new(NoRouteProvider)
            }
        },
        RouteProviderKind::File => Arc::new(FileRouteProvider::new(&cfg.reference_dir, cfg.match_tolerance_m)),
        RouteProviderKind::None => Arc::new(NoRouteProvider),
    }
}
