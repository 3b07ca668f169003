//! # mission-types
//!
//! Shared mission structures for the trajectory verification workspace.
//!
//! These types are used by:
//! - `backend-rust`: loading fixes, computing features, writing verdict rows
//! - `packages/mission-simulator`: producing synthetic fixes and planned routes
//! - report consumers: the `VerdictRecord` and `ReferencePath` shapes are stable
//!
//! ## Coordinate Conventions
//!
//! - **Coordinates**: WGS84 degrees, `lat` ∈ [-90, 90], `lon` ∈ [-180, 180]
//! - **GeoJSON**: positions are `[lon, lat]` pairs, as emitted by routing services
//! - **Timestamps**: naive UTC wall-clock, ordering is by timestamp only

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ── Coordinates ───────────────────────────────────────────────────────────────

/// WGS84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self { Self { lat, lon } }

    /// Finite and inside the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

// ── Geodesy ───────────────────────────────────────────────────────────────────

/// Mean Earth radius (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Haversine distance in meters. Symmetric, zero for coincident points.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlambda / 2.0).sin().powi(2);
    // rounding can push `h` a hair outside [0, 1]
    let h = h.clamp(0.0, 1.0);
    EARTH_RADIUS_M * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Longitude difference folded into [-180, 180), so points either side of
/// the antimeridian stay close. Values already in range come back untouched.
pub fn wrap_lon_delta(dlon: f64) -> f64 {
    if (-180.0..180.0).contains(&dlon) {
        dlon
    } else {
        (dlon + 180.0).rem_euclid(360.0) - 180.0
    }
}

// ── GPS Fix ───────────────────────────────────────────────────────────────────

/// One GPS sample as recorded by the ingestion endpoint. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub mission_id: String,
    pub timestamp: NaiveDateTime,
    pub latitude: f64,
    pub longitude: f64,
}

impl Fix {
    pub fn new(mission_id: impl Into<String>, timestamp: NaiveDateTime, latitude: f64, longitude: f64) -> Self {
        Self { mission_id: mission_id.into(), timestamp, latitude, longitude }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

// ── Feature Vector ────────────────────────────────────────────────────────────

/// Column order the classifier artifact is trained on.
pub const FEATURE_NAMES: [&str; 5] = [
    "distance_km",
    "duration_min",
    "avg_speed_kmh",
    "area_km2",
    "num_points",
];

/// Per-mission trajectory summary fed to the rules and the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Sum of consecutive great-circle legs
    pub distance_km: f64,
    /// Last fix minus first fix
    pub duration_min: f64,
    /// 0 when duration ≤ 0
    pub avg_speed_kmh: f64,
    /// Convex hull area, flat-earth projection
    pub area_km2: f64,
    pub num_points: usize,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.distance_km,
            self.duration_min,
            self.avg_speed_kmh,
            self.area_km2,
            self.num_points as f64,
        ]
    }
}

// ── Anomaly Findings ──────────────────────────────────────────────────────────

/// Tagged reason a mission was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnomalyFinding {
    DistanceTooShort,
    DurationTooShort,
    AreaTooSmall,
    OffRoadMovement,
    /// Tag emitted by a rule this build does not know about (read back from the log)
    Other(String),
}

impl AnomalyFinding {
    pub fn tag(&self) -> &str {
        match self {
            Self::DistanceTooShort => "distance-too-short",
            Self::DurationTooShort => "duration-too-short",
            Self::AreaTooSmall => "area-too-small",
            Self::OffRoadMovement => "off-road-movement",
            Self::Other(tag) => tag,
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "distance-too-short" => Self::DistanceTooShort,
            "duration-too-short" => Self::DurationTooShort,
            "area-too-small" => Self::AreaTooSmall,
            "off-road-movement" => Self::OffRoadMovement,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for AnomalyFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl From<String> for AnomalyFinding {
    fn from(s: String) -> Self { Self::from_tag(&s) }
}

impl From<AnomalyFinding> for String {
    fn from(a: AnomalyFinding) -> Self { a.tag().to_string() }
}

// ── Verdict ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictStatus {
    #[serde(rename = "Valid")]
    Valid,
    #[serde(rename = "Anomalies Detected")]
    AnomaliesDetected,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::AnomaliesDetected => "Anomalies Detected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Valid" => Some(Self::Valid),
            "Anomalies Detected" => Some(Self::AnomaliesDetected),
            _ => None,
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the classifier actually produced the label.
/// A defaulted 0 under `Unavailable` is not a valid prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MlStatus {
    Ok,
    Unavailable { reason: String },
}

impl MlStatus {
    pub fn is_ok(&self) -> bool { matches!(self, Self::Ok) }
}

/// One row of the result log. Never mutated after write; a re-evaluation
/// appends a new row for the same mission and the latest row wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub mission_id: String,
    pub distance_km: f64,
    pub duration_min: f64,
    pub area_km2: f64,
    pub avg_speed_kmh: f64,
    pub num_points: usize,
    pub offroad_points: usize,
    /// `None` = classifier unavailable
    pub ml_pred: Option<u8>,
    pub anomalies: Vec<AnomalyFinding>,
    pub status: VerdictStatus,
}

impl VerdictRecord {
    /// Label used for the verdict; an unavailable classifier counts as 0
    pub fn ml_label(&self) -> u8 { self.ml_pred.unwrap_or(0) }

    /// `"; "`-joined tags, literal `None` when empty
    pub fn anomalies_display(&self) -> String {
        if self.anomalies.is_empty() {
            "None".to_string()
        } else {
            self.anomalies.iter().map(|a| a.tag()).collect::<Vec<_>>().join("; ")
        }
    }

    pub fn ml_pred_display(&self) -> String {
        match self.ml_pred {
            Some(label) => label.to_string(),
            None => "unavailable".to_string(),
        }
    }
}

// ── Reference Path ────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum GeoJsonError {
    #[error("missing LineString coordinates at features[0].geometry.coordinates")]
    MissingCoordinates,
    #[error("position {0} is not a [lon, lat] pair")]
    BadPosition(usize),
    #[error("route has no positions")]
    Empty,
}

/// Expected route between a mission's first and last fix, as returned by a
/// routing service. Read-only input to the deviation check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferencePath {
    pub points: Vec<Coordinate>,
}

impl ReferencePath {
    pub fn new(points: Vec<Coordinate>) -> Self { Self { points } }

    pub fn start(&self) -> Option<Coordinate> { self.points.first().copied() }
    pub fn end(&self) -> Option<Coordinate> { self.points.last().copied() }
    pub fn len(&self) -> usize { self.points.len() }
    pub fn is_empty(&self) -> bool { self.points.is_empty() }

    /// Single-feature FeatureCollection, same shape a directions API returns
    pub fn to_geojson(&self) -> serde_json::Value {
        let coords: Vec<[f64; 2]> = self.points.iter().map(|c| [c.lon, c.lat]).collect();
        serde_json::json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "LineString", "coordinates": coords },
            }],
        })
    }

    /// Parse `features[0].geometry.coordinates` of a FeatureCollection
    pub fn from_geojson(value: &serde_json::Value) -> Result<Self, GeoJsonError> {
        let coords = value["features"][0]["geometry"]["coordinates"]
            .as_array()
            .ok_or(GeoJsonError::MissingCoordinates)?;

        let points = coords.iter().enumerate()
            .map(|(i, pos)| {
                let lon = pos.get(0).and_then(|v| v.as_f64());
                let lat = pos.get(1).and_then(|v| v.as_f64());
                match (lat, lon) {
                    (Some(lat), Some(lon)) => Ok(Coordinate::new(lat, lon)),
                    _ => Err(GeoJsonError::BadPosition(i)),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        if points.is_empty() {
            return Err(GeoJsonError::Empty);
        }
        Ok(Self { points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lon_delta_wraps_across_antimeridian() {
        assert!((wrap_lon_delta(-359.9998) - 0.0002).abs() < 1e-9);
        assert!((wrap_lon_delta(359.9998) + 0.0002).abs() < 1e-9);
        assert_eq!(wrap_lon_delta(10.0), 10.0);
        assert_eq!(wrap_lon_delta(180.0), -180.0);
    }

    #[test]
    fn haversine_across_antimeridian_is_short() {
        let d = haversine_m(Coordinate::new(-17.0, 179.9999), Coordinate::new(-17.0, -179.9999));
        assert!((20.0..23.0).contains(&d), "got {d}");
    }

    fn record(anomalies: Vec<AnomalyFinding>, ml_pred: Option<u8>) -> VerdictRecord {
        VerdictRecord {
            mission_id: "m1".into(),
            distance_km: 5.0,
            duration_min: 20.0,
            area_km2: 0.5,
            avg_speed_kmh: 15.0,
            num_points: 50,
            offroad_points: 0,
            ml_pred,
            anomalies,
            status: VerdictStatus::Valid,
        }
    }

    #[test]
    fn anomalies_display_uses_none_literal_when_empty() {
        assert_eq!(record(vec![], Some(0)).anomalies_display(), "None");
        let r = record(vec![AnomalyFinding::DistanceTooShort, AnomalyFinding::OffRoadMovement], Some(0));
        assert_eq!(r.anomalies_display(), "distance-too-short; off-road-movement");
    }

    #[test]
    fn unknown_tags_survive_as_other() {
        let f = AnomalyFinding::from_tag(" speed-too-high ");
        assert_eq!(f, AnomalyFinding::Other("speed-too-high".into()));
        assert_eq!(f.tag(), "speed-too-high");
    }

    #[test]
    fn unavailable_classifier_renders_and_counts_as_zero() {
        let r = record(vec![], None);
        assert_eq!(r.ml_pred_display(), "unavailable");
        assert_eq!(r.ml_label(), 0);
    }

    #[test]
    fn status_strings_match_log_vocabulary() {
        let json = serde_json::to_string(&VerdictStatus::AnomaliesDetected).unwrap();
        assert_eq!(json, "\"Anomalies Detected\"");
        assert_eq!(VerdictStatus::parse("Valid"), Some(VerdictStatus::Valid));
        assert_eq!(VerdictStatus::parse("bogus"), None);
    }

    #[test]
    fn geojson_positions_are_lon_lat() {
        let path = ReferencePath::new(vec![Coordinate::new(48.86, 2.33), Coordinate::new(48.87, 2.35)]);
        let value = path.to_geojson();
        assert_eq!(value["features"][0]["geometry"]["coordinates"][0][0], 2.33);
        let back = ReferencePath::from_geojson(&value).unwrap();
        assert_eq!(back.start(), Some(Coordinate::new(48.86, 2.33)));
    }

    #[test]
    fn geojson_without_coordinates_is_rejected() {
        let value = serde_json::json!({ "features": [] });
        assert!(matches!(ReferencePath::from_geojson(&value), Err(GeoJsonError::MissingCoordinates)));
        let empty = ReferencePath::default().to_geojson();
        assert!(matches!(ReferencePath::from_geojson(&empty), Err(GeoJsonError::Empty)));
    }

    #[test]
    fn coordinate_validation_rejects_nan_and_out_of_range() {
        assert!(Coordinate::new(48.8, 2.3).is_valid());
        assert!(!Coordinate::new(f64::NAN, 2.3).is_valid());
        assert!(!Coordinate::new(91.0, 2.3).is_valid());
        assert!(!Coordinate::new(10.0, -180.5).is_valid());
    }
}
