//! Trajectory → FeatureVector. Pure; the same trajectory always gives the
//! same vector bit for bit.

use mission_types::FeatureVector;

use crate::geometry::{haversine, polygon_area};
use crate::trajectory::Trajectory;

pub fn extract(trajectory: &Trajectory) -> FeatureVector {
    let fixes = trajectory.fixes();

    let distance_m: f64 = fixes.windows(2)
        .map(|w| haversine(w[0].latitude, w[0].longitude, w[1].latitude, w[1].longitude))
        .sum();
    let distance_km = distance_m / 1000.0;

    let duration_min = if fixes.len() >= 2 {
        let span = trajectory.last().timestamp - trajectory.first().timestamp;
        // microseconds overflow only past ~290k years
        span.num_microseconds()
            .map(|us| us as f64 / 60_000_000.0)
            .unwrap_or_else(|| span.num_seconds() as f64 / 60.0)
    } else {
        0.0
    };

    let area_km2 = polygon_area(&trajectory.coordinates());

    // guards the division only; not a claim about the recorded speed
    let avg_speed_kmh = if duration_min > 0.0 {
        distance_km / (duration_min / 60.0)
    } else {
        0.0
    };

    FeatureVector {
        distance_km,
        duration_min,
        avg_speed_kmh,
        area_km2,
        num_points: fixes.len(),
    }
}
