//! geometry.rs: Great-circle distance, hull area and point-to-route distance
//!
//! Pure functions, no state. Two planar approximations live here and they are
//! deliberately separate:
//!   - `polygon_area` scales both axes by `METERS_PER_DEGREE` (flat earth, no
//!     latitude correction). The area threshold was calibrated against this,
//!     and it is only meaningful for extents well under 100 km.
//!   - `LocalProjection` (deviation check) corrects longitude by cos(latitude)
//!     so the off-road tolerance is in real meters around each fix.

use mission_types::{haversine_m, wrap_lon_delta, Coordinate};

pub use mission_types::{EARTH_RADIUS_M, METERS_PER_DEGREE};

/// Relative tolerance for collinearity, scaled by the squared extent of the set
const COLLINEAR_EPSILON: f64 = 1e-9;

// ── Great-circle distance ─────────────────────────────────────────────────────

/// Haversine distance in meters. Symmetric, zero for coincident points.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_m(Coordinate::new(lat1, lon1), Coordinate::new(lat2, lon2))
}

pub fn haversine_coords(a: Coordinate, b: Coordinate) -> f64 {
    haversine_m(a, b)
}

// ── Convex hull area ──────────────────────────────────────────────────────────

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Flat projection relative to the first point, meters, `METERS_PER_DEGREE`
/// on both axes. x = east, y = north.
pub fn flat_project(points: &[Coordinate]) -> Vec<(f64, f64)> {
    let Some(origin) = points.first().copied() else {
        return Vec::new();
    };
    points.iter()
        .map(|c| (
            wrap_lon_delta(c.lon - origin.lon) * METERS_PER_DEGREE,
            (c.lat - origin.lat) * METERS_PER_DEGREE,
        ))
        .collect()
}

/// Cross products at or below this (m²) count as collinear
fn collinear_tolerance(pts: &[(f64, f64)]) -> f64 {
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for &(x, y) in pts {
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    let span = (max_x - min_x).max(max_y - min_y);
    span * span * COLLINEAR_EPSILON
}

/// Andrew's monotone chain on planar points. Counter-clockwise, no repeated
/// closing vertex, collinear points dropped.
pub fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    pts.dedup();

    if pts.len() < 3 {
        return pts;
    }
    let eps = collinear_tolerance(&pts);

    let mut lower: Vec<(f64, f64)> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= eps {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<(f64, f64)> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= eps {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Convex hull area in km².
///
/// Points go through `flat_project`, then the shoelace formula is applied to
/// the hull. Fewer than 3 distinct points, or a collinear set, gives 0.
pub fn polygon_area(points: &[Coordinate]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let projected = flat_project(points);
    let hull = convex_hull(&projected);
    if hull.len() < 3 {
        return 0.0;
    }

    let mut twice_area = 0.0;
    for i in 0..hull.len() {
        let (x1, y1) = hull[i];
        let (x2, y2) = hull[(i + 1) % hull.len()];
        twice_area += x1 * y2 - x2 * y1;
    }
    if twice_area.abs() <= collinear_tolerance(&hull) {
        return 0.0;
    }
    (twice_area / 2.0).abs() / 1e6
}

// ── Point-to-route distance ───────────────────────────────────────────────────

/// Equirectangular projection around an origin, meters.
/// x = east, y = north. Accurate to well under 1% within a few km of the origin.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    origin: Coordinate,
    m_per_deg_lat: f64,
    m_per_deg_lon: f64,
}

impl LocalProjection {
    pub fn at(origin: Coordinate) -> Self {
        Self {
            origin,
            m_per_deg_lat: METERS_PER_DEGREE,
            m_per_deg_lon: METERS_PER_DEGREE * origin.lat.to_radians().cos(),
        }
    }

    pub fn project(&self, c: Coordinate) -> (f64, f64) {
        (
            wrap_lon_delta(c.lon - self.origin.lon) * self.m_per_deg_lon,
            (c.lat - self.origin.lat) * self.m_per_deg_lat,
        )
    }
}

/// Distance from `p` to segment `a`–`b` in the plane
fn point_segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 0.0 {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// Minimum distance in meters from `point` to the polyline through `route`.
/// The projection is centred on the point itself. `None` for an empty route.
pub fn distance_to_polyline_m(point: Coordinate, route: &[Coordinate]) -> Option<f64> {
    let proj = LocalProjection::at(point);
    let p = proj.project(point);

    match route {
        [] => None,
        [only] => Some(point_segment_distance(p, proj.project(*only), proj.project(*only))),
        _ => route.windows(2)
            .map(|seg| point_segment_distance(p, proj.project(seg[0]), proj.project(seg[1])))
            .min_by(|a, b| a.total_cmp(b)),
    }
}
