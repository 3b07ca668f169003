//! route_sim.rs: Movement along a planned route
//!
//! Positions are advanced along a polyline by great-circle distance. Small
//! offsets (GPS error, detours) are applied in a local East-North frame in
//! meters and converted back to degrees at the current latitude.

use mission_types::{wrap_lon_delta, Coordinate, METERS_PER_DEGREE};
use rand::Rng;
use rand_distr::{Distribution, Normal};

pub use mission_types::haversine_m;

/// Shift `c` by `east_m`/`north_m` meters
pub fn offset(c: Coordinate, east_m: f64, north_m: f64) -> Coordinate {
    let lat = c.lat + north_m / METERS_PER_DEGREE;
    let lon = c.lon + east_m / (METERS_PER_DEGREE * c.lat.to_radians().cos());
    // back into [-180, 180) when the shift crossed the antimeridian
    Coordinate::new(lat, wrap_lon_delta(lon))
}

/// Unit (east, north) direction from `a` to `b`; zero for coincident points
fn direction(a: Coordinate, b: Coordinate) -> (f64, f64) {
    let east = wrap_lon_delta(b.lon - a.lon) * METERS_PER_DEGREE * a.lat.to_radians().cos();
    let north = (b.lat - a.lat) * METERS_PER_DEGREE;
    let len = east.hypot(north);
    if len > 0.0 { (east / len, north / len) } else { (0.0, 0.0) }
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// Planned polyline with cumulative leg lengths
#[derive(Debug, Clone)]
pub struct RouteSim {
    points: Vec<Coordinate>,
    /// cumulative[i] = distance from points[0] to points[i], meters
    cumulative: Vec<f64>,
}

/// Position on the route plus the local heading there
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutePosition {
    pub coord: Coordinate,
    /// Unit (east, north) heading of the current leg
    pub heading: (f64, f64),
}

impl RouteSim {
    pub fn new(points: Vec<Coordinate>) -> Self {
        let mut cumulative = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (i, p) in points.iter().enumerate() {
            if i > 0 {
                total += haversine_m(points[i - 1], *p);
            }
            cumulative.push(total);
        }
        Self { points, cumulative }
    }

    pub fn points(&self) -> &[Coordinate] { &self.points }

    pub fn length_m(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Position `distance_m` along the route, clamped to its ends
    pub fn position_at(&self, distance_m: f64) -> Option<RoutePosition> {
        let first = *self.points.first()?;
        if self.points.len() == 1 {
            return Some(RoutePosition { coord: first, heading: (0.0, 0.0) });
        }
        let d = distance_m.clamp(0.0, self.length_m());

        // leg i runs from points[i] to points[i + 1]
        let leg = self.cumulative.windows(2)
            .position(|w| d <= w[1])
            .unwrap_or(self.points.len() - 2);
        let (a, b) = (self.points[leg], self.points[leg + 1]);
        let leg_len = self.cumulative[leg + 1] - self.cumulative[leg];
        let t = if leg_len > 0.0 { (d - self.cumulative[leg]) / leg_len } else { 0.0 };

        Some(RoutePosition {
            coord: Coordinate::new(
                a.lat + (b.lat - a.lat) * t,
                wrap_lon_delta(a.lon + wrap_lon_delta(b.lon - a.lon) * t),
            ),
            heading: direction(a, b),
        })
    }

    /// Positions every `step_m` from start to end, end included
    pub fn walk(&self, step_m: f64) -> Vec<RoutePosition> {
        let length = self.length_m();
        if step_m <= 0.0 || length == 0.0 {
            return self.position_at(0.0).into_iter().collect();
        }
        let steps = (length / step_m).ceil() as usize;
        (0..=steps)
            .filter_map(|i| self.position_at(i as f64 * step_m))
            .collect()
    }
}

// ── GPS noise ─────────────────────────────────────────────────────────────────

/// Horizontal Gaussian error, `sigma_m` per axis
pub struct GpsNoise {
    dist: Option<Normal<f64>>,
}

impl GpsNoise {
    pub fn new(sigma_m: f64) -> Self {
        // Normal::new rejects negative or non-finite sigma
        let dist = (sigma_m > 0.0).then(|| Normal::new(0.0, sigma_m).ok()).flatten();
        Self { dist }
    }

    pub fn apply<R: Rng>(&self, c: Coordinate, rng: &mut R) -> Coordinate {
        match &self.dist {
            Some(d) => offset(c, d.sample(rng), d.sample(rng)),
            None => c,
        }
    }
}
