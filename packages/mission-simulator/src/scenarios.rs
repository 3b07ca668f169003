//! scenarios.rs: Mission definitions and the fix patterns they produce
//!
//! Each scenario reproduces one kind of mission the verifier has to judge:
//! an honest ride, a ride that leaves the planned road, a fabricated
//! start/end-only upload, and a device that never moved.

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDateTime};
use mission_types::{Coordinate, Fix, ReferencePath};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::route_sim::{offset, GpsNoise, RouteSim};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    /// Points along the planned route with GPS noise
    #[default]
    OnRoute,
    /// A middle stretch displaced sideways off the route
    OffRoad,
    /// Only start and end recorded, seconds apart
    Teleport,
    /// Every point jittered around the start
    Stationary,
}

fn default_interval_s() -> u32 { 10 }
fn default_speed_kmh() -> f64 { 15.0 }
fn default_noise_m() -> f64 { 4.0 }
fn default_offroad_fraction() -> f64 { 0.3 }
fn default_offset_m() -> f64 { 100.0 }

/// One `[[missions]]` entry. Positions are `[lat, lon]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionSpec {
    pub id: String,
    pub start: [f64; 2],
    pub end: [f64; 2],
    #[serde(default)]
    pub waypoints: Vec<[f64; 2]>,
    #[serde(default = "default_interval_s")]
    pub interval_s: u32,
    #[serde(default = "default_speed_kmh")]
    pub speed_kmh: f64,
    #[serde(default = "default_noise_m")]
    pub noise_m: f64,
    #[serde(default)]
    pub scenario: ScenarioType,
    /// Share of points displaced (`off_road`)
    #[serde(default = "default_offroad_fraction")]
    pub offroad_fraction: f64,
    /// Sideways displacement in meters (`off_road`)
    #[serde(default = "default_offset_m")]
    pub offset_m: f64,
    /// Recording length for `stationary`; defaults to the planned ride time
    #[serde(default)]
    pub duration_min: Option<f64>,
}

impl MissionSpec {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() || self.id.contains([',', '"', '\n']) {
            bail!("mission id {:?} must be non-empty and free of commas, quotes and newlines", self.id);
        }
        if self.interval_s == 0 {
            bail!("mission {}: interval_s must be > 0", self.id);
        }
        if !(self.speed_kmh > 0.0) {
            bail!("mission {}: speed_kmh must be > 0", self.id);
        }
        if !(0.0..=1.0).contains(&self.offroad_fraction) {
            bail!("mission {}: offroad_fraction must be within [0, 1]", self.id);
        }
        if let Some(c) = self.planned_points().iter().find(|c| !c.is_valid()) {
            bail!("mission {}: invalid position [{}, {}]", self.id, c.lat, c.lon);
        }
        Ok(())
    }

    /// start, waypoints..., end
    pub fn planned_points(&self) -> Vec<Coordinate> {
        std::iter::once(self.start)
            .chain(self.waypoints.iter().copied())
            .chain(std::iter::once(self.end))
            .map(|[lat, lon]| Coordinate::new(lat, lon))
            .collect()
    }

    pub fn planned_route(&self) -> ReferencePath {
        ReferencePath::new(self.planned_points())
    }

    fn step_m(&self) -> f64 {
        self.speed_kmh / 3.6 * f64::from(self.interval_s)
    }
}

// ── Generation ────────────────────────────────────────────────────────────────

pub fn generate<R: Rng>(mission: &MissionSpec, start_time: NaiveDateTime, rng: &mut R) -> Vec<Fix> {
    let route = RouteSim::new(mission.planned_points());
    let noise = GpsNoise::new(mission.noise_m);
    let interval = Duration::seconds(i64::from(mission.interval_s));
    let fix = |i: usize, c: Coordinate| {
        Fix::new(mission.id.clone(), start_time + interval * i as i32, c.lat, c.lon)
    };

    match mission.scenario {
        ScenarioType::OnRoute => route.walk(mission.step_m())
            .into_iter()
            .enumerate()
            .map(|(i, p)| fix(i, noise.apply(p.coord, rng)))
            .collect(),

        ScenarioType::OffRoad => {
            let positions = route.walk(mission.step_m());
            let n = positions.len();
            let displaced = (n as f64 * mission.offroad_fraction).round() as usize;
            let first = (n - displaced.min(n)) / 2;
            let detour = first..first + displaced;

            positions.into_iter()
                .enumerate()
                .map(|(i, p)| {
                    let mut c = p.coord;
                    if detour.contains(&i) {
                        // left of the direction of travel
                        let (east, north) = p.heading;
                        c = offset(c, -north * mission.offset_m, east * mission.offset_m);
                    }
                    fix(i, noise.apply(c, rng))
                })
                .collect()
        }

        ScenarioType::Teleport => {
            let start = route.points().first().copied().unwrap_or_default();
            let end = route.points().last().copied().unwrap_or_default();
            vec![
                Fix::new(mission.id.clone(), start_time, start.lat, start.lon),
                Fix::new(mission.id.clone(), start_time + Duration::seconds(5), end.lat, end.lon),
            ]
        }

        ScenarioType::Stationary => {
            let anchor = route.points().first().copied().unwrap_or_default();
            let duration_s = match mission.duration_min {
                Some(min) if min > 0.0 => min * 60.0,
                _ => route.length_m() / (mission.speed_kmh / 3.6),
            };
            let count = (duration_s / f64::from(mission.interval_s)).ceil().max(1.0) as usize + 1;
            // a parked receiver still wanders by a few meters
            let jitter = GpsNoise::new(mission.noise_m.max(1.0));
            (0..count).map(|i| fix(i, jitter.apply(anchor, rng))).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route_sim::haversine_m;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mission(scenario: ScenarioType) -> MissionSpec {
        toml::from_str::<MissionSpec>(&format!(
            "id = \"M1\"\nstart = [48.8566, 2.3522]\nend = [48.8656, 2.3522]\nnoise_m = 0.0\nscenario = \"{}\"",
            serde_json::to_value(scenario).unwrap().as_str().unwrap(),
        )).unwrap()
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(8, 0, 0).unwrap()
    }

    #[test]
    fn defaults_follow_the_recording_app() {
        let s = mission(ScenarioType::OnRoute);
        assert_eq!(s.interval_s, 10);
        assert_eq!(s.speed_kmh, 15.0);
        assert!(s.waypoints.is_empty());
        s.validate().unwrap();
    }

    #[test]
    fn on_route_fixes_are_evenly_spaced_in_time() {
        let s = mission(ScenarioType::OnRoute);
        let fixes = generate(&s, t0(), &mut StdRng::seed_from_u64(1));
        // ~1 km at 15 km/h, one fix every 10 s
        assert!((24..=26).contains(&fixes.len()), "{}", fixes.len());
        assert!(fixes.windows(2).all(|w| w[1].timestamp - w[0].timestamp == Duration::seconds(10)));
        assert!(fixes.iter().all(|f| f.mission_id == "M1"));
    }

    #[test]
    fn off_road_displaces_the_middle_stretch() {
        let mut s = mission(ScenarioType::OffRoad);
        s.offset_m = 120.0;
        let fixes = generate(&s, t0(), &mut StdRng::seed_from_u64(2));
        let far = fixes.iter()
            .filter(|f| (f.longitude - 2.3522).abs() * 111_320.0 * 48.86f64.to_radians().cos() > 100.0)
            .count();
        let expected = (fixes.len() as f64 * 0.3).round() as usize;
        assert_eq!(far, expected);
        assert!((fixes[0].longitude - 2.3522).abs() < 1e-9);
    }

    #[test]
    fn teleport_records_only_endpoints() {
        let fixes = generate(&mission(ScenarioType::Teleport), t0(), &mut StdRng::seed_from_u64(3));
        assert_eq!(fixes.len(), 2);
        assert_eq!(fixes[1].timestamp - fixes[0].timestamp, Duration::seconds(5));
        assert!(haversine_m(fixes[0].coordinate(), fixes[1].coordinate()) > 900.0);
    }

    #[test]
    fn stationary_stays_near_start() {
        let mut s = mission(ScenarioType::Stationary);
        s.duration_min = Some(30.0);
        let fixes = generate(&s, t0(), &mut StdRng::seed_from_u64(4));
        assert_eq!(fixes.len(), 181);
        let start = Coordinate::new(48.8566, 2.3522);
        assert!(fixes.iter().all(|f| haversine_m(start, f.coordinate()) < 20.0));
    }

    #[test]
    fn bad_specs_are_rejected() {
        let mut s = mission(ScenarioType::OnRoute);
        s.id = "a,b".into();
        assert!(s.validate().is_err());

        let mut s = mission(ScenarioType::OnRoute);
        s.end = [95.0, 2.0];
        assert!(s.validate().is_err());
    }
}
