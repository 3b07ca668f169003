//! # report
//!
//! JSON payload for map/PDF renderers. Field names are stable: renderers
//! read `record`, `trajectory` and `reference_path` directly.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use mission_types::{Coordinate, MlStatus, VerdictRecord};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::deviation::DeviationReport;

/// `mission_{id}.json`. Ids that need escaping also get a short hash of the
/// raw id, so `m/7` and `m_7` land in different files.
pub fn report_file_name(mission_id: &str) -> String {
    let safe: String = mission_id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if safe == mission_id {
        return format!("mission_{safe}.json");
    }
    let digest = hex::encode(Sha256::digest(mission_id.as_bytes()));
    format!("mission_{safe}_{}.json", &digest[..8])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackPoint {
    pub timestamp: NaiveDateTime,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissionReport {
    pub evaluation_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub record: VerdictRecord,
    pub ml_status: MlStatus,
    pub deviation: DeviationReport,
    /// Timestamp order
    pub trajectory: Vec<TrackPoint>,
    /// `[lat, lon]` pairs; absent when no reference was available
    pub reference_path: Option<Vec<[f64; 2]>>,
    pub start: Coordinate,
    pub end: Coordinate,
}

impl MissionReport {
    pub fn file_name(&self) -> String {
        report_file_name(&self.record.mission_id)
    }

    /// Write `mission_{id}.json` under `dir`, creating it if needed.
    pub async fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).await?;
        info!("Report for {} written to {}", self.record.mission_id, path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ids_keep_their_name() {
        assert_eq!(report_file_name("M42"), "mission_M42.json");
        assert_eq!(report_file_name("ride-7_b"), "mission_ride-7_b.json");
    }

    #[test]
    fn escaped_ids_do_not_collide() {
        let slash = report_file_name("m/7");
        assert_ne!(slash, report_file_name("m_7"));
        assert_ne!(slash, report_file_name("m.7"));
        assert!(slash.starts_with("mission_m_7_") && slash.ends_with(".json"), "{slash}");
        assert!(!report_file_name("../etc").contains('/'));
    }
}
