//! # fix_store
//!
//! Reads the ingestion CSV (`mission_id,timestamp,latitude,longitude`) and
//! hands back the fixes of one mission. Column order is free and extra
//! columns are ignored. Only rows of the selected mission are parsed past
//! their id, so a bad row elsewhere in the file does not block evaluation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};
use mission_types::Fix;
use tokio::fs;
use tracing::{debug, info};

use crate::error::VerifyError;
use crate::table::split_record;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Accepts space- or T-separated naive timestamps and RFC 3339 (normalised to UTC).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NAIVE_FORMATS.iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

// ── Parsed table ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RawRow {
    mission_id: String,
    timestamp: String,
    latitude: String,
    longitude: String,
}

/// The ingestion file split into rows, fields still unparsed.
#[derive(Debug, Clone, Default)]
pub struct FixTable {
    rows: Vec<RawRow>,
}

impl FixTable {
    pub fn parse(raw: &str) -> Result<Self, VerifyError> {
        let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
        let Some(header) = lines.next() else {
            return Ok(Self::default());
        };

        let header: Vec<String> = split_record(header).into_iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
            .collect();
        let column = |name: &'static str| {
            header.iter().position(|h| h == name).ok_or(VerifyError::MissingColumn(name))
        };
        let (id_col, ts_col, lat_col, lon_col) =
            (column("mission_id")?, column("timestamp")?, column("latitude")?, column("longitude")?);

        let rows = lines
            .map(|line| {
                let fields = split_record(line);
                let field = |i: usize| fields.get(i).map(|f| f.trim().to_string()).unwrap_or_default();
                RawRow {
                    mission_id: field(id_col),
                    timestamp: field(ts_col),
                    latitude: field(lat_col),
                    longitude: field(lon_col),
                }
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Distinct mission ids in first-seen order
    pub fn mission_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for row in &self.rows {
            if !row.mission_id.is_empty() && !ids.contains(&row.mission_id) {
                ids.push(row.mission_id.clone());
            }
        }
        ids
    }

    /// Mission of the last row, the default evaluation target
    pub fn latest_mission(&self) -> Option<&str> {
        self.rows.iter().rev()
            .map(|r| r.mission_id.as_str())
            .find(|id| !id.is_empty())
    }

    /// Fixes of one mission in file order. `InvalidFix.index` is the data row (0-based).
    pub fn fixes_for(&self, mission_id: &str) -> Result<Vec<Fix>, VerifyError> {
        let mut fixes = Vec::new();
        for (index, row) in self.rows.iter().enumerate().filter(|(_, r)| r.mission_id == mission_id) {
            let invalid = |reason: String| VerifyError::InvalidFix { index, reason };

            let timestamp = parse_timestamp(&row.timestamp)
                .ok_or_else(|| invalid(format!("unparsable timestamp '{}'", row.timestamp)))?;
            let latitude: f64 = row.latitude.parse()
                .map_err(|_| invalid(format!("unparsable latitude '{}'", row.latitude)))?;
            let longitude: f64 = row.longitude.parse()
                .map_err(|_| invalid(format!("unparsable longitude '{}'", row.longitude)))?;

            fixes.push(Fix::new(mission_id, timestamp, latitude, longitude));
        }

        if fixes.is_empty() {
            return Err(VerifyError::NoFixes { mission_id: mission_id.to_string() });
        }
        Ok(fixes)
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// The ingestion file on disk. Re-read on every call; the ingestion side keeps appending.
#[derive(Debug, Clone)]
pub struct FixStore {
    path: PathBuf,
}

impl FixStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path { &self.path }

    pub async fn read(&self) -> Result<FixTable, VerifyError> {
        let raw = fs::read_to_string(&self.path).await?;
        let table = FixTable::parse(&raw)?;
        debug!("FixStore: {} rows in {}", table.len(), self.path.display());
        Ok(table)
    }

    /// Fixes for `mission_id`, or for the mission of the last row when `None`.
    pub async fn load_mission(&self, mission_id: Option<&str>) -> Result<Vec<Fix>, VerifyError> {
        let table = self.read().await?;
        let selected = match mission_id {
            Some(id) => id.trim().to_string(),
            None => table.latest_mission()
                .ok_or_else(|| VerifyError::NoFixes { mission_id: "(latest)".into() })?
                .to_string(),
        };
        let fixes = table.fixes_for(&selected)?;
        info!("Loaded {} fixes for mission {selected}", fixes.len());
        Ok(fixes)
    }

    pub async fn mission_ids(&self) -> Result<Vec<String>, VerifyError> {
        Ok(self.read().await?.mission_ids())
    }

    /// Every mission from a single read of the file, in first-seen order. A
    /// bad row only fails its own mission.
    pub async fn load_all(&self) -> Result<Vec<(String, Result<Vec<Fix>, VerifyError>)>, VerifyError> {
        let table = self.read().await?;
        let missions: Vec<_> = table.mission_ids()
            .into_iter()
            .map(|id| {
                let fixes = table.fixes_for(&id);
                (id, fixes)
            })
            .collect();
        info!("Loaded {} missions from {}", missions.len(), self.path.display());
        Ok(missions)
    }
}
