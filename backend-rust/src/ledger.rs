//! # ledger
//!
//! Append-only verdict log (CSV). One row per evaluation; rows are never
//! rewritten. A re-evaluation of the same mission appends a new row and
//! readers take the most recent one.
//!
//! ## Invariant
//! All writers share one mutex, so rows from concurrent evaluations never
//! interleave. The header is written exactly once, when the file is new or empty.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mission_types::{AnomalyFinding, VerdictRecord, VerdictStatus};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::table::{join_record, split_record};

pub const HEADER: [&str; 10] = [
    "mission_id",
    "distance_km",
    "duration_min",
    "area_km2",
    "avg_speed_kmh",
    "num_points",
    "offroad_points",
    "ml_pred",
    "anomalies",
    "status",
];

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("result log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("result log has no '{0}' column")]
    MissingColumn(&'static str),
}

// ── Row encoding ──────────────────────────────────────────────────────────────

/// One CSV line (no newline). Values are rounded for the log only.
pub fn format_row(record: &VerdictRecord) -> String {
    join_record(&[
        record.mission_id.clone(),
        format!("{:.2}", record.distance_km),
        format!("{:.2}", record.duration_min),
        format!("{:.4}", record.area_km2),
        format!("{:.2}", record.avg_speed_kmh),
        record.num_points.to_string(),
        record.offroad_points.to_string(),
        record.ml_pred_display(),
        record.anomalies_display(),
        record.status.as_str().to_string(),
    ])
}

fn parse_anomalies(raw: &str) -> Vec<AnomalyFinding> {
    match raw.trim() {
        "" | "None" => Vec::new(),
        joined => joined.split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(AnomalyFinding::from_tag)
            .collect(),
    }
}

fn parse_ml_pred(raw: &str) -> Result<Option<u8>, String> {
    match raw.trim() {
        "" | "unavailable" => Ok(None),
        "0" => Ok(Some(0)),
        "1" => Ok(Some(1)),
        other => Err(format!("ml_pred '{other}'")),
    }
}

/// Column positions resolved from the header line
struct Columns([usize; 10]);

impl Columns {
    fn from_header(line: &str) -> Result<Self, LedgerError> {
        let header: Vec<String> = split_record(line).into_iter().map(|h| h.trim().to_string()).collect();
        let mut idx = [0usize; 10];
        for (slot, name) in idx.iter_mut().zip(HEADER) {
            *slot = header.iter().position(|h| h == name).ok_or(LedgerError::MissingColumn(name))?;
        }
        Ok(Self(idx))
    }

    fn parse(&self, line: &str) -> Result<VerdictRecord, String> {
        let fields = split_record(line);
        let get = |col: usize| {
            fields.get(self.0[col])
                .map(|f| f.trim())
                .ok_or_else(|| format!("missing {}", HEADER[col]))
        };
        fn num<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, String> {
            raw.parse().map_err(|_| format!("{name} '{raw}'"))
        }

        Ok(VerdictRecord {
            mission_id: get(0)?.to_string(),
            distance_km: num("distance_km", get(1)?)?,
            duration_min: num("duration_min", get(2)?)?,
            area_km2: num("area_km2", get(3)?)?,
            avg_speed_kmh: num("avg_speed_kmh", get(4)?)?,
            num_points: num("num_points", get(5)?)?,
            offroad_points: num("offroad_points", get(6)?)?,
            ml_pred: parse_ml_pred(get(7)?)?,
            anomalies: parse_anomalies(get(8)?),
            status: {
                let raw = get(9)?;
                VerdictStatus::parse(raw).ok_or_else(|| format!("status '{raw}'"))?
            },
        })
    }
}

// ── Ledger ────────────────────────────────────────────────────────────────────

/// Cloneable handle to the log file; every clone shares the same write lock.
#[derive(Clone)]
pub struct ResultLedger {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl ResultLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn io(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io { path: self.path.to_path_buf(), source }
    }

    /// Append one row. This is the single write path.
    pub async fn append(&self, record: &VerdictRecord) -> Result<(), LedgerError> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| self.io(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())
            .await
            .map_err(|e| self.io(e))?;
        let is_new = file.metadata().await.map_err(|e| self.io(e))?.len() == 0;

        let mut buf = String::new();
        if is_new {
            buf.push_str(&join_record(&HEADER));
            buf.push('\n');
        }
        buf.push_str(&format_row(record));
        buf.push('\n');

        file.write_all(buf.as_bytes()).await.map_err(|e| self.io(e))?;
        file.flush().await.map_err(|e| self.io(e))?;
        debug!("Ledger: appended {} ({})", record.mission_id, record.status);
        Ok(())
    }

    /// Every row in write order. A missing log is empty; malformed rows are skipped.
    pub async fn read_all(&self) -> Result<Vec<VerdictRecord>, LedgerError> {
        let raw = match fs::read_to_string(self.path.as_path()).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io(e)),
        };

        let mut lines = raw.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        let Some((_, header)) = lines.next() else {
            return Ok(Vec::new());
        };
        let columns = Columns::from_header(header)?;

        let mut records = Vec::new();
        for (lineno, line) in lines {
            match columns.parse(line) {
                Ok(r) => records.push(r),
                Err(reason) => warn!("Ledger: skipping line {} of {}: {reason}", lineno + 1, self.path.display()),
            }
        }
        Ok(records)
    }

    /// One record per mission, the most recent row wins.
    pub async fn latest_by_mission(&self) -> Result<BTreeMap<String, VerdictRecord>, LedgerError> {
        let mut latest = BTreeMap::new();
        for record in self.read_all().await? {
            latest.insert(record.mission_id.clone(), record);
        }
        Ok(latest)
    }
}
