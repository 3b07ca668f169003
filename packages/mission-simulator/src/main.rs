//! main.rs: Mission simulator entry point
//!
//! Reads a scenario file of `[[missions]]`, generates one fix every
//! `interval_s` along each planned route, and appends them to the ingestion
//! CSV the verifier reads. Each planned route is also written as GeoJSON so
//! the verifier's file route provider can serve it as the reference path.

mod route_sim;
mod scenarios;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::Parser;
use mission_types::Fix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{info, warn};

use scenarios::MissionSpec;

const CSV_HEADER: &str = "mission_id,timestamp,latitude,longitude";

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mission-sim", about = "Synthetic GPS mission generator")]
struct Args {
    /// Scenario file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Ingestion CSV, overrides output.fixes_path
    #[arg(long)]
    fixes: Option<PathBuf>,
    /// Planned route directory, overrides output.reference_dir
    #[arg(long)]
    reference_dir: Option<PathBuf>,
    /// Only simulate this mission
    #[arg(short, long)]
    mission: Option<String>,
    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
    /// Print fixes instead of writing files
    #[arg(long)]
    dry_run: bool,
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SimConfig {
    #[serde(default)]
    output: OutputConfig,
    #[serde(default)]
    missions: Vec<MissionSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct OutputConfig {
    fixes_path: PathBuf,
    reference_dir: PathBuf,
    /// First fix of the first mission; missions follow each other. Defaults to now.
    start_time: Option<NaiveDateTime>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fixes_path: PathBuf::from("data/gps_data.csv"),
            reference_dir: PathBuf::from("data/references"),
            start_time: None,
        }
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

fn csv_line(fix: &Fix) -> String {
    format!(
        "{},{},{:.6},{:.6}",
        fix.mission_id,
        fix.timestamp.format("%Y-%m-%d %H:%M:%S"),
        fix.latitude,
        fix.longitude,
    )
}

/// Append fixes, writing the header first when the file is new or empty.
fn append_fixes(path: &Path, fixes: &[Fix]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut buf = String::new();
    if file.metadata()?.len() == 0 {
        buf.push_str(CSV_HEADER);
        buf.push('\n');
    }
    for fix in fixes {
        buf.push_str(&csv_line(fix));
        buf.push('\n');
    }
    file.write_all(buf.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn write_reference(dir: &Path, mission: &MissionSpec) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{}.geojson", mission.id));
    let json = serde_json::to_string_pretty(&mission.planned_route().to_geojson())?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mission_simulator=info".into()),
        )
        .init();

    let args = Args::parse();

    let raw = fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let cfg: SimConfig = toml::from_str(&raw)
        .with_context(|| format!("parsing {}", args.config.display()))?;

    let fixes_path = args.fixes.unwrap_or(cfg.output.fixes_path);
    let reference_dir = args.reference_dir.unwrap_or(cfg.output.reference_dir);
    let mut clock = cfg.output.start_time.unwrap_or_else(|| Utc::now().naive_utc());
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let missions: Vec<&MissionSpec> = cfg.missions.iter()
        .filter(|m| args.mission.as_deref().map_or(true, |id| m.id == id))
        .collect();
    if missions.is_empty() {
        warn!("No missions to simulate in {}", args.config.display());
        return Ok(());
    }

    info!("Simulating {} missions → {}", missions.len(), fixes_path.display());

    for mission in missions {
        mission.validate()?;
        let fixes = scenarios::generate(mission, clock, &mut rng);
        info!("Mission {} ({:?}): {} fixes", mission.id, mission.scenario, fixes.len());

        if args.dry_run {
            for (i, fix) in fixes.iter().enumerate() {
                println!("[{}] {}", i + 1, csv_line(fix));
            }
        } else {
            append_fixes(&fixes_path, &fixes)?;
            let route = write_reference(&reference_dir, mission)?;
            info!("Mission {}: planned route → {}", mission.id, route.display());
        }

        // next mission starts a minute after this one ends
        if let Some(last) = fixes.last() {
            clock = last.timestamp + chrono::Duration::minutes(1);
        }
    }

    info!("All missions simulated");
    Ok(())
}
