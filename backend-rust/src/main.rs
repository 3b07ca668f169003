//! mission-verifier: evaluate recorded missions and print their verdicts.
//!
//!   mission-verifier verify                 # mission of the last recorded fix
//!   mission-verifier verify --mission M42   # one mission
//!   mission-verifier verify --all --report  # every mission, JSON reports to reports_dir
//!   mission-verifier latest                 # most recent verdict per mission

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mission_types::{Fix, MlStatus, VerdictRecord};
use serde_json::json;
use tracing::{error, info};

use mission_verifier::deviation::DeviationStatus;
use mission_verifier::fix_store::FixStore;
use mission_verifier::ledger::ResultLedger;
use mission_verifier::{Evaluation, Pipeline, VerifierConfig, VerifyError};

#[derive(Parser, Debug)]
#[command(name = "mission-verifier", about = "GPS mission trajectory verifier")]
struct Cli {
    /// TOML config file (missing file = built-in defaults)
    #[arg(short, long, global = true, default_value = "verifier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one mission (default: the mission of the last recorded fix) or all of them
    Verify {
        #[arg(short, long, conflicts_with = "all")]
        mission: Option<String>,

        #[arg(long)]
        all: bool,

        /// Ingestion CSV, overrides storage.fixes_path
        #[arg(long)]
        fixes: Option<PathBuf>,

        /// Result log, overrides storage.results_path
        #[arg(long)]
        results: Option<PathBuf>,

        /// Also write mission_{id}.json to storage.reports_dir
        #[arg(long)]
        report: bool,

        /// Print JSON instead of the summary
        #[arg(long)]
        json: bool,
    },
    /// Most recent verdict per mission from the result log
    Latest {
        #[arg(long)]
        results: Option<PathBuf>,
    },
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn print_summary(eval: &Evaluation) {
    let r = &eval.record;
    let ml = match r.ml_pred {
        Some(1) => "Anomaly".to_string(),
        Some(_) => "Valid".to_string(),
        None => format!("unavailable ({})", match &eval.ml.status {
            MlStatus::Unavailable { reason } => reason.as_str(),
            MlStatus::Ok => "",
        }),
    };
    let rule_issues = if eval.findings.is_empty() {
        "None".to_string()
    } else {
        eval.findings.iter().map(|f| f.tag()).collect::<Vec<_>>().join("; ")
    };

    println!();
    println!("Summary:");
    println!("  Mission ID        : {}", r.mission_id);
    println!("  Distance (km)     : {:.2}", r.distance_km);
    println!("  Duration (min)    : {:.2}", r.duration_min);
    println!("  Area (km²)        : {:.4}", r.area_km2);
    println!("  Avg speed (km/h)  : {:.2}", r.avg_speed_kmh);
    println!("  Points recorded   : {}", r.num_points);
    match &eval.deviation.status {
        DeviationStatus::Checked => println!("  Off-road points   : {}", r.offroad_points),
        DeviationStatus::Skipped { reason } => println!("  Off-road points   : {} (route check skipped: {reason})", r.offroad_points),
    }
    println!("  ML Prediction     : {ml}");
    println!("  Rule-based issues : {rule_issues}");
    println!("  Final Status      : {}", r.status);
    if let Some(reason) = &eval.persist_error {
        println!("  Not persisted     : {reason}");
    }
}

fn print_latest(records: &[&VerdictRecord]) {
    println!("{:<16} {:>8} {:>8} {:>8} {:>6} {:>8} {:>11}  {:<20} anomalies", "mission_id", "dist_km", "dur_min", "km/h", "pts", "offroad", "ml_pred", "status");
    for r in records {
        println!(
            "{:<16} {:>8.2} {:>8.2} {:>8.2} {:>6} {:>8} {:>11}  {:<20} {}",
            r.mission_id,
            r.distance_km,
            r.duration_min,
            r.avg_speed_kmh,
            r.num_points,
            r.offroad_points,
            r.ml_pred_display(),
            r.status.as_str(),
            r.anomalies_display(),
        );
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn verify(
    config: VerifierConfig,
    mission: Option<String>,
    all: bool,
    write_report: bool,
    as_json: bool,
) -> Result<bool> {
    let store = FixStore::new(config.storage.fixes_path.clone());
    // one read of the ingestion file, however many missions are evaluated
    let missions: Vec<(String, Result<Vec<Fix>, VerifyError>)> = if all {
        store.load_all().await
            .with_context(|| format!("reading {}", store.path().display()))?
    } else {
        let label = mission.clone().unwrap_or_else(|| "(latest)".into());
        vec![(label, store.load_mission(mission.as_deref()).await)]
    };
    if missions.is_empty() {
        info!("No missions recorded in {}", store.path().display());
        return Ok(true);
    }

    let reports_dir = config.storage.reports_dir.clone();
    let pipeline = Pipeline::from_config(&config);

    let mut handles = Vec::with_capacity(missions.len());
    for (label, fixes) in missions {
        let pipeline = pipeline.clone();
        let task = tokio::spawn(async move { pipeline.evaluate(fixes?).await });
        handles.push((label, task));
    }

    let mut all_ok = true;
    for (label, handle) in handles {
        let eval = match handle.await.context("evaluation task panicked")? {
            Ok(eval) => eval,
            Err(e) => {
                error!("Evaluation of mission {label} aborted: {e}");
                all_ok = false;
                continue;
            }
        };

        let report = eval.report();
        if write_report {
            report.write_to(&reports_dir).await
                .with_context(|| format!("writing report to {}", reports_dir.display()))?;
        }
        if as_json {
            let out = json!({ "report": report, "persist_error": eval.persist_error });
            println!("{}", serde_json::to_string_pretty(&out)?);
        } else {
            print_summary(&eval);
        }
    }
    Ok(all_ok)
}

async fn latest(results: PathBuf) -> Result<()> {
    let ledger = ResultLedger::new(results);
    let latest = ledger.latest_by_mission().await
        .with_context(|| format!("reading {}", ledger.path().display()))?;
    if latest.is_empty() {
        println!("No verdicts recorded in {}", ledger.path().display());
        return Ok(());
    }
    print_latest(&latest.values().collect::<Vec<_>>());
    Ok(())
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mission_verifier=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = VerifierConfig::load(Some(&cli.config))
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Verify { mission, all, fixes, results, report, json } => {
            if let Some(p) = fixes {
                config.storage.fixes_path = p;
            }
            if let Some(p) = results {
                config.storage.results_path = p;
            }
            let ok = verify(config, mission, all, report, json).await?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::Latest { results } => {
            latest(results.unwrap_or(config.storage.results_path)).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
