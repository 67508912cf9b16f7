//! WaveSense simulation CLI.
//!
//! Runs deterministic pipeline scenarios and reports pass/fail; any
//! failure exits non-zero so CI can gate on it.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wavesense_sim::{ScenarioId, ScenarioRunner};

#[derive(Parser, Debug)]
#[command(name = "wavesense-sim", about = "Deterministic WaveSense pipeline scenarios")]
struct Args {
    /// Scenario name (see --list), or "all".
    #[arg(long, default_value = "all")]
    scenario: String,

    /// Master seed; every noise sample derives from it.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write a frame-by-frame JSON export (single scenario only).
    #[arg(long)]
    export: Option<PathBuf>,

    /// List scenarios and exit.
    #[arg(long)]
    list: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.list {
        for scenario in ScenarioId::all() {
            println!("{:<20} {}", scenario.name(), scenario.describe());
        }
        return;
    }

    let scenarios = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match ScenarioId::from_name(&args.scenario) {
            Some(s) => vec![s],
            None => {
                error!("unknown scenario '{}'; try --list", args.scenario);
                std::process::exit(2);
            }
        }
    };

    let record = args.export.is_some();
    if record && scenarios.len() > 1 {
        warn!("--export needs a single scenario; ignoring");
    }

    let runner = ScenarioRunner::new(args.seed);
    let mut failed = 0usize;
    for scenario in &scenarios {
        let record_this = record && scenarios.len() == 1;
        let (result, export) = runner.run(*scenario, record_this);

        if let (Some(path), Some(export)) = (&args.export, export) {
            match export.save(path) {
                Ok(()) => info!(path = %path.display(), "export written"),
                Err(e) => error!(path = %path.display(), "export failed: {e}"),
            }
        }

        if result.passed() {
            info!(
                scenario = scenario.name(),
                seed = result.seed,
                ticks = result.ticks,
                "PASS"
            );
        } else {
            failed += 1;
            for failure in &result.failures {
                error!(scenario = scenario.name(), seed = result.seed, "{failure}");
            }
        }
    }

    info!(
        total = scenarios.len(),
        passed = scenarios.len() - failed,
        failed,
        "run complete"
    );
    if failed > 0 {
        std::process::exit(1);
    }
}
