//! SkyWatch scenario CLI
//!
//! Runs synthetic-fleet scenarios against the render-decision engine and
//! checks its invariants every tick.

use clap::Parser;
use skywatch_core::RenderConfig;
use skywatch_sim::scenarios::ScenarioId;
use skywatch_sim::{ScenarioResult, ScenarioRunner, SimExport};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// SkyWatch fleet scenario CLI
#[derive(Parser, Debug)]
#[command(name = "skywatch-sim")]
#[command(about = "Run synthetic-fleet scenarios against the SkyWatch engine", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (sparse, dense, crowded, swarm, cleanup_race, reorder, selection, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of random seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Fleet size (defaults to the scenario's own)
    #[arg(short, long)]
    aircraft: Option<usize>,

    /// Ticks per run
    #[arg(short, long, default_value = "20")]
    ticks: u64,

    /// Render configuration JSON file
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-tick frames to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Record the scenario to a Rerun `.rrd` file
    #[cfg(feature = "visualization")]
    #[arg(long)]
    rerun: Option<String>,
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    if !args.json {
        info!("SkyWatch scenario runner v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                eprintln!("Error: {}", e);
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(1);
            }
        }
    };

    let render = match &args.config {
        Some(path) => match RenderConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => RenderConfig::default(),
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    #[cfg(feature = "visualization")]
    if let Some(path) = &args.rerun {
        let scenario = single_scenario(&scenarios, "--rerun");
        let aircraft = args.aircraft.unwrap_or_else(|| scenario.default_aircraft());
        match record_rerun(base_seed, aircraft, args.ticks, render, path) {
            Ok(()) => info!("Recorded {} to {}", scenario.name(), path),
            Err(e) => {
                error!("Rerun recording failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let runner = |seed: u64| {
        ScenarioRunner::new(seed)
            .with_aircraft(args.aircraft)
            .with_ticks(args.ticks)
            .with_render_config(render.clone())
    };

    // Export mode runs a single scenario once
    if let Some(export_path) = &args.export {
        let scenario = single_scenario(&scenarios, "--export");
        let mut export = SimExport::new(scenario.name(), base_seed);
        let result = runner(base_seed).run_with_export(scenario, &mut export);

        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} frames to {}", export.frames.len(), export_path),
            Err(e) => error!("Failed to write export: {:?}", e),
        }
        report(&result, args.json);
        if !result.passed {
            std::process::exit(1);
        }
        return;
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner(seed);

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result, false);
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}

fn single_scenario(scenarios: &[ScenarioId], flag: &str) -> ScenarioId {
    match scenarios {
        [one] => *one,
        _ => {
            eprintln!("Error: {} only supports a single scenario, not 'all'", flag);
            std::process::exit(1);
        }
    }
}

fn report(result: &ScenarioResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(out) => println!("{}", out),
            Err(e) => error!("Failed to serialize result: {}", e),
        }
    } else if result.passed {
        info!(
            "✓ {} (seed={}) PASSED - {} checks, peak {} visible, {} lines",
            result.scenario.name(),
            result.seed,
            result.metrics.checks,
            result.metrics.max_visible,
            result.metrics.max_lines
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

/// Flies a fleet through a Rerun-backed dashboard.
#[cfg(feature = "visualization")]
fn record_rerun(
    seed: u64,
    aircraft: usize,
    ticks: u64,
    render: RenderConfig,
    path: &str,
) -> Result<(), skywatch_core::VisualError> {
    use skywatch_core::{Dashboard, RerunLayer, RuntimeConfig};
    use skywatch_sim::Fleet;

    let layer = RerunLayer::to_file("skywatch", path)?;
    let mut dashboard = Dashboard::new(layer, render, RuntimeConfig::default());
    let mut fleet = Fleet::new(seed);
    fleet.spawn(aircraft);

    for _ in 0..ticks {
        fleet.step(10.0);
        dashboard.apply_batch(fleet.snapshots());
    }
    info!(
        "Drew {} tracks ({} with lines)",
        dashboard.visible_count(),
        dashboard.last_report().lines
    );
    Ok(())
}
