//! Defense Experiment CLI.
//!
//! Commands:
//! - run: Run a single seeded trial and print its summary
//! - trials: Run repeated trials and save the results as JSON
//! - catalog: Print the action catalog and each action's angular neighbors

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use airflow_kernel::{ActionCatalog, ControllerConfig};
use defense_experiment::experiment::{ExperimentRunner, ExperimentRunnerConfig};
use defense_experiment::grid::{COMPASS, GridConfig};
use defense_experiment::results::{TrialResults, format_duration};

/// Generate a timestamped output path from the given path.
/// e.g., "trials.json" -> "trials-20260108-010530.json"
fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("trials");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

#[derive(Parser)]
#[command(name = "defense-experiment")]
#[command(version)]
#[command(about = "Airflow controller experiments on an insect-defense grid")]
struct Cli {
    /// Controller configuration file (JSON); defaults are used when omitted
    #[arg(long, env = "AIRFLOW_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Grid world and run length.
#[derive(Args, Clone)]
struct WorldArgs {
    /// Grid width
    #[arg(long, default_value = "16")]
    width: i32,

    /// Grid height
    #[arg(long, default_value = "16")]
    height: i32,

    /// Number of vacuums
    #[arg(long, default_value = "3")]
    vacuums: usize,

    /// Insect spawn probability per tick
    #[arg(long, default_value = "0.35")]
    spawn: f64,

    /// Ticks per run
    #[arg(long, default_value = "2000")]
    ticks: usize,

    /// Simulated milliseconds per tick
    #[arg(long, default_value = "50")]
    tick_ms: u64,
}

impl WorldArgs {
    fn runner_config(
        &self,
        controller: ControllerConfig,
        watch: Option<usize>,
    ) -> ExperimentRunnerConfig {
        ExperimentRunnerConfig {
            grid: GridConfig {
                width: self.width,
                height: self.height,
                vacuums: self.vacuums,
                spawn_probability: self.spawn,
                full_power: controller.catalog.full_power,
            },
            controller,
            ticks: self.ticks,
            tick_ms: self.tick_ms,
            watch,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single trial
    Run {
        #[command(flatten)]
        world: WorldArgs,

        /// Grid seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Vacuum index whose states and value tables are logged (needs --verbose)
        #[arg(long)]
        watch: Option<usize>,
    },

    /// Run repeated trials with consecutive seeds
    Trials {
        #[command(flatten)]
        world: WorldArgs,

        /// Number of trials
        #[arg(long, default_value = "10")]
        trials: usize,

        /// Seed of the first trial
        #[arg(long, default_value = "0")]
        base_seed: u64,

        /// Output file for results
        #[arg(long, default_value = "trials.json")]
        output: PathBuf,
    },

    /// Print the action catalog
    Catalog,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let controller = match &cli.config {
        Some(path) => ControllerConfig::from_json_file(path)?,
        None => ControllerConfig::default(),
    };

    match cli.command {
        Commands::Run { world, seed, watch } => {
            let runner = ExperimentRunner::new(world.runner_config(controller, watch));
            let result = runner.run(0, seed)?;

            println!("\n=== Run Result ===");
            println!("Grid: {}x{} with {} vacuums", world.width, world.height, world.vacuums);
            println!("Seed: {} (controller {})", seed, result.config.controller_seed);
            println!("Ticks: {} in {}", world.ticks, format_duration(result.duration_ms));
            println!("Spawned: {}", result.total_spawned);
            println!("Captured: {}", result.total_captures);
            println!("Escaped: {}", result.total_escaped);
            println!("Capture rate: {:.1}%", result.capture_rate * 100.0);
            println!(
                "  first quarter: {:.1}%, last quarter: {:.1}%",
                result.early_capture_rate * 100.0,
                result.late_capture_rate * 100.0
            );
            println!("Known states: {}", result.known_states);
            println!("Value updates: {}", result.total_attempts);
            if result.faults > 0 {
                println!("Faults: {}", result.faults);
            }

            println!("\nVacuums:");
            for vacuum in &result.vacuums {
                println!(
                    "  ({:>2},{:>2}) {:>5} captures  {}",
                    vacuum.x, vacuum.y, vacuum.captures, vacuum.id
                );
            }
        }

        Commands::Trials {
            world,
            trials,
            base_seed,
            output,
        } => {
            info!(trials, base_seed, ticks = world.ticks, "Starting trials");

            let runner = ExperimentRunner::new(world.runner_config(controller, None));
            let mut results = TrialResults::new();

            for trial in 0..trials {
                let seed = base_seed + trial as u64;
                let result = runner.run(trial, seed)?;
                info!(
                    progress = format!("{}/{}", trial + 1, trials),
                    seed,
                    capture_rate = format!("{:.3}", result.capture_rate),
                    "Completed trial"
                );
                results.add(result);
            }

            results.compute_summary();
            let output_path = timestamped_path(&output);
            results.save(&output_path)?;

            println!("\n=== Trials Complete ===");
            println!("Results saved to: {}", output_path.display());
            if let Some(summary) = &results.summary {
                println!("\nSummary ({} trials):", summary.trials);
                println!(
                    "  capture_rate={:.1}% (95% CI {:.1}%..{:.1}%)",
                    summary.mean_capture_rate * 100.0,
                    summary.capture_rate_ci.0 * 100.0,
                    summary.capture_rate_ci.1 * 100.0
                );
                println!(
                    "  first quarter={:.1}%, last quarter={:.1}%",
                    summary.mean_early_capture_rate * 100.0,
                    summary.mean_late_capture_rate * 100.0
                );
                println!(
                    "  avg captures={:.1}, avg escaped={:.1}, avg states={:.1}",
                    summary.mean_captures, summary.mean_escaped, summary.mean_known_states
                );
            }
        }

        Commands::Catalog => {
            let catalog = ActionCatalog::from_config(&controller.catalog);
            println!("{} actions over {} directions\n", catalog.len(), catalog.directions());

            for action in catalog.actions() {
                let name = if action.is_off() {
                    "-"
                } else {
                    COMPASS
                        .get(action.direction().index())
                        .map(|(name, _, _)| *name)
                        .unwrap_or("?")
                };
                match catalog.neighbors(action.slot()) {
                    Some([left, right]) => println!(
                        "  {:<24} {:<3} neighbors #{} #{}",
                        action.to_string(),
                        name,
                        left,
                        right
                    ),
                    None => println!("  {:<24} {:<3}", action.to_string(), name),
                }
            }
        }
    }

    Ok(())
}
