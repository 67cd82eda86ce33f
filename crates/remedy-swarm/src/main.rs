//! `remedy-swarm` command-line entry point.
//!
//! ```bash
//! remedy-swarm --config remedy.toml run --report result.json
//! remedy-swarm --config remedy.toml route issues.json
//! remedy-swarm --config remedy.toml skills
//! ```
//!
//! Exit codes: 0 converged, 2 no progress, 3 max iterations, 4 error,
//! 5 incomplete (interrupted).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use remedy_coordination::WorkflowStatus;
use remedy_swarm::config::{LogFormat, SwarmConfig};
use remedy_swarm::{app, report, telemetry};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "remedy-swarm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Route analysis issues to fixing agents until the code converges",
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, default_value = "remedy.toml", global = true)]
    config: PathBuf,

    /// Emit JSON-formatted log lines (overrides REMEDY_LOG_FORMAT)
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run check → route → fix until convergence or a stop condition
    Run {
        /// Project root (overrides `root` in the config)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Maximum iterations (overrides config and REMEDY_MAX_ITERATIONS)
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Write the full result as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Explain routing for issues in a JSON file without fixing anything
    Route {
        /// JSON array of issues
        issues: PathBuf,

        /// Print decisions as JSON
        #[arg(long)]
        json: bool,
    },

    /// List skills with owners and learned effectiveness
    Skills,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_byte(WorkflowStatus::Error.exit_code()))
        }
    }
}

async fn dispatch(cli: Cli) -> Result<u8> {
    let mut config = SwarmConfig::load(&cli.config)?;
    if cli.json_logs {
        config.log_format = LogFormat::Json;
    }
    telemetry::init_tracing(config.log_format);

    match cli.command {
        Commands::Run {
            root,
            max_iterations,
            report: report_path,
        } => {
            if let Some(root) = root {
                config.root = root;
            }
            if let Some(max) = max_iterations {
                config.engine.convergence.max_iterations = max;
                config.validate()?;
            }

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; stopping after the current issue");
                    on_signal.cancel();
                }
            });

            let result = app::run(&config, cancel).await?;
            print!("{}", report::render_summary(&result));
            if let Some(path) = report_path {
                report::write_json(&path, &result)?;
            }
            Ok(exit_byte(result.exit_code()))
        }
        Commands::Route { issues, json } => {
            let decisions = app::route_file(&config, &issues)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&decisions)?);
            } else {
                print!("{}", report::render_routes(&decisions));
            }
            Ok(0)
        }
        Commands::Skills => {
            let catalog = config.catalog()?;
            let store = app::open_store(&config)?;
            print!(
                "{}",
                report::render_skills(&catalog, store.as_ref(), config.engine.router.min_samples)
            );
            Ok(0)
        }
    }
}

fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
