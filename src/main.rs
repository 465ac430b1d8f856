use std::path::PathBuf;

use clap::Parser;

use fleet_orchestrator::config::loader::{apply_election_env, load_with_overrides};
use fleet_orchestrator::config::OrchestratorConfig;
use fleet_orchestrator::lifecycle::{run_orchestrator, spawn_signal_handler, Shutdown};
use fleet_orchestrator::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "fleet-orchestrator")]
#[command(about = "Self-healing container fleet orchestrator node", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long, env = "FLEET_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config: OrchestratorConfig =
        load_with_overrides(cli.config.as_deref(), |config: &mut OrchestratorConfig| {
            apply_election_env(&mut config.election, |key| std::env::var(key).ok())
        })?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fleet-orchestrator starting");
    tracing::info!(
        runner_port = ?config.election.runner_port,
        neighbour_port = ?config.election.neighbour_port,
        max_nodes = ?config.election.max_nodes,
        is_leader = ?config.election.is_leader,
        services = %config.store.services_path.display(),
        "Configuration loaded"
    );

    metrics::init_from_config(
        config.observability.metrics_enabled,
        &config.observability.metrics_address,
    );

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    run_orchestrator(config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
