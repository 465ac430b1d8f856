use std::path::PathBuf;

use clap::Parser;

use fleet_orchestrator::config::loader::{apply_load_balancer_env, load_with_overrides};
use fleet_orchestrator::config::LoadBalancerConfig;
use fleet_orchestrator::lifecycle::{run_load_balancer, spawn_signal_handler, Shutdown};
use fleet_orchestrator::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "load-balancer")]
#[command(about = "Round-robin load balancer for one fleet service", long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long, env = "LB_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config: LoadBalancerConfig =
        load_with_overrides(cli.config.as_deref(), |config: &mut LoadBalancerConfig| {
            apply_load_balancer_env(config, |key| std::env::var(key).ok())
        })?;

    logging::init(&config.observability);
    tracing::info!(
        service = %config.service_name,
        container = %config.container_name,
        proxy = %config.proxy_address,
        health = %config.health_address,
        "load-balancer starting"
    );

    metrics::init_from_config(
        config.observability.metrics_enabled,
        &config.observability.metrics_address,
    );

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    run_load_balancer(config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
