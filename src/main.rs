//! NATS manager - Kubernetes operator for a clustered NATS deployment

mod config;
mod controller_runner;

use clap::Parser;
use kube::{Client, CustomResourceExt};

use nats_common::crd::Nats;
use nats_common::telemetry::{init_telemetry, TelemetryConfig};
use nats_common::CONTROLLER_NAME;

use crate::config::OperatorConfig;

/// nats-manager - reconciles the NATS custom resource into a NATS cluster
#[derive(Parser, Debug)]
#[command(name = "nats-manager", version, about, long_about = None)]
struct Cli {
    /// Print the NATS CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    config: OperatorConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&Nats::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(&TelemetryConfig {
        service_name: CONTROLLER_NAME.to_string(),
        log_level: cli.config.log_level.clone(),
    })?;

    run_controller(cli.config).await
}

async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!(
        chart = ?config.chart_dir,
        cr_name = %config.cr_name,
        cr_namespace = %config.cr_namespace,
        fips = config.fips_mode_enabled,
        "NATS manager starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let controllers = controller_runner::build_nats_controllers(client, &config)?;
    futures::future::join_all(controllers).await;

    tracing::info!("NATS manager shutting down");
    Ok(())
}
