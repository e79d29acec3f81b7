use anyhow::Result;
use tracing::{error, info, warn};

use cass_operator::config::{self, OperatorConfig};
use cass_operator::error::OperatorError;
use cass_operator::{controller, metrics, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let config = OperatorConfig::from_env()?;
    telemetry::init(&config.log_level)?;

    info!(
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        "Starting cass-operator"
    );

    match config::operator_namespace(config.run_mode) {
        Ok(ns) => info!(namespace = %ns, "Operator namespace"),
        Err(OperatorError::RunLocal) => info!("Running outside the cluster"),
        Err(e) => warn!("Could not determine operator namespace: {e}"),
    }

    let metrics_addr = config.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(&metrics_addr).await {
            error!("Metrics server stopped: {e}");
        }
    });

    let client = kube::Client::try_default().await?;
    controller::run(client, &config).await;

    info!("Controller stopped");
    Ok(())
}
