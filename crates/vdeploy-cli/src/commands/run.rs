//! Run command - reconcile the declared deploy against the cluster

use console::style;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vdeploy_kube::{Deployer, Driver, DriverOutcome, HelmCli, KubeCluster};

use crate::commands::status::print_status;
use crate::config::DeployConfig;
use crate::error::{CliError, Result};

/// Run the run command
pub async fn run(config_path: &Path, once: bool, cancel: CancellationToken) -> Result<()> {
    let config = DeployConfig::load(config_path)?;
    info!(
        release = %config.release.name,
        namespace = %config.release.namespace,
        charts = config.deploy.charts.len(),
        "loaded deploy configuration"
    );

    let cluster = KubeCluster::connect(config.helm.kubeconfig.as_deref()).await?;
    let deployer = Deployer::new(
        HelmCli::new(config.helm_config()),
        cluster,
        config.deployer_config(),
    );

    if once {
        let requeue = deployer.apply(&config.deploy, &cancel).await?;
        if let Some(status) = deployer.status().await? {
            print_status(&status);
        }
        if requeue {
            return Err(CliError::NotConverged {
                message: "charts are still pending".to_string(),
            });
        }
        println!("{} Deploy converged", style("✓").green().bold());
        return Ok(());
    }

    let driver = Driver::new(deployer, config.deploy.clone(), config.driver_config());
    match driver.run(cancel).await {
        DriverOutcome::Converged => {
            if let Some(status) = driver.deployer().status().await? {
                print_status(&status);
            }
            println!("{} Deploy converged", style("✓").green().bold());
            Ok(())
        }
        DriverOutcome::Cancelled => Err(CliError::Interrupted),
    }
}
