//! Status command - show the persisted deploy status

use console::{StyledObject, style};
use std::fmt::Write;
use std::path::Path;
use vdeploy_core::{Phase, Status};
use vdeploy_kube::{KubeCluster, StatusStore, StatusStoreConfig};

use crate::error::{CliError, Result};

/// Run the status command
pub async fn run(store: StatusStoreConfig, kubeconfig: Option<&Path>, output_json: bool) -> Result<()> {
    let cluster = KubeCluster::connect(kubeconfig).await?;
    let location = format!("{}/{}", store.namespace, store.name);
    let store = StatusStore::new(cluster, store);

    let Some(loaded) = store.read().await? else {
        println!(
            "{} No deploy status recorded in {}",
            style("!").yellow().bold(),
            style(&location).cyan()
        );
        return Ok(());
    };

    if output_json {
        let json = serde_json::to_string_pretty(&loaded.status)
            .map_err(|e| CliError::internal(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    print_status(&loaded.status);
    Ok(())
}

pub fn print_status(status: &Status) {
    print!("{}", format_status(status));
}

fn styled_phase(phase: Phase) -> StyledObject<&'static str> {
    match phase {
        Phase::Success => style(phase.as_str()).green(),
        Phase::Failed => style(phase.as_str()).red(),
        Phase::Pending => style(phase.as_str()).yellow(),
    }
}

/// Human readable status summary
pub fn format_status(status: &Status) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", style("DEPLOY").bold().underlined());
    let _ = writeln!(out, "  Phase:      {}", styled_phase(status.phase));
    if !status.reason.is_empty() {
        let _ = writeln!(out, "  Reason:     {}", status.reason);
    }
    if !status.message.is_empty() {
        let _ = writeln!(out, "  Message:    {}", status.message);
    }

    let _ = writeln!(out, "\n{}", style("MANIFESTS").bold().underlined());
    let _ = writeln!(out, "  Phase:      {}", styled_phase(status.manifests.phase));
    if !status.manifests.reason.is_empty() {
        let _ = writeln!(out, "  Reason:     {}", status.manifests.reason);
    }
    if !status.manifests.message.is_empty() {
        let _ = writeln!(out, "  Message:    {}", status.manifests.message);
    }

    if status.charts.is_empty() {
        return out;
    }

    let _ = writeln!(out, "\n{}", style("CHARTS").bold().underlined());
    let width = status
        .charts
        .iter()
        .map(|c| c.key().to_string().len())
        .max()
        .unwrap_or(0);
    for chart in &status.charts {
        let key = chart.key().to_string();
        let _ = write!(
            out,
            "  {:width$}  {}",
            key,
            styled_phase(chart.phase),
            width = width
        );
        if !chart.reason.is_empty() {
            let _ = write!(out, "  {}: {}", chart.reason, chart.message);
        }
        out.push('\n');
    }

    out
}
