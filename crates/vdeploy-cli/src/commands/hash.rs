//! Hash command - print the config hash of each declared chart

use std::path::Path;
use vdeploy_core::chart_config_hash;

use crate::config::DeployConfig;
use crate::error::Result;

/// Run the hash command
pub fn run(config_path: &Path) -> Result<()> {
    let config = DeployConfig::load(config_path)?;
    for (release, hash) in chart_hashes(&config)? {
        println!("{}  {}", hash, release);
    }
    Ok(())
}

/// `(namespace/name, hash)` per declared chart, in declaration order
pub fn chart_hashes(config: &DeployConfig) -> Result<Vec<(String, String)>> {
    config
        .deploy
        .charts
        .iter()
        .map(|chart| -> Result<(String, String)> {
            Ok((chart.release_key().to_string(), chart_config_hash(chart)?))
        })
        .collect()
}
