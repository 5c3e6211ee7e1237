//! Persisted deploy status
//!
//! The JSON encoding of [`Status`] is read by external tooling: the field
//! names (`phase`, `manifests`, `charts`, ...) and the phase values
//! `Pending`, `Success` and `Failed` must not change.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::desired::ReleaseKey;
use crate::error::Result;

/// Convergence phase of the whole deploy, the manifests or a single chart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Pending,
    Success,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pending => "Pending",
            Phase::Success => "Success",
            Phase::Failed => "Failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine readable failure reasons recorded in the status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Chart archive could not be pulled or decoded
    ChartPullFailed,
    InstallFailed,
    /// Upgrade failed; rollback or delete was attempted
    UpgradeFailed,
    /// Orphaned release could not be removed
    UninstallFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ChartPullFailed => "ChartPullFailed",
            FailureReason::InstallFailed => "InstallFailed",
            FailureReason::UpgradeFailed => "UpgradeFailed",
            FailureReason::UninstallFailed => "UninstallFailed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate deploy status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default)]
    pub manifests: ManifestsStatus,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartStatus>,
}

impl Status {
    /// Decode a status from its persisted JSON form
    pub fn from_json(data: &str) -> Result<Self> {
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(data)?)
    }

    /// Encode the status for persistence
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Find the status of a release
    pub fn chart(&self, key: &ReleaseKey) -> Option<&ChartStatus> {
        self.charts.iter().find(|c| c.key() == *key)
    }

    /// Recompute the aggregate phase from the manifests and chart statuses
    ///
    /// Manifests failure wins over chart failures; success requires every
    /// declared chart to be present and successful.
    pub fn update_phase(&mut self, declared_charts: usize) {
        if self.manifests.phase == Phase::Failed {
            self.phase = Phase::Failed;
            self.reason = self.manifests.reason.clone();
            self.message = format!("manifests: {}", self.manifests.message);
            return;
        }

        if let Some(failed) = self.charts.iter().find(|c| c.phase == Phase::Failed) {
            self.phase = Phase::Failed;
            self.reason = failed.reason.clone();
            self.message = format!("chart {}: {}", failed.key(), failed.message);
            return;
        }

        self.reason.clear();
        self.message.clear();

        let charts_converged = self.charts.len() == declared_charts
            && self.charts.iter().all(|c| c.phase == Phase::Success);
        self.phase = if self.manifests.phase == Phase::Success && charts_converged {
            Phase::Success
        } else {
            Phase::Pending
        };
    }
}

/// Status of the raw and templated manifests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestsStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Compressed text of the manifests applied by the last successful pass
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_applied_manifests: String,
}

impl ManifestsStatus {
    pub fn succeed(&mut self) {
        self.phase = Phase::Success;
        self.reason.clear();
        self.message.clear();
    }

    /// Record a failure; `last_applied_manifests` is left untouched
    pub fn fail(&mut self, reason: FailureReason, message: impl Into<String>) {
        self.phase = Phase::Failed;
        self.reason = reason.to_string();
        self.message = message.into();
    }
}

/// Status of a single chart release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartStatus {
    pub name: String,

    pub namespace: String,

    #[serde(default)]
    pub phase: Phase,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Hash of the chart spec that was last installed or upgraded successfully
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_applied_chart_config_hash: String,
}

impl ChartStatus {
    /// A pending status for a release that has never been reconciled
    pub fn pending(key: &ReleaseKey) -> Self {
        Self {
            name: key.name.clone(),
            namespace: key.namespace.clone(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ReleaseKey {
        ReleaseKey::new(&self.name, &self.namespace)
    }

    pub fn succeed(&mut self, config_hash: impl Into<String>) {
        self.phase = Phase::Success;
        self.reason.clear();
        self.message.clear();
        self.last_applied_chart_config_hash = config_hash.into();
    }

    pub fn fail(&mut self, reason: FailureReason, message: impl Into<String>) {
        self.phase = Phase::Failed;
        self.reason = reason.to_string();
        self.message = message.into();
    }
}
