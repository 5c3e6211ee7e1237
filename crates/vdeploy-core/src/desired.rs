//! Declared deploy state: raw manifests, a manifests template and Helm charts

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Timeout applied to a chart operation when none is declared or it fails to parse
pub const DEFAULT_CHART_TIMEOUT: Duration = Duration::from_secs(180);

/// Namespace used for releases that do not declare one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Everything that should be deployed into the virtual cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    /// Raw multi-document manifest text
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manifests: String,

    /// Manifest text rendered through the template engine before applying
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manifests_template: String,

    /// Helm charts, reconciled in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartSpec>,
}

impl DesiredState {
    /// True when nothing at all is declared
    pub fn is_empty(&self) -> bool {
        self.manifests.trim().is_empty()
            && self.manifests_template.trim().is_empty()
            && self.charts.is_empty()
    }

    /// Reject configurations that declare the same release identity twice
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.charts.len());
        for chart in &self.charts {
            if chart.chart.name.is_empty() {
                return Err(CoreError::MissingField {
                    field: "charts[].chart.name".to_string(),
                });
            }

            let key = chart.release_key();
            if !seen.insert(key.clone()) {
                return Err(CoreError::DuplicateRelease {
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A single Helm chart release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    /// Where to get the chart from
    pub chart: ChartRef,

    /// Release name and namespace (both optional)
    #[serde(default)]
    pub release: ReleaseRef,

    /// Values YAML passed to helm
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub values: String,

    /// Base64 encoded chart archive, used instead of pulling
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bundle: String,

    /// Operation timeout, e.g. `180s` or `5m`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timeout: String,
}

impl ChartSpec {
    /// Identity of the release this chart deploys
    pub fn release_key(&self) -> ReleaseKey {
        let name = if self.release.name.is_empty() {
            &self.chart.name
        } else {
            &self.release.name
        };
        let namespace = if self.release.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.release.namespace
        };
        ReleaseKey::new(name, namespace)
    }

    /// Parsed operation timeout, falling back to [`DEFAULT_CHART_TIMEOUT`]
    pub fn timeout(&self) -> Duration {
        parse_timeout(&self.timeout).unwrap_or(DEFAULT_CHART_TIMEOUT)
    }

    /// Whether the chart archive ships inline
    pub fn has_bundle(&self) -> bool {
        !self.bundle.is_empty()
    }
}

/// Chart coordinates and repository credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// Skip TLS verification against the repository
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
}

impl ChartRef {
    /// Whether the repository is an OCI registry
    pub fn is_oci(&self) -> bool {
        self.repo.starts_with("oci://")
    }

    /// Archive file name helm produces for this chart
    pub fn archive_file_name(&self) -> String {
        if self.version.is_empty() {
            format!("{}.tgz", self.name)
        } else {
            format!("{}-{}.tgz", self.name, self.version)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

/// Release identity: at most one chart status exists per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseKey {
    pub name: String,
    pub namespace: String,
}

impl ReleaseKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Parse a duration such as `180s`, `5m` or `1h30m`
///
/// Returns `None` for empty or malformed input.
pub fn parse_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    humantime::parse_duration(value).ok()
}
