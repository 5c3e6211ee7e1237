//! Helm integration
//!
//! The reconcilers talk to Helm through the [`HelmClient`] trait so that the
//! production implementation ([`HelmCli`], which shells out to the `helm`
//! binary) can be swapped for [`crate::mock::MockHelm`] in tests.
//!
//! Implementations are not responsible for enforcing per-chart timeouts or
//! cancellation: callers bound every call and drop the future when the
//! deadline passes.

mod cli;

pub use cli::{HelmCli, HelmConfig};

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use vdeploy_core::ChartSpec;

use crate::error::Result;

/// Helm status marking a release whose first install never completed
pub const STATUS_PENDING_INSTALL: &str = "pending-install";

/// Options shared by install, upgrade and pull
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelmOptions {
    /// Chart name
    pub chart: String,
    /// Local chart archive; takes precedence over repo/version when set
    pub path: Option<PathBuf>,
    /// Chart repository URL (or `oci://` registry)
    pub repo: String,
    /// Chart version
    pub version: String,
    /// Repository credentials
    pub username: String,
    pub password: String,
    /// Skip TLS verification for the repository
    pub insecure: bool,
    /// Raw YAML values passed with `--values`
    pub values: String,
    /// Create the release namespace when missing
    pub create_namespace: bool,
    /// Directory for downloaded archives and temporary values files
    pub work_dir: PathBuf,
    /// Timeout forwarded to helm's `--timeout`
    pub timeout: Option<Duration>,
}

impl HelmOptions {
    /// Options for a declared chart
    pub fn for_chart(spec: &ChartSpec, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            chart: spec.chart.name.clone(),
            path: None,
            repo: spec.chart.repo.clone(),
            version: spec.chart.version.clone(),
            username: spec.chart.username.clone(),
            password: spec.chart.password.clone(),
            insecure: spec.chart.insecure,
            values: spec.values.clone(),
            create_namespace: true,
            work_dir: work_dir.into(),
            timeout: Some(spec.timeout()),
        }
    }

    /// Install from a local archive instead of the repository
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_oci(&self) -> bool {
        self.repo.starts_with("oci://")
    }
}

/// Operations the reconcilers need from Helm
#[async_trait]
pub trait HelmClient: Send + Sync {
    /// Install a new release
    async fn install(&self, name: &str, namespace: &str, options: &HelmOptions) -> Result<()>;

    /// Upgrade an existing release
    async fn upgrade(&self, name: &str, namespace: &str, options: &HelmOptions) -> Result<()>;

    /// Delete a release; a release that does not exist is not an error
    async fn delete(&self, name: &str, namespace: &str) -> Result<()>;

    /// Whether the release exists
    async fn exists(&self, name: &str, namespace: &str) -> Result<bool>;

    /// Download a chart archive into `options.work_dir`
    async fn pull(&self, name: &str, options: &HelmOptions) -> Result<()>;

    /// Raw `helm status` output
    async fn status(&self, name: &str, namespace: &str) -> Result<Vec<u8>>;

    /// Roll the release back to its previous revision
    async fn rollback(&self, name: &str, namespace: &str) -> Result<()>;
}

/// Whether `helm status` output reports a pending first install
pub fn is_pending_install(status_output: &[u8]) -> bool {
    String::from_utf8_lossy(status_output).contains(STATUS_PENDING_INSTALL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdeploy_core::{ChartRef, ReleaseRef};

    #[test]
    fn test_options_for_chart() {
        let spec = ChartSpec {
            chart: ChartRef {
                name: "nginx".to_string(),
                repo: "https://charts.example.com".to_string(),
                version: "1.2.3".to_string(),
                insecure: true,
                ..Default::default()
            },
            release: ReleaseRef {
                name: "web".to_string(),
                namespace: "apps".to_string(),
            },
            values: "replicas: 2\n".to_string(),
            timeout: "30s".to_string(),
            ..Default::default()
        };

        let opts = HelmOptions::for_chart(&spec, "/tmp/cache").with_path("/tmp/cache/nginx.tgz");
        assert_eq!(opts.chart, "nginx");
        assert_eq!(opts.values, "replicas: 2\n");
        assert!(opts.create_namespace);
        assert!(opts.insecure);
        assert_eq!(opts.timeout, Some(Duration::from_secs(30)));
        assert_eq!(opts.path, Some(PathBuf::from("/tmp/cache/nginx.tgz")));
        assert!(!opts.is_oci());
    }

    #[test]
    fn test_is_pending_install() {
        let output = b"NAME: web\nNAMESPACE: apps\nSTATUS: pending-install\nREVISION: 1\n";
        assert!(is_pending_install(output));
        assert!(!is_pending_install(b"STATUS: failed\n"));
    }
}
