//! Deploy configuration file
//!
//! ```yaml
//! release:
//!   name: my-vcluster
//!   namespace: vcluster-my-vcluster
//! values:
//!   tier: gold
//! deploy:
//!   manifests: |
//!     apiVersion: v1
//!     kind: Namespace
//!     metadata:
//!       name: team-a
//!   charts:
//!     - chart: { name: nginx, repo: https://charts.example.com, version: 1.0.0 }
//! helm:
//!   binary: /usr/local/bin/helm
//! driver:
//!   resyncInterval: 5m
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vdeploy_core::{DesiredState, ReleaseContext};
use vdeploy_kube::{
    DEFAULT_STATUS_ANNOTATION, DEFAULT_STATUS_NAME, DEFAULT_STATUS_NAMESPACE, DeployerConfig,
    DriverConfig, HelmConfig, StatusStoreConfig,
};

use crate::error::{CliError, Result};

/// Top-level configuration document
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeployConfig {
    #[serde(default)]
    pub release: ReleaseSection,

    /// Values exposed to the manifests template
    #[serde(default)]
    pub values: serde_json::Value,

    #[serde(default)]
    pub deploy: DesiredState,

    #[serde(default)]
    pub helm: HelmSection,

    #[serde(default)]
    pub status: StatusSection,

    #[serde(default)]
    pub driver: DriverSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSection {
    pub name: String,
    pub namespace: String,
}

impl Default for ReleaseSection {
    fn default() -> Self {
        let context = ReleaseContext::default();
        Self {
            name: context.release.name,
            namespace: context.release.namespace,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmSection {
    #[serde(default = "default_helm_binary")]
    pub binary: PathBuf,

    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

impl Default for HelmSection {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
            work_dir: default_work_dir(),
            kubeconfig: None,
        }
    }
}

fn default_helm_binary() -> PathBuf {
    PathBuf::from("helm")
}

/// `<cache dir>/vdeploy/charts`, or a relative directory when no cache dir exists
pub fn default_work_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vdeploy")
        .join("charts")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSection {
    #[serde(default = "default_status_name")]
    pub name: String,

    #[serde(default = "default_status_namespace")]
    pub namespace: String,

    #[serde(default = "default_status_annotation")]
    pub annotation: String,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            name: default_status_name(),
            namespace: default_status_namespace(),
            annotation: default_status_annotation(),
        }
    }
}

fn default_status_name() -> String {
    DEFAULT_STATUS_NAME.to_string()
}

fn default_status_namespace() -> String {
    DEFAULT_STATUS_NAMESPACE.to_string()
}

fn default_status_annotation() -> String {
    DEFAULT_STATUS_ANNOTATION.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverSection {
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    #[serde(default, with = "humantime_serde")]
    pub resync_interval: Option<Duration>,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            resync_interval: None,
        }
    }
}

fn default_initial_delay() -> Duration {
    DriverConfig::default().initial_delay
}

fn default_max_delay() -> Duration {
    DriverConfig::default().max_delay
}

impl DeployConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::config_with_help(
                format!("cannot read {}: {}", path.display(), e),
                "pass an existing file with --config",
            )
        })?;
        Self::from_yaml(&content)
            .map_err(|e| CliError::config(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate a configuration document
    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.release.name.is_empty() || self.release.namespace.is_empty() {
            return Err("release.name and release.namespace must not be empty".to_string());
        }
        if !self.values.is_null() && !self.values.is_object() {
            return Err("values must be a mapping".to_string());
        }
        if self.driver.initial_delay.is_zero() {
            return Err("driver.initialDelay must be greater than zero".to_string());
        }
        if self.driver.max_delay < self.driver.initial_delay {
            return Err("driver.maxDelay must not be shorter than driver.initialDelay".to_string());
        }
        self.deploy.validate().map_err(|e| e.to_string())
    }

    /// Template context for the manifests template
    pub fn context(&self) -> ReleaseContext {
        let context = ReleaseContext::new(&self.release.name, &self.release.namespace);
        if self.values.is_null() {
            context
        } else {
            context.with_values(self.values.clone())
        }
    }

    pub fn helm_config(&self) -> HelmConfig {
        HelmConfig {
            binary: self.helm.binary.clone(),
            kubeconfig: self.helm.kubeconfig.clone(),
        }
    }

    pub fn deployer_config(&self) -> DeployerConfig {
        DeployerConfig {
            work_dir: self.helm.work_dir.clone(),
            status: self.status.store_config(),
            context: self.context(),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            initial_delay: self.driver.initial_delay,
            max_delay: self.driver.max_delay,
            resync_interval: self.driver.resync_interval,
        }
    }
}

impl StatusSection {
    pub fn store_config(&self) -> StatusStoreConfig {
        StatusStoreConfig {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            annotation: self.annotation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
release:
  name: my-vcluster
  namespace: vcluster-my-vcluster
values:
  tier: gold
deploy:
  manifests: |
    apiVersion: v1
    kind: Namespace
    metadata:
      name: team-a
  manifestsTemplate: |
    apiVersion: v1
    kind: ConfigMap
    metadata:
      name: {{ release.name }}-info
  charts:
    - chart:
        name: nginx
        repo: https://charts.example.com
        version: 1.0.0
      release:
        namespace: web
      timeout: 5m
helm:
  binary: /opt/helm/bin/helm
  workDir: /var/cache/charts
  kubeconfig: /etc/vcluster/kubeconfig
status:
  name: deploy-status
driver:
  initialDelay: 500ms
  maxDelay: 2m
  resyncInterval: 10m
"#;

    #[test]
    fn test_full_config() {
        let config = DeployConfig::from_yaml(FULL).unwrap();

        assert_eq!(config.release.name, "my-vcluster");
        assert_eq!(config.deploy.charts.len(), 1);
        assert_eq!(config.deploy.charts[0].release_key().to_string(), "web/nginx");
        assert_eq!(config.deploy.charts[0].timeout(), Duration::from_secs(300));

        let helm = config.helm_config();
        assert_eq!(helm.binary, PathBuf::from("/opt/helm/bin/helm"));
        assert_eq!(helm.kubeconfig, Some(PathBuf::from("/etc/vcluster/kubeconfig")));

        let deployer = config.deployer_config();
        assert_eq!(deployer.work_dir, PathBuf::from("/var/cache/charts"));
        assert_eq!(deployer.status.name, "deploy-status");
        assert_eq!(deployer.status.namespace, DEFAULT_STATUS_NAMESPACE);
        assert_eq!(deployer.status.annotation, DEFAULT_STATUS_ANNOTATION);
        assert_eq!(deployer.context.values["tier"], "gold");

        let driver = config.driver_config();
        assert_eq!(driver.initial_delay, Duration::from_millis(500));
        assert_eq!(driver.max_delay, Duration::from_secs(120));
        assert_eq!(driver.resync_interval, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_defaults() {
        let config = DeployConfig::from_yaml("deploy: {}\n").unwrap();

        assert!(config.deploy.is_empty());
        assert_eq!(config.helm.binary, PathBuf::from("helm"));
        assert!(config.helm.work_dir.ends_with("vdeploy/charts"));
        assert_eq!(config.status.name, DEFAULT_STATUS_NAME);
        assert_eq!(config.driver_config(), DriverConfig::default());
        assert!(config.context().values.is_object());
    }

    #[test]
    fn test_duplicate_release_rejected() {
        let yaml = r#"
deploy:
  charts:
    - chart: { name: nginx }
    - chart: { name: nginx }
      release: { namespace: default }
"#;
        let err = DeployConfig::from_yaml(yaml).unwrap_err();
        assert!(err.contains("default/nginx"), "{}", err);
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        let err = DeployConfig::from_yaml("charts: []\n").unwrap_err();
        assert!(err.contains("charts"), "{}", err);
    }

    #[test]
    fn test_invalid_durations_rejected() {
        assert!(DeployConfig::from_yaml("driver: { initialDelay: soon }\n").is_err());
        assert!(
            DeployConfig::from_yaml("driver: { initialDelay: 10s, maxDelay: 1s }\n").is_err()
        );
    }

    #[test]
    fn test_values_must_be_mapping() {
        let err = DeployConfig::from_yaml("values: [1, 2]\n").unwrap_err();
        assert!(err.contains("mapping"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = DeployConfig::load(Path::new("/nonexistent/vdeploy.yaml")).unwrap_err();
        assert!(matches!(err, CliError::Config { help: Some(_), .. }));
    }
}
