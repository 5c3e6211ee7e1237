//! vdeploy Kube - reconciliation of a virtual cluster's declared deploy
//!
//! This crate provides:
//! - **Deployer**: One reconciliation pass over manifests and charts, with diff-suppressed status writes
//! - **Driver**: The requeue loop with exponential backoff, resync and cancellation
//! - **Reconcilers**: Manifest apply/prune and Helm chart install/upgrade/remediation
//! - **Status Store**: The status annotation on a ConfigMap, read by external tooling
//! - **Seams**: `HelmClient` and `ClusterClient` traits with production and mock implementations

pub mod cache;
pub mod charts;
pub mod cluster;
pub mod deadline;
pub mod deployer;
pub mod driver;
pub mod error;
pub mod helm;
pub mod manifests;
pub mod mock;
pub mod store;

pub use cache::{ChartCache, verify_archive};
pub use charts::ChartReconciler;
pub use cluster::{ClusterClient, FIELD_MANAGER, KubeCluster, ResourceCategory, StatusRecord};
pub use deployer::{Deployer, DeployerConfig};
pub use driver::{Driver, DriverConfig, DriverOutcome};
pub use error::{KubeError, Result};
pub use helm::{HelmCli, HelmClient, HelmConfig, HelmOptions, is_pending_install};
pub use manifests::ManifestReconciler;
pub use mock::{MockCluster, MockHelm};
pub use store::{
    DEFAULT_STATUS_ANNOTATION, DEFAULT_STATUS_NAME, DEFAULT_STATUS_NAMESPACE, LoadedStatus,
    StatusStore, StatusStoreConfig,
};
