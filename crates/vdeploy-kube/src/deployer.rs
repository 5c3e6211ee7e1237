//! A single reconciliation pass
//!
//! [`Deployer::apply`] loads the persisted status, converges manifests and
//! then charts, recomputes the aggregate phase, and writes the status back.
//! The write happens whether or not reconciliation failed.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vdeploy_core::{DesiredState, Phase, ReleaseContext, Status};
use vdeploy_engine::{Engine, TemplateEngine};

use crate::cache::ChartCache;
use crate::charts::ChartReconciler;
use crate::cluster::ClusterClient;
use crate::error::Result;
use crate::helm::HelmClient;
use crate::manifests::ManifestReconciler;
use crate::store::{StatusStore, StatusStoreConfig};

/// Settings for a [`Deployer`]
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    /// Chart archive cache and helm scratch space
    pub work_dir: PathBuf,
    pub status: StatusStoreConfig,
    /// Context the manifests template renders against
    pub context: ReleaseContext,
}

/// Runs reconciliation passes against one cluster
pub struct Deployer<H, C, E = Engine> {
    store: StatusStore<C>,
    manifests: ManifestReconciler<C, E>,
    charts: ChartReconciler<H>,
}

impl<H, C> Deployer<H, C, Engine>
where
    H: HelmClient,
    C: ClusterClient + Clone,
{
    /// Deployer rendering templates with the default engine
    pub fn new(helm: H, cluster: C, config: DeployerConfig) -> Self {
        Self::with_engine(helm, cluster, Engine::default(), config)
    }
}

impl<H, C, E> Deployer<H, C, E>
where
    H: HelmClient,
    C: ClusterClient + Clone,
    E: TemplateEngine,
{
    pub fn with_engine(helm: H, cluster: C, engine: E, config: DeployerConfig) -> Self {
        Self {
            store: StatusStore::new(cluster.clone(), config.status),
            manifests: ManifestReconciler::new(cluster, engine, config.context),
            charts: ChartReconciler::new(helm, ChartCache::new(config.work_dir)),
        }
    }

    /// Run one pass; returns whether another pass is needed
    ///
    /// With nothing declared and no status record, the pass is a no-op and
    /// no record gets created. A desired state declaring the same release
    /// twice is rejected before the cluster is touched.
    pub async fn apply(&self, desired: &DesiredState, cancel: &CancellationToken) -> Result<bool> {
        desired.validate()?;

        let loaded = if desired.is_empty() {
            match self.store.read().await? {
                Some(loaded) => loaded,
                None => {
                    debug!("nothing declared and no status recorded");
                    return Ok(false);
                }
            }
        } else {
            self.store.read_or_create().await?
        };

        let mut status = loaded.status.clone();
        let result = self.reconcile(desired, &mut status, cancel).await;
        status.update_phase(desired.charts.len());

        let written = self.store.write(&loaded, &status).await;
        match (result, written) {
            (Err(e), Err(write_err)) => {
                error!(error = %write_err, "failed to persist status after a failed pass");
                Err(e)
            }
            (Err(e), Ok(_)) => Err(e),
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(_)) => {
                let requeue = status.phase != Phase::Success;
                if !requeue {
                    info!(charts = status.charts.len(), "deploy converged");
                }
                Ok(requeue)
            }
        }
    }

    async fn reconcile(
        &self,
        desired: &DesiredState,
        status: &mut Status,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.manifests
            .reconcile(
                &desired.manifests,
                &desired.manifests_template,
                &mut status.manifests,
                cancel,
            )
            .await?;
        self.charts
            .reconcile(&desired.charts, &mut status.charts, cancel)
            .await
    }

    /// Status as currently persisted
    pub async fn status(&self) -> Result<Option<Status>> {
        Ok(self.store.read().await?.map(|loaded| loaded.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KubeError;
    use crate::mock::{MockCluster, MockHelm};
    use vdeploy_core::{ChartRef, ChartSpec};

    fn deployer(
        dir: &tempfile::TempDir,
        helm: &MockHelm,
        cluster: &MockCluster,
    ) -> Deployer<MockHelm, MockCluster> {
        Deployer::new(
            helm.clone(),
            cluster.clone(),
            DeployerConfig {
                work_dir: dir.path().to_path_buf(),
                status: StatusStoreConfig::default(),
                context: ReleaseContext::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_empty_desired_state_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (helm, cluster) = (MockHelm::new(), MockCluster::new());
        let deployer = deployer(&dir, &helm, &cluster);

        let requeue = deployer
            .apply(&DesiredState::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(!requeue);
        assert_eq!(cluster.operation_counts().record_creates, 0);
        assert!(deployer.status().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manifests_only_converges() {
        let dir = tempfile::tempdir().unwrap();
        let (helm, cluster) = (MockHelm::new(), MockCluster::new());
        let deployer = deployer(&dir, &helm, &cluster);
        let desired = DesiredState {
            manifests: "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: team-a\n".to_string(),
            ..Default::default()
        };

        let requeue = deployer
            .apply(&desired, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!requeue);
        let status = deployer.status().await.unwrap().unwrap();
        assert_eq!(status.phase, Phase::Success);
        assert_eq!(cluster.object_names("Namespace"), vec!["team-a"]);
    }

    #[tokio::test]
    async fn test_failure_still_writes_status() {
        let dir = tempfile::tempdir().unwrap();
        let (helm, cluster) = (MockHelm::new(), MockCluster::new());
        cluster.fail_apply("forbidden");
        let deployer = deployer(&dir, &helm, &cluster);
        let desired = DesiredState {
            manifests: "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: team-a\n".to_string(),
            ..Default::default()
        };

        deployer
            .apply(&desired, &CancellationToken::new())
            .await
            .unwrap_err();
        let status = deployer.status().await.unwrap().unwrap();
        assert_eq!(status.phase, Phase::Failed);
        assert_eq!(status.reason, "InstallFailed");
        assert!(status.message.starts_with("manifests: "));
    }

    #[tokio::test]
    async fn test_duplicate_releases_rejected_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let (helm, cluster) = (MockHelm::new(), MockCluster::new());
        let deployer = deployer(&dir, &helm, &cluster);
        let nginx = ChartSpec {
            chart: ChartRef {
                name: "nginx".to_string(),
                version: "1.0.0".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let desired = DesiredState {
            charts: vec![nginx.clone(), nginx],
            ..Default::default()
        };

        let err = deployer
            .apply(&desired, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::InvalidConfig(_)), "{:?}", err);
        assert!(err.to_string().contains("default/nginx"));

        assert_eq!(helm.operation_counts().mutations(), 0);
        assert_eq!(helm.operation_counts().pulls, 0);
        assert_eq!(cluster.operation_counts().record_gets, 0);
        assert_eq!(cluster.operation_counts().record_creates, 0);
        assert!(deployer.status().await.unwrap().is_none());
    }
}
