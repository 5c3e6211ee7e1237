//! Persisted deploy status
//!
//! The status lives as JSON in a single annotation on a ConfigMap. A pass
//! reads it once, works on a copy, and writes it back only when the encoded
//! form changed, so a converged system never touches the API server.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use vdeploy_core::Status;

use crate::cluster::{ClusterClient, StatusRecord};
use crate::error::{KubeError, Result};

/// Default name of the status ConfigMap
pub const DEFAULT_STATUS_NAME: &str = "vcluster-deploy";
/// Default namespace of the status ConfigMap
pub const DEFAULT_STATUS_NAMESPACE: &str = "kube-system";
/// Default annotation holding the status JSON
pub const DEFAULT_STATUS_ANNOTATION: &str = "vcluster.loft.sh/deploy-status";

/// Where the status is kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusStoreConfig {
    pub name: String,
    pub namespace: String,
    pub annotation: String,
}

impl Default for StatusStoreConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_STATUS_NAME.to_string(),
            namespace: DEFAULT_STATUS_NAMESPACE.to_string(),
            annotation: DEFAULT_STATUS_ANNOTATION.to_string(),
        }
    }
}

/// Status as read at the start of a pass
#[derive(Debug, Clone)]
pub struct LoadedStatus {
    pub record: StatusRecord,
    pub status: Status,
    /// Encoded form of `status` when read; writes compare against it
    snapshot: String,
}

impl LoadedStatus {
    /// Whether writing `status` would change the stored annotation
    pub fn is_changed(&self, status: &Status) -> Result<bool> {
        Ok(status.to_json()? != self.snapshot)
    }
}

/// Reads and writes the status annotation
#[derive(Debug, Clone)]
pub struct StatusStore<C> {
    client: C,
    config: StatusStoreConfig,
}

impl<C: ClusterClient> StatusStore<C> {
    pub fn new(client: C, config: StatusStoreConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &StatusStoreConfig {
        &self.config
    }

    /// Load the status, `None` when the record does not exist yet
    pub async fn read(&self) -> Result<Option<LoadedStatus>> {
        let record = self
            .client
            .get_record(&self.config.namespace, &self.config.name)
            .await?;
        Ok(record.map(|record| self.load(record)))
    }

    /// Load the status, creating an empty record first when missing
    pub async fn read_or_create(&self) -> Result<LoadedStatus> {
        if let Some(loaded) = self.read().await? {
            return Ok(loaded);
        }

        let record = StatusRecord::new(&self.config.name, &self.config.namespace);
        match self.client.create_record(&record).await {
            Ok(created) => Ok(self.load(created)),
            // Lost a creation race; the other writer's record is just as good
            Err(e) if e.is_conflict() => self.read().await?.ok_or_else(|| {
                KubeError::Storage(format!(
                    "status record {}/{} vanished after create conflict",
                    self.config.namespace, self.config.name
                ))
            }),
            Err(e) => Err(e),
        }
    }

    /// Persist `status` when it differs from what was read
    ///
    /// Returns whether a write happened.
    pub async fn write(&self, loaded: &LoadedStatus, status: &Status) -> Result<bool> {
        let encoded = status.to_json()?;
        if encoded == loaded.snapshot {
            debug!(
                namespace = %self.config.namespace,
                name = %self.config.name,
                "status unchanged, skipping write"
            );
            return Ok(false);
        }

        let annotations = BTreeMap::from([(self.config.annotation.clone(), encoded)]);
        self.client
            .patch_record(&loaded.record, &annotations)
            .await?;
        info!(
            namespace = %self.config.namespace,
            name = %self.config.name,
            phase = %status.phase,
            "status updated"
        );
        Ok(true)
    }

    fn load(&self, record: StatusRecord) -> LoadedStatus {
        let raw = record.annotation(&self.config.annotation).unwrap_or_default();
        let (status, snapshot) = match Status::from_json(raw) {
            Ok(status) => {
                let snapshot = status.to_json().unwrap_or_else(|_| raw.to_string());
                (status, snapshot)
            }
            Err(e) => {
                // Unreadable status: start over and make sure the next write replaces it
                warn!(
                    namespace = %self.config.namespace,
                    name = %self.config.name,
                    error = %e,
                    "discarding unreadable status"
                );
                (Status::default(), raw.to_string())
            }
        };
        LoadedStatus {
            record,
            status,
            snapshot,
        }
    }
}
