//! Cluster access
//!
//! [`ClusterClient`] covers everything the reconcilers need from the
//! Kubernetes API: server-side apply of manifests, deletion of single
//! objects, and the ConfigMap that carries the status annotation.

mod order;
mod resources;

pub use order::ResourceCategory;
pub use resources::{FIELD_MANAGER, KubeCluster};

use async_trait::async_trait;
use std::collections::BTreeMap;
use vdeploy_core::ObjectKey;

use crate::error::Result;

/// The object holding the persisted status annotation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    pub name: String,
    pub namespace: String,
    pub annotations: BTreeMap<String, String>,
    /// Version the record was read at; patches are rejected when it is stale
    pub resource_version: Option<String>,
}

impl StatusRecord {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }
}

/// Operations the reconcilers need from the API server
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch the status record, `None` when it does not exist
    async fn get_record(&self, namespace: &str, name: &str) -> Result<Option<StatusRecord>>;

    /// Create the status record
    async fn create_record(&self, record: &StatusRecord) -> Result<StatusRecord>;

    /// Merge the given annotations into the record
    ///
    /// The patch carries the record's resource version, so a concurrent
    /// writer surfaces as a conflict instead of being overwritten.
    async fn patch_record(
        &self,
        record: &StatusRecord,
        annotations: &BTreeMap<String, String>,
    ) -> Result<StatusRecord>;

    /// Server-side apply every object in a multi-document manifest
    async fn apply(&self, manifests: &str) -> Result<()>;

    /// Delete a single object; a missing object yields a not-found error
    async fn delete(&self, key: &ObjectKey) -> Result<()>;
}
