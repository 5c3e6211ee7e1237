//! Kubernetes API backed [`ClusterClient`]
//!
//! Manifests are applied with Server-Side Apply through dynamic objects, so
//! any kind the API server serves can be deployed without compile-time type
//! knowledge. Discovery runs on every apply and again after CRDs land, so
//! custom resources defined in the same manifest resolve on the same pass.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams, PropagationPolicy},
    config::{KubeConfigOptions, Kubeconfig},
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vdeploy_core::{DEFAULT_NAMESPACE, ObjectKey, ParsedManifest};

use super::{ClusterClient, ResourceCategory, StatusRecord};
use crate::error::{KubeError, Result};

/// Field manager name for Server-Side Apply
pub const FIELD_MANAGER: &str = "vcluster-deploy";

const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Outcome of applying a batch of objects
#[derive(Debug, Default)]
struct ApplySummary {
    succeeded: Vec<String>,
    failed: Vec<(String, String)>,
}

impl ApplySummary {
    fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn failures(&self) -> String {
        self.failed
            .iter()
            .map(|(name, err)| format!("{}: {}", name, err))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Cluster client talking to a live API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    /// Last discovery result, reused by deletes between applies
    discovery: Arc<Mutex<Option<Arc<Discovery>>>>,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            discovery: Arc::new(Mutex::new(None)),
        }
    }

    /// Connect using an explicit kubeconfig, or the inferred configuration
    /// (in-cluster service account, `KUBECONFIG`, `~/.kube/config`)
    pub async fn connect(kubeconfig: Option<&Path>) -> Result<Self> {
        let client = match kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    KubeError::InvalidConfig(format!(
                        "failed to read kubeconfig {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .map_err(|e| KubeError::InvalidConfig(e.to_string()))?;
                Client::try_from(config)?
            }
            None => Client::try_default().await?,
        };
        Ok(Self::new(client))
    }

    async fn refresh_discovery(&self) -> Result<Arc<Discovery>> {
        let discovery = Arc::new(Discovery::new(self.client.clone()).run().await?);
        *self.discovery.lock().await = Some(Arc::clone(&discovery));
        Ok(discovery)
    }

    async fn cached_discovery(&self) -> Result<Arc<Discovery>> {
        let cached = self.discovery.lock().await.clone();
        match cached {
            Some(discovery) => Ok(discovery),
            None => self.refresh_discovery().await,
        }
    }

    /// Resolve a kind, refreshing discovery once when the cache misses it
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<Option<(ApiResource, ApiCapabilities)>> {
        if let Some(found) = self.cached_discovery().await?.resolve_gvk(gvk) {
            return Ok(Some(found));
        }
        Ok(self.refresh_discovery().await?.resolve_gvk(gvk))
    }

    fn configmaps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn apply_objects(
        &self,
        discovery: &Discovery,
        objects: Vec<DynamicObject>,
        summary: &mut ApplySummary,
    ) {
        for obj in objects {
            let name = display_name(&obj);
            match self.apply_object(discovery, obj).await {
                Ok(()) => {
                    debug!(object = %name, "applied");
                    summary.succeeded.push(name);
                }
                Err(e) => {
                    warn!(object = %name, error = %e, "apply failed");
                    summary.failed.push((name, e.to_string()));
                }
            }
        }
    }

    async fn apply_object(&self, discovery: &Discovery, mut obj: DynamicObject) -> Result<()> {
        let types = obj.types.as_ref().ok_or_else(|| {
            KubeError::InvalidManifest("resource missing apiVersion or kind".to_string())
        })?;
        let gvk = gvk_from_type_meta(types);
        let (api_resource, capabilities) = discovery.resolve_gvk(&gvk).ok_or_else(|| {
            KubeError::Apply(format!(
                "unknown resource type {}/{}",
                types.api_version, types.kind
            ))
        })?;
        let name = obj.metadata.name.clone().ok_or_else(|| {
            KubeError::InvalidManifest("resource missing metadata.name".to_string())
        })?;

        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
            let namespace = obj
                .metadata
                .namespace
                .get_or_insert_with(|| DEFAULT_NAMESPACE.to_string())
                .clone();
            Api::namespaced_with(self.client.clone(), &namespace, &api_resource)
        } else {
            obj.metadata.namespace = None;
            Api::all_with(self.client.clone(), &api_resource)
        };

        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;
        api.patch(&name, &params, &Patch::Apply(&obj)).await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn get_record(&self, namespace: &str, name: &str) -> Result<Option<StatusRecord>> {
        let configmap = self.configmaps(namespace).get_opt(name).await?;
        Ok(configmap.map(record_from_configmap))
    }

    async fn create_record(&self, record: &StatusRecord) -> Result<StatusRecord> {
        let configmap = ConfigMap {
            metadata: ObjectMeta {
                name: Some(record.name.clone()),
                namespace: Some(record.namespace.clone()),
                annotations: Some(record.annotations.clone()),
                labels: Some(BTreeMap::from([(
                    MANAGED_BY_LABEL.to_string(),
                    FIELD_MANAGER.to_string(),
                )])),
                ..Default::default()
            },
            ..Default::default()
        };
        let created = self
            .configmaps(&record.namespace)
            .create(&PostParams::default(), &configmap)
            .await?;
        info!(namespace = %record.namespace, name = %record.name, "created status record");
        Ok(record_from_configmap(created))
    }

    async fn patch_record(
        &self,
        record: &StatusRecord,
        annotations: &BTreeMap<String, String>,
    ) -> Result<StatusRecord> {
        let patched = self
            .configmaps(&record.namespace)
            .patch(
                &record.name,
                &PatchParams::default(),
                &Patch::Merge(&annotation_patch(record, annotations)),
            )
            .await?;
        Ok(record_from_configmap(patched))
    }

    async fn apply(&self, manifests: &str) -> Result<()> {
        let parsed = ParsedManifest::parse(manifests).into_result()?;
        if parsed.is_empty() {
            return Ok(());
        }

        let mut objects = parsed
            .into_iter()
            .map(|o| serde_yaml::from_value::<DynamicObject>(o.value))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        objects.sort_by_key(category);
        let (crds, rest): (Vec<_>, Vec<_>) =
            objects.into_iter().partition(|o| category(o).is_crd());

        let mut summary = ApplySummary::default();
        let mut discovery = self.refresh_discovery().await?;
        if !crds.is_empty() {
            self.apply_objects(&discovery, crds, &mut summary).await;
            discovery = self.refresh_discovery().await?;
        }
        self.apply_objects(&discovery, rest, &mut summary).await;

        if summary.is_success() {
            info!(objects = summary.succeeded.len(), "applied manifests");
            Ok(())
        } else {
            Err(KubeError::Apply(summary.failures()))
        }
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let gvk = gvk_from_type_meta(&TypeMeta {
            api_version: key.api_version.clone(),
            kind: key.kind.clone(),
        });
        // A kind the server no longer serves has no objects left to delete
        let Some((api_resource, capabilities)) = self.resolve(&gvk).await? else {
            return Err(KubeError::NotFound {
                resource: key.to_string(),
            });
        };

        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
            Api::namespaced_with(self.client.clone(), &key.namespace, &api_resource)
        } else {
            Api::all_with(self.client.clone(), &api_resource)
        };
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };

        match api.delete(&key.name, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Err(KubeError::NotFound {
                resource: key.to_string(),
            }),
            Err(e) => Err(KubeError::Api(e)),
        }
    }
}

fn record_from_configmap(configmap: ConfigMap) -> StatusRecord {
    let metadata = configmap.metadata;
    StatusRecord {
        name: metadata.name.unwrap_or_default(),
        namespace: metadata.namespace.unwrap_or_default(),
        annotations: metadata.annotations.unwrap_or_default(),
        resource_version: metadata.resource_version,
    }
}

/// Merge patch body carrying the read version for optimistic concurrency
fn annotation_patch(
    record: &StatusRecord,
    annotations: &BTreeMap<String, String>,
) -> serde_json::Value {
    let mut metadata = serde_json::Map::new();
    metadata.insert("annotations".to_string(), serde_json::json!(annotations));
    if let Some(version) = &record.resource_version {
        metadata.insert("resourceVersion".to_string(), serde_json::json!(version));
    }
    serde_json::json!({ "metadata": metadata })
}

fn category(obj: &DynamicObject) -> ResourceCategory {
    match &obj.types {
        Some(types) => ResourceCategory::from_resource(&types.kind, &types.api_version),
        None => ResourceCategory::Other,
    }
}

fn display_name(obj: &DynamicObject) -> String {
    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("Unknown");
    let name = obj.metadata.name.as_deref().unwrap_or("unnamed");
    match &obj.metadata.namespace {
        Some(ns) => format!("{}/{}/{}", ns, kind, name),
        None => format!("{}/{}", kind, name),
    }
}

/// Split `apps/v1` into group and version; a bare `v1` is the core group
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}
