//! In-memory Helm and cluster doubles for testing
//!
//! Both mocks are cheap to clone and share their state, so a test can hand
//! one clone to a [`crate::Deployer`] and keep another for assertions.

use async_trait::async_trait;
use base64::Engine as _;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vdeploy_core::{ObjectKey, ParsedManifest, ReleaseKey};

use crate::cluster::{ClusterClient, StatusRecord};
use crate::error::{KubeError, Result};
use crate::helm::{HelmClient, HelmOptions};

/// Helm operations that can be counted, delayed or failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelmOp {
    Install,
    Upgrade,
    Delete,
    Exists,
    Pull,
    Status,
    Rollback,
}

impl HelmOp {
    fn command(self) -> &'static str {
        match self {
            HelmOp::Install => "helm install",
            HelmOp::Upgrade => "helm upgrade",
            HelmOp::Delete => "helm delete",
            HelmOp::Exists => "helm status",
            HelmOp::Pull => "helm pull",
            HelmOp::Status => "helm status",
            HelmOp::Rollback => "helm rollback",
        }
    }
}

/// A recorded helm call; the target is `namespace/name`, or the chart name for pulls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelmCall {
    pub op: HelmOp,
    pub target: String,
}

/// Counts of helm operations performed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HelmOperationCounts {
    pub installs: usize,
    pub upgrades: usize,
    pub deletes: usize,
    pub exists: usize,
    pub pulls: usize,
    pub statuses: usize,
    pub rollbacks: usize,
}

impl HelmOperationCounts {
    /// Operations that change a release
    pub fn mutations(&self) -> usize {
        self.installs + self.upgrades + self.deletes + self.rollbacks
    }

    fn record(&mut self, op: HelmOp) {
        match op {
            HelmOp::Install => self.installs += 1,
            HelmOp::Upgrade => self.upgrades += 1,
            HelmOp::Delete => self.deletes += 1,
            HelmOp::Exists => self.exists += 1,
            HelmOp::Pull => self.pulls += 1,
            HelmOp::Status => self.statuses += 1,
            HelmOp::Rollback => self.rollbacks += 1,
        }
    }
}

/// A release held by [`MockHelm`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRelease {
    pub revision: u32,
    pub values: String,
    pub chart: String,
}

#[derive(Default)]
struct HelmState {
    releases: BTreeMap<ReleaseKey, MockRelease>,
    calls: Vec<HelmCall>,
    counts: HelmOperationCounts,
    /// Failing targets per operation; `*` fails every target
    failures: HashMap<HelmOp, HashSet<String>>,
    delays: HashMap<HelmOp, Duration>,
    status_output: HashMap<ReleaseKey, String>,
    pull_writes_nothing: bool,
}

impl HelmState {
    fn should_fail(&self, op: HelmOp, target: &str, name: &str) -> bool {
        self.failures
            .get(&op)
            .is_some_and(|set| set.contains("*") || set.contains(target) || set.contains(name))
    }
}

/// In-memory [`HelmClient`]
#[derive(Clone, Default)]
pub struct MockHelm {
    state: Arc<Mutex<HelmState>>,
}

impl MockHelm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate an installed release
    pub fn with_release(self, name: &str, namespace: &str) -> Self {
        self.state.lock().unwrap().releases.insert(
            ReleaseKey::new(name, namespace),
            MockRelease {
                revision: 1,
                values: String::new(),
                chart: name.to_string(),
            },
        );
        self
    }

    /// Fail `op` for a release name, `namespace/name`, chart name, or `*`
    pub fn fail(&self, op: HelmOp, target: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .insert(target.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Make every call of `op` take this long
    pub fn delay(&self, op: HelmOp, duration: Duration) {
        self.state.lock().unwrap().delays.insert(op, duration);
    }

    /// Output returned by `status` for a release
    pub fn set_status(&self, name: &str, namespace: &str, output: &str) {
        self.state
            .lock()
            .unwrap()
            .status_output
            .insert(ReleaseKey::new(name, namespace), output.to_string());
    }

    /// Pulls succeed without leaving an archive behind
    pub fn pull_writes_nothing(&self) {
        self.state.lock().unwrap().pull_writes_nothing = true;
    }

    pub fn operation_counts(&self) -> HelmOperationCounts {
        self.state.lock().unwrap().counts.clone()
    }

    pub fn calls(&self) -> Vec<HelmCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn release(&self, name: &str, namespace: &str) -> Option<MockRelease> {
        self.state
            .lock()
            .unwrap()
            .releases
            .get(&ReleaseKey::new(name, namespace))
            .cloned()
    }

    pub fn release_keys(&self) -> Vec<ReleaseKey> {
        self.state.lock().unwrap().releases.keys().cloned().collect()
    }

    /// Record the call, apply any delay and injected failure
    async fn begin(&self, op: HelmOp, target: String, name: &str) -> Result<()> {
        let (delay, fail) = {
            let mut state = self.state.lock().unwrap();
            state.counts.record(op);
            state.calls.push(HelmCall {
                op,
                target: target.clone(),
            });
            (
                state.delays.get(&op).copied(),
                state.should_fail(op, &target, name),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(KubeError::Helm {
                command: op.command().to_string(),
                message: format!("injected failure for {}", target),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HelmClient for MockHelm {
    async fn install(&self, name: &str, namespace: &str, options: &HelmOptions) -> Result<()> {
        let key = ReleaseKey::new(name, namespace);
        self.begin(HelmOp::Install, key.to_string(), name).await?;
        let mut state = self.state.lock().unwrap();
        if state.releases.contains_key(&key) {
            return Err(KubeError::Helm {
                command: "helm install".to_string(),
                message: "cannot re-use a name that is still in use".to_string(),
            });
        }
        state.releases.insert(
            key,
            MockRelease {
                revision: 1,
                values: options.values.clone(),
                chart: options.chart.clone(),
            },
        );
        Ok(())
    }

    async fn upgrade(&self, name: &str, namespace: &str, options: &HelmOptions) -> Result<()> {
        let key = ReleaseKey::new(name, namespace);
        self.begin(HelmOp::Upgrade, key.to_string(), name).await?;
        let mut state = self.state.lock().unwrap();
        match state.releases.get_mut(&key) {
            Some(release) => {
                release.revision += 1;
                release.values = options.values.clone();
                release.chart = options.chart.clone();
                Ok(())
            }
            None => Err(KubeError::Helm {
                command: "helm upgrade".to_string(),
                message: format!("\"{}\" has no deployed releases", name),
            }),
        }
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<()> {
        let key = ReleaseKey::new(name, namespace);
        self.begin(HelmOp::Delete, key.to_string(), name).await?;
        let mut state = self.state.lock().unwrap();
        state.releases.remove(&key);
        state.status_output.remove(&key);
        Ok(())
    }

    async fn exists(&self, name: &str, namespace: &str) -> Result<bool> {
        let key = ReleaseKey::new(name, namespace);
        self.begin(HelmOp::Exists, key.to_string(), name).await?;
        Ok(self.state.lock().unwrap().releases.contains_key(&key))
    }

    async fn pull(&self, name: &str, options: &HelmOptions) -> Result<()> {
        self.begin(HelmOp::Pull, name.to_string(), name).await?;
        let writes_nothing = self.state.lock().unwrap().pull_writes_nothing;
        if writes_nothing {
            return Ok(());
        }
        let file = if options.version.is_empty() {
            format!("{}.tgz", name)
        } else {
            format!("{}-{}.tgz", name, options.version)
        };
        let data = chart_archive(name, &options.version);
        tokio::fs::write(options.work_dir.join(file), data).await?;
        Ok(())
    }

    async fn status(&self, name: &str, namespace: &str) -> Result<Vec<u8>> {
        let key = ReleaseKey::new(name, namespace);
        self.begin(HelmOp::Status, key.to_string(), name).await?;
        let state = self.state.lock().unwrap();
        if let Some(output) = state.status_output.get(&key) {
            return Ok(output.clone().into_bytes());
        }
        match state.releases.get(&key) {
            Some(release) => Ok(format!(
                "NAME: {}\nNAMESPACE: {}\nSTATUS: deployed\nREVISION: {}\n",
                name, namespace, release.revision
            )
            .into_bytes()),
            None => Err(KubeError::Helm {
                command: "helm status".to_string(),
                message: "Error: release: not found".to_string(),
            }),
        }
    }

    async fn rollback(&self, name: &str, namespace: &str) -> Result<()> {
        let key = ReleaseKey::new(name, namespace);
        self.begin(HelmOp::Rollback, key.to_string(), name).await?;
        let mut state = self.state.lock().unwrap();
        if let Some(release) = state.releases.get_mut(&key) {
            release.revision += 1;
        }
        Ok(())
    }
}

/// Minimal gzip tar holding a `Chart.yaml`
pub fn chart_archive(name: &str, version: &str) -> Vec<u8> {
    let chart_yaml = format!("apiVersion: v2\nname: {}\nversion: {}\n", name, version);
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut header = tar::Header::new_gnu();
    header.set_size(chart_yaml.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("{}/Chart.yaml", name), chart_yaml.as_bytes())
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

/// [`chart_archive`], base64 encoded as an inline bundle
pub fn chart_bundle(name: &str, version: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(chart_archive(name, version))
}

/// Counts of cluster operations performed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClusterOperationCounts {
    pub record_gets: usize,
    pub record_creates: usize,
    pub record_patches: usize,
    pub applies: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct ClusterState {
    records: BTreeMap<(String, String), StatusRecord>,
    objects: BTreeMap<ObjectKey, serde_yaml::Value>,
    counts: ClusterOperationCounts,
    next_version: u64,
    fail_apply: Option<String>,
    fail_delete: HashSet<String>,
}

impl ClusterState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// In-memory [`ClusterClient`]
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operation_counts(&self) -> ClusterOperationCounts {
        self.state.lock().unwrap().counts.clone()
    }

    /// Make every apply fail with this message
    pub fn fail_apply(&self, message: &str) {
        self.state.lock().unwrap().fail_apply = Some(message.to_string());
    }

    /// Make deletes of objects with this name fail
    pub fn fail_delete(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_delete
            .insert(name.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_apply = None;
        state.fail_delete.clear();
    }

    /// Keys of all objects currently in the cluster
    pub fn object_keys(&self) -> Vec<ObjectKey> {
        self.state.lock().unwrap().objects.keys().cloned().collect()
    }

    /// Names of objects of a kind
    pub fn object_names(&self, kind: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|k| k.kind == kind)
            .map(|k| k.name.clone())
            .collect()
    }

    pub fn object(&self, key: &ObjectKey) -> Option<serde_yaml::Value> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    /// Place an object directly, bypassing apply
    pub fn insert_object(&self, key: ObjectKey, value: serde_yaml::Value) {
        self.state.lock().unwrap().objects.insert(key, value);
    }

    pub fn record(&self, namespace: &str, name: &str) -> Option<StatusRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Store a record as-is, assigning a fresh resource version
    pub fn insert_record(&self, mut record: StatusRecord) {
        let mut state = self.state.lock().unwrap();
        record.resource_version = Some(state.bump_version());
        state
            .records
            .insert((record.namespace.clone(), record.name.clone()), record);
    }

    /// Simulate a concurrent writer touching the record
    pub fn touch_record(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump_version();
        if let Some(record) = state
            .records
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            record.resource_version = Some(version);
        }
    }
}

fn api_error(code: u16, reason: &str, message: String) -> KubeError {
    KubeError::Api(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn get_record(&self, namespace: &str, name: &str) -> Result<Option<StatusRecord>> {
        let mut state = self.state.lock().unwrap();
        state.counts.record_gets += 1;
        Ok(state
            .records
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create_record(&self, record: &StatusRecord) -> Result<StatusRecord> {
        let mut state = self.state.lock().unwrap();
        state.counts.record_creates += 1;
        let id = (record.namespace.clone(), record.name.clone());
        if state.records.contains_key(&id) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("configmaps \"{}\" already exists", record.name),
            ));
        }
        let mut created = record.clone();
        created.resource_version = Some(state.bump_version());
        state.records.insert(id, created.clone());
        Ok(created)
    }

    async fn patch_record(
        &self,
        record: &StatusRecord,
        annotations: &BTreeMap<String, String>,
    ) -> Result<StatusRecord> {
        let mut state = self.state.lock().unwrap();
        state.counts.record_patches += 1;
        let version = state.bump_version();
        let id = (record.namespace.clone(), record.name.clone());
        let Some(stored) = state.records.get_mut(&id) else {
            return Err(api_error(
                404,
                "NotFound",
                format!("configmaps \"{}\" not found", record.name),
            ));
        };
        if record.resource_version.is_some() && record.resource_version != stored.resource_version
        {
            return Err(api_error(
                409,
                "Conflict",
                "the object has been modified; please apply your changes to the latest version"
                    .to_string(),
            ));
        }
        stored
            .annotations
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        stored.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn apply(&self, manifests: &str) -> Result<()> {
        let objects = ParsedManifest::parse(manifests).into_result()?;
        let mut state = self.state.lock().unwrap();
        state.counts.applies += 1;
        if let Some(message) = &state.fail_apply {
            return Err(KubeError::Apply(message.clone()));
        }
        for object in objects {
            state.objects.insert(object.key, object.value);
        }
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.counts.deletes += 1;
        if state.fail_delete.contains(&key.name) {
            return Err(api_error(
                403,
                "Forbidden",
                format!("cannot delete {}", key),
            ));
        }
        match state.objects.remove(key) {
            Some(_) => Ok(()),
            None => Err(KubeError::NotFound {
                resource: key.to_string(),
            }),
        }
    }
}
