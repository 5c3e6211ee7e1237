//! Apply ordering for manifest objects

/// Built-in API groups; anything else is served by a CRD
const BUILTIN_GROUPS: &[&str] = &[
    "",
    "apps",
    "batch",
    "autoscaling",
    "policy",
    "networking.k8s.io",
    "rbac.authorization.k8s.io",
    "storage.k8s.io",
    "admissionregistration.k8s.io",
    "apiextensions.k8s.io",
    "apiregistration.k8s.io",
    "certificates.k8s.io",
    "coordination.k8s.io",
    "discovery.k8s.io",
    "events.k8s.io",
    "flowcontrol.apiserver.k8s.io",
    "node.k8s.io",
    "scheduling.k8s.io",
];

/// Resource category, applied from lowest to highest
///
/// CRDs and namespaces land before anything that depends on them; custom
/// resources go last so their definitions are already served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceCategory {
    Crd = 0,
    Namespace = 1,
    /// ResourceQuota, LimitRange
    NamespaceConfig = 2,
    /// ClusterRole, ClusterRoleBinding
    ClusterRbac = 10,
    /// Role, RoleBinding, ServiceAccount
    NamespacedRbac = 11,
    /// ConfigMap, Secret
    Config = 20,
    /// PersistentVolume, PersistentVolumeClaim, StorageClass
    Storage = 21,
    /// NetworkPolicy, Service, Ingress
    Network = 30,
    Workload = 40,
    /// Job, CronJob
    Batch = 50,
    Autoscaling = 60,
    CustomResource = 70,
    Other = 100,
}

impl ResourceCategory {
    pub fn from_resource(kind: &str, api_version: &str) -> Self {
        match kind {
            "CustomResourceDefinition" => Self::Crd,
            "Namespace" => Self::Namespace,
            "ResourceQuota" | "LimitRange" => Self::NamespaceConfig,
            "ClusterRole" | "ClusterRoleBinding" => Self::ClusterRbac,
            "Role" | "RoleBinding" | "ServiceAccount" => Self::NamespacedRbac,
            "ConfigMap" | "Secret" => Self::Config,
            "PersistentVolume" | "PersistentVolumeClaim" | "StorageClass" => Self::Storage,
            "NetworkPolicy" | "Service" | "Endpoints" | "Ingress" | "IngressClass" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Pod" => Self::Workload,
            "Job" | "CronJob" => Self::Batch,
            "HorizontalPodAutoscaler" | "PodDisruptionBudget" => Self::Autoscaling,
            _ if is_custom_api_version(api_version) => Self::CustomResource,
            _ => Self::Other,
        }
    }

    pub fn is_crd(self) -> bool {
        self == Self::Crd
    }
}

/// `apps/v1` is built in, `example.com/v1` is not; a bare `v1` is the core group
fn is_custom_api_version(api_version: &str) -> bool {
    let group = api_version
        .split_once('/')
        .map(|(group, _)| group)
        .unwrap_or("");
    !BUILTIN_GROUPS.contains(&group)
}
