//! Error types for vdeploy-kube

use thiserror::Error;

/// Result type for vdeploy-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while reconciling the virtual cluster
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Object or release does not exist
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Helm command failed
    #[error("{command} failed: {message}")]
    Helm { command: String, message: String },

    /// Chart archive could not be obtained
    #[error("chart archive unavailable: {0}")]
    Archive(String),

    /// Status record could not be read or written
    #[error("status storage error: {0}")]
    Storage(String),

    /// Applying manifests failed
    #[error("apply failed: {0}")]
    Apply(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Template rendering error
    #[error("template error: {0}")]
    Template(String),

    /// Invalid manifest
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timeout
    #[error("operation timed out after {0}")]
    Timeout(String),

    /// The reconciliation pass was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<vdeploy_core::CoreError> for KubeError {
    fn from(e: vdeploy_core::CoreError) -> Self {
        match e {
            vdeploy_core::CoreError::InvalidDocument { .. } => {
                KubeError::InvalidManifest(e.to_string())
            }
            vdeploy_core::CoreError::DuplicateRelease { .. }
            | vdeploy_core::CoreError::MissingField { .. } => KubeError::InvalidConfig(e.to_string()),
            other => KubeError::Serialization(other.to_string()),
        }
    }
}

impl From<vdeploy_engine::EngineError> for KubeError {
    fn from(e: vdeploy_engine::EngineError) -> Self {
        KubeError::Template(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a not-found error (Kubernetes 404 or a missing release)
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::NotFound { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        let err = KubeError::NotFound {
            resource: "release default/nginx".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "release default/nginx not found");
        assert!(!KubeError::Cancelled.is_not_found());
    }

    #[test]
    fn test_core_error_conversion() {
        let err: KubeError = vdeploy_core::CoreError::InvalidDocument {
            index: 2,
            message: "bad".to_string(),
        }
        .into();
        assert!(matches!(err, KubeError::InvalidManifest(_)));
    }

    #[test]
    fn test_helm_error_display() {
        let err = KubeError::Helm {
            command: "helm upgrade".to_string(),
            message: "context deadline exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "helm upgrade failed: context deadline exceeded");
    }
}
