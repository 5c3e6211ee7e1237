//! Template rendering context

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Context available to the manifests template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseContext {
    /// The virtual cluster release
    pub release: ReleaseInfo,

    /// Free-form values from the configuration
    pub values: JsonValue,
}

impl ReleaseContext {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            release: ReleaseInfo {
                name: name.into(),
                namespace: namespace.into(),
            },
            values: JsonValue::Object(Default::default()),
        }
    }

    pub fn with_values(mut self, values: JsonValue) -> Self {
        self.values = values;
        self
    }
}

impl Default for ReleaseContext {
    fn default() -> Self {
        Self::new("vcluster", "vcluster")
    }
}

/// Release information for templates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
}
