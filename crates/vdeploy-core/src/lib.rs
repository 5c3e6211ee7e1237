//! vdeploy Core - types shared by the deploy reconciler
//!
//! This crate provides the foundational types used throughout vdeploy:
//! - `DesiredState`: Charts and manifests declared in configuration
//! - `Status`: Persisted convergence status, read by external tooling
//! - `ParsedManifest`: Multi-document manifest parsing and object keys
//! - `ReleaseContext`: Template rendering context
//! - Content hashing and status compression helpers

pub mod codec;
pub mod context;
pub mod desired;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod status;

pub use context::{ReleaseContext, ReleaseInfo};
pub use desired::{
    ChartRef, ChartSpec, DEFAULT_CHART_TIMEOUT, DEFAULT_NAMESPACE, DesiredState, ReleaseKey,
    ReleaseRef, parse_timeout,
};
pub use error::{CoreError, Result};
pub use hash::{archive_cache_key, chart_config_hash, md5_hex};
pub use manifest::{ManifestObject, ObjectKey, ParsedManifest, join_documents, split_documents};
pub use status::{ChartStatus, FailureReason, ManifestsStatus, Phase, Status};
