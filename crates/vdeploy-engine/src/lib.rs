//! vdeploy Engine - Jinja2 templating for vcluster manifests
//!
//! This crate provides a MiniJinja-based template engine with:
//! - Helm-compatible filters (toyaml, b64encode, nindent, etc.)
//! - Error messages pointing at the failing template line
//! - The `TemplateEngine` seam used by the manifest reconciler

pub mod engine;
pub mod error;
pub mod filters;

pub use engine::{Engine, EngineBuilder, MANIFESTS_TEMPLATE_NAME, TemplateEngine};
pub use error::{EngineError, Result, TemplateError};
