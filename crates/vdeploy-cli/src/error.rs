//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use miette::Diagnostic;
use thiserror::Error;
use vdeploy_engine::EngineError;
use vdeploy_kube::KubeError;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Deploy configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(vdeploy::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Manifests template rendering failed
    #[error("Template error: {message}")]
    #[diagnostic(code(vdeploy::cli::template))]
    Template {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Reconciliation or cluster access failed
    #[error("Deploy failed: {message}")]
    #[diagnostic(code(vdeploy::cli::deploy))]
    Deploy {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A single pass finished without converging
    #[error("Deploy not converged: {message}")]
    #[diagnostic(
        code(vdeploy::cli::not_converged),
        help("run again or use `vdeploy run` without --once to keep retrying")
    )]
    NotConverged { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(vdeploy::cli::io))]
    Io { message: String },

    /// Cancelled by the user
    #[error("Interrupted")]
    #[diagnostic(code(vdeploy::cli::interrupted))]
    Interrupted,

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(vdeploy::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Deploy { .. } => exit_codes::DEPLOY_ERROR,
            CliError::NotConverged { .. } => exit_codes::NOT_CONVERGED,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Interrupted => exit_codes::INTERRUPTED,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a deploy error
    pub fn deploy(message: impl Into<String>) -> Self {
        Self::Deploy {
            message: message.into(),
            help: None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        CliError::Template {
            message: err.to_string(),
            help: Some("check the manifestsTemplate against `release` and `values`".to_string()),
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Cancelled => CliError::Interrupted,
            KubeError::Template(message) => CliError::Template {
                message,
                help: None,
            },
            KubeError::InvalidConfig(message) | KubeError::InvalidManifest(message) => {
                CliError::config(message)
            }
            KubeError::Api(e) => CliError::Deploy {
                message: e.to_string(),
                help: Some("check that the kubeconfig points at a reachable cluster".to_string()),
            },
            other => CliError::deploy(other.to_string()),
        }
    }
}

impl From<vdeploy_core::CoreError> for CliError {
    fn from(err: vdeploy_core::CoreError) -> Self {
        CliError::config(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
