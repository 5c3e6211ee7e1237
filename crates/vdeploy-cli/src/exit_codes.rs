//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - unreadable or invalid deploy configuration
pub const CONFIG_ERROR: i32 = 2;

/// Template error - manifests template rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Deploy error - a reconciliation pass or a cluster call failed
pub const DEPLOY_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Not converged - a single pass finished but more work remains
pub const NOT_CONVERGED: i32 = 6;

/// Interrupted - cancelled by a signal (128 + SIGINT)
pub const INTERRUPTED: i32 = 130;
