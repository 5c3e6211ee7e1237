//! CLI commands

pub mod hash;
pub mod render;
pub mod run;
pub mod status;
