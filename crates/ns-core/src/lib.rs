//! node-setup core library
//!
//! This library provides the installer around the configuration model:
//! - Exit codes for CLI operations
//! - Host capability detection
//! - Operator prompting and answers files
//! - External collaborators (daemon, HTTP fetches, artifact writes)
//! - Service planning
//! - The install pipeline and its report
//!
//! The binary entry point is in `main.rs`.

pub mod capabilities;
pub mod collab;
pub mod commands;
pub mod exit_codes;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod prompt;
pub mod service;

pub use exit_codes::ExitCode;
pub use orchestrator::{
    Collaborators, GenesisSource, InstallReport, InstallRequest, Orchestrator, PipelineError,
};
