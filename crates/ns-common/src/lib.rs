//! node-setup common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the node-setup crates:
//! - The validated operator option set and its builder
//! - Environment capability flags detected once per run
//! - Common error types with stable codes
//! - Output formats

pub mod capabilities;
pub mod error;
pub mod id;
pub mod options;
pub mod output;

pub use capabilities::EnvironmentCapabilities;
pub use error::{Error, Result};
pub use id::RunId;
pub use options::{
    Architecture, NodeType, OptionAnswers, OptionSet, OptionSetBuilder, SelectionError,
    ServiceManager, StateSyncParams, SyncMode, ValidatorSetup,
};
pub use output::OutputFormat;

/// Schema version for JSON payloads emitted by node-setup.
pub const SCHEMA_VERSION: &str = "1.0.0";
