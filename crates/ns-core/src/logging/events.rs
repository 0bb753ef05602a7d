//! Event vocabulary: levels, pipeline stages, event names and the run's
//! correlation ids.

use serde::{Deserialize, Serialize};

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Stages of an installer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup, capability detection and profile loading.
    Init,
    /// Operator option collection.
    Options,
    /// Node binary resolution and download.
    Binary,
    /// `init` of the node home.
    NodeInit,
    /// Genesis fetch.
    Genesis,
    /// Baseline document construction.
    Template,
    /// Node-type and sync-mode patches.
    Patch,
    /// Launch plan construction.
    Service,
    /// Artifact writes.
    Emit,
    /// Validator key and genesis ceremony.
    Keys,
}

impl Stage {
    /// Install pipeline order.
    pub const PIPELINE: &'static [Stage] = &[
        Stage::Options,
        Stage::Binary,
        Stage::NodeInit,
        Stage::Genesis,
        Stage::Template,
        Stage::Patch,
        Stage::Service,
        Stage::Emit,
        Stage::Keys,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Options => "options",
            Stage::Binary => "binary",
            Stage::NodeInit => "node_init",
            Stage::Genesis => "genesis",
            Stage::Template => "template",
            Stage::Patch => "patch",
            Stage::Service => "service",
            Stage::Emit => "emit",
            Stage::Keys => "keys",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const INSTALL_STARTED: &str = "install.started";
    pub const INSTALL_FINISHED: &str = "install.finished";

    // Stage lifecycle
    pub const STAGE_STARTED: &str = "stage.started";
    pub const STAGE_FINISHED: &str = "stage.finished";
    pub const STAGE_SKIPPED: &str = "stage.skipped";
    pub const STAGE_FAILED: &str = "stage.failed";

    // Options
    pub const OPTION_REJECTED: &str = "options.rejected";
    pub const CAPABILITIES_DETECTED: &str = "capabilities.detected";

    // Collaborators
    pub const BINARY_DOWNLOADED: &str = "binary.downloaded";
    pub const COMMAND_RAN: &str = "command.ran";
    pub const GENESIS_DEGRADED: &str = "genesis.degraded";
    pub const ARTIFACT_WRITTEN: &str = "artifact.written";

    // Profile
    pub const PROFILE_LOADED: &str = "profile.loaded";
    pub const PROFILE_DEFAULT_USED: &str = "profile.default_used";
}

/// Correlation ids shared by every event of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_excludes_init() {
        assert!(!Stage::PIPELINE.contains(&Stage::Init));
        assert_eq!(Stage::PIPELINE.first(), Some(&Stage::Options));
        assert_eq!(Stage::PIPELINE.last(), Some(&Stage::Keys));
    }

    #[test]
    fn test_level_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Level::Warn).unwrap(), "\"warn\"");
    }

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in Stage::PIPELINE {
            assert_eq!(
                serde_json::to_string(stage).unwrap(),
                format!("\"{}\"", stage)
            );
        }
    }
}
