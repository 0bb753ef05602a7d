//! Error types for node-setup.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Service Manager Unavailable
//!   Reason: service manager 'systemd' requires a service supervisor, none detected
//!   Fix: Choose direct, screen, tmux, docker or none on hosts without systemd.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 30,
//!   "category": "patch",
//!   "message": "key path 'p2p.seeds' not found in config.toml",
//!   "recoverable": false,
//!   "suggested_action": "manual_edit",
//!   "context": { "document": "config.toml", "path": "p2p.seeds" }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::options::SelectionError;

/// Result type alias for node-setup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Operator input that failed validation.
    Input,
    /// Chain profile or answers file errors.
    Config,
    /// Configuration document patching errors.
    Patch,
    /// External collaborator failures (node binary, network).
    Collaborator,
    /// File I/O and serialization errors.
    Io,
    /// Host capability and permission errors.
    Platform,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Patch => write!(f, "patch"),
            ErrorCategory::Collaborator => write!(f, "collaborator"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Platform => write!(f, "platform"),
        }
    }
}

/// Suggested follow-up for automation driving the installer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Ask the operator again.
    Reprompt,
    /// Fix the profile or answers file and rerun.
    FixConfig,
    /// Edit the written documents by hand.
    ManualEdit,
    /// Retry the operation.
    Retry,
    /// Rerun with elevated privileges.
    Elevate,
    /// Install the missing tool and rerun.
    Install,
    /// Abort the installation.
    Abort,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Reprompt => write!(f, "reprompt"),
            SuggestedAction::FixConfig => write!(f, "fix_config"),
            SuggestedAction::ManualEdit => write!(f, "manual_edit"),
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::Elevate => write!(f, "elevate"),
            SuggestedAction::Install => write!(f, "install"),
            SuggestedAction::Abort => write!(f, "abort"),
        }
    }
}

/// Unified error type for node-setup.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (10-19)
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("operator input ended before all options were collected")]
    InputClosed,

    // Configuration errors (20-29)
    #[error("invalid chain profile: {0}")]
    Profile(String),

    #[error("invalid answers file: {0}")]
    Answers(String),

    #[error("invalid genesis document: {0}")]
    Genesis(String),

    // Patch errors (30-39)
    #[error("key path '{path}' not found in {document}")]
    MissingKey { document: String, path: String },

    #[error("state sync is incomplete: {0}")]
    StateSyncIncomplete(String),

    #[error("malformed configuration document {document}: {message}")]
    Document { document: String, message: String },

    // Collaborator errors (40-49)
    #[error("node command '{command}' failed: {message}")]
    NodeCommand { command: String, message: String },

    #[error("required binary unavailable: {0}")]
    BinaryUnavailable(String),

    #[error("network fetch failed: {0}")]
    Fetch(String),

    #[error("command timed out after {seconds}s")]
    Timeout { seconds: u64 },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Platform errors (70-79)
    #[error("permission denied writing {path}")]
    PermissionDenied { path: String },

    #[error("capability not available: {0}")]
    CapabilityMissing(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Input errors
    /// - 20-29: Configuration errors
    /// - 30-39: Patch errors
    /// - 40-49: Collaborator errors
    /// - 60-69: I/O errors
    /// - 70-79: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Selection(SelectionError::InvalidChoice { .. }) => 10,
            Error::Selection(SelectionError::InvalidValue { .. }) => 11,
            Error::Selection(SelectionError::SupervisorRequired { .. }) => 12,
            Error::Selection(SelectionError::MissingField(_)) => 13,
            Error::InputClosed => 14,
            Error::Profile(_) => 20,
            Error::Answers(_) => 21,
            Error::Genesis(_) => 22,
            Error::MissingKey { .. } => 30,
            Error::StateSyncIncomplete(_) => 31,
            Error::Document { .. } => 32,
            Error::NodeCommand { .. } => 40,
            Error::BinaryUnavailable(_) => 41,
            Error::Fetch(_) => 42,
            Error::Timeout { .. } => 43,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::PermissionDenied { .. } => 70,
            Error::CapabilityMissing(_) => 71,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Selection(_) | Error::InputClosed => ErrorCategory::Input,
            Error::Profile(_) | Error::Answers(_) | Error::Genesis(_) => ErrorCategory::Config,
            Error::MissingKey { .. } | Error::StateSyncIncomplete(_) | Error::Document { .. } => {
                ErrorCategory::Patch
            }
            Error::NodeCommand { .. }
            | Error::BinaryUnavailable(_)
            | Error::Fetch(_)
            | Error::Timeout { .. } => ErrorCategory::Collaborator,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
            Error::PermissionDenied { .. } | Error::CapabilityMissing(_) => {
                ErrorCategory::Platform
            }
        }
    }

    /// Returns whether rerunning after operator action can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Selection(_) => true,
            Error::InputClosed => false,
            Error::Profile(_) | Error::Answers(_) | Error::Genesis(_) => true,
            // A template that lacks a patched key is a bug in the template
            Error::MissingKey { .. } => false,
            Error::StateSyncIncomplete(_) => true,
            Error::Document { .. } => true,
            Error::NodeCommand { .. } => true,
            Error::BinaryUnavailable(_) => true,
            Error::Fetch(_) | Error::Timeout { .. } => true,
            Error::Io(_) => true,
            Error::Json(_) => true,
            Error::PermissionDenied { .. } => true,
            Error::CapabilityMissing(_) => true,
        }
    }

    /// Returns the suggested action for automation.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Selection(_) => SuggestedAction::Reprompt,
            Error::InputClosed => SuggestedAction::Abort,
            Error::Profile(_) | Error::Answers(_) | Error::Genesis(_) => SuggestedAction::FixConfig,
            Error::MissingKey { .. } | Error::Document { .. } => SuggestedAction::ManualEdit,
            Error::StateSyncIncomplete(_) => SuggestedAction::FixConfig,
            Error::NodeCommand { .. } => SuggestedAction::Retry,
            Error::BinaryUnavailable(_) => SuggestedAction::Install,
            Error::Fetch(_) | Error::Timeout { .. } => SuggestedAction::Retry,
            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualEdit,
            Error::PermissionDenied { .. } => SuggestedAction::Elevate,
            Error::CapabilityMissing(_) => SuggestedAction::Install,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Selection(SelectionError::SupervisorRequired { .. }) => {
                "Choose direct, screen, tmux, docker or none on hosts without systemd."
            }
            Error::Selection(_) => "Correct the value and answer again.",
            Error::InputClosed => {
                "Rerun interactively, or pass a complete answers file with --answers."
            }
            Error::Profile(_) => {
                "Run 'ns-core check' to validate the chain profile, or remove the override file."
            }
            Error::Answers(_) => {
                "Compare the answers file with 'ns-core schema' and fix the offending field."
            }
            Error::Genesis(_) => {
                "Verify the genesis URL points at the configured chain, or pass --genesis-file."
            }
            Error::MissingKey { .. } => {
                "The document does not have the expected layout. Regenerate it with 'ns-core install' or edit it by hand."
            }
            Error::StateSyncIncomplete(_) => {
                "Provide a trusted RPC server, trust height and trust hash, or choose another sync mode."
            }
            Error::Document { .. } => "Fix the TOML syntax of the document and rerun.",
            Error::NodeCommand { .. } => {
                "Inspect the node binary output above. Artifacts written so far were left in place."
            }
            Error::BinaryUnavailable(_) => {
                "Install the node binary (and cosmovisor when selected) or configure binary_url_template."
            }
            Error::Fetch(_) => "Check network connectivity and the configured URL, then retry.",
            Error::Timeout { .. } => {
                "The collaborator did not answer in time. Retry the operation."
            }
            Error::Io(_) => "Check disk space and permissions on the node home directory.",
            Error::Json(_) => "Invalid JSON. Check the document syntax with 'jq .'.",
            Error::PermissionDenied { .. } => {
                "Rerun with sudo, or point --unit-dir at a writable directory."
            }
            Error::CapabilityMissing(_) => "Install the missing tool and rerun.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Selection(SelectionError::SupervisorRequired { .. }) => {
                "Service Manager Unavailable"
            }
            Error::Selection(_) => "Invalid Option",
            Error::InputClosed => "Input Closed",
            Error::Profile(_) => "Invalid Chain Profile",
            Error::Answers(_) => "Invalid Answers File",
            Error::Genesis(_) => "Invalid Genesis",
            Error::MissingKey { .. } => "Patch Target Missing",
            Error::StateSyncIncomplete(_) => "State Sync Incomplete",
            Error::Document { .. } => "Malformed Document",
            Error::NodeCommand { .. } => "Node Command Failed",
            Error::BinaryUnavailable(_) => "Binary Unavailable",
            Error::Fetch(_) => "Download Failed",
            Error::Timeout { .. } => "Command Timeout",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
            Error::PermissionDenied { .. } => "Permission Denied",
            Error::CapabilityMissing(_) => "Missing Capability",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested follow-up.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., document, key path).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::MissingKey { document, path } => {
                context.insert("document".to_string(), serde_json::json!(document));
                context.insert("path".to_string(), serde_json::json!(path));
            }
            Error::NodeCommand { command, .. } => {
                context.insert("command".to_string(), serde_json::json!(command));
            }
            Error::Selection(SelectionError::SupervisorRequired { manager }) => {
                context.insert("service_manager".to_string(), serde_json::json!(manager));
            }
            Error::Timeout { seconds } => {
                context.insert("timeout_seconds".to_string(), serde_json::json!(seconds));
            }
            Error::PermissionDenied { path } => {
                context.insert("path".to_string(), serde_json::json!(path));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
