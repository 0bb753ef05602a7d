//! Exit codes for the ns-core CLI.
//!
//! Exit codes communicate the install outcome without requiring output
//! parsing.
//!
//! Exit code ranges:
//! - 0-6: Operational outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by operator action)
//! - 20-29: Internal errors (bugs, should be reported)

use ns_common::{Error, SelectionError};

/// Exit codes for ns-core operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-6)
    // ========================================================================
    /// Success: every artifact written, nothing left to do
    Clean = 0,

    /// Artifacts written, but a manual edit or snapshot placement is pending
    ManualActionRequired = 1,

    /// Operator input ended before the options were complete
    Interrupted = 6,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments, options or answers file
    ArgsError = 10,

    /// Required capability missing (supervisor, node binary, cosmovisor)
    CapabilityError = 11,

    /// Permission denied
    PermissionError = 12,

    /// Chain profile, genesis or configuration document rejected
    ConfigError = 13,

    /// Node binary command or network fetch failed
    CollaboratorError = 14,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,

    /// Operation timed out
    TimeoutError = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success (codes 0-1).
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::ManualActionRequired)
    }

    /// Check if this exit code indicates operational outcome (codes 0-6).
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::ManualActionRequired => "OK_MANUAL_ACTION",
            ExitCode::Interrupted => "ERR_INTERRUPTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::CapabilityError => "ERR_CAPABILITY",
            ExitCode::PermissionError => "ERR_PERMISSION",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::CollaboratorError => "ERR_COLLABORATOR",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::TimeoutError => "ERR_TIMEOUT",
        }
    }

    /// Exit code for a failed run.
    pub fn for_error(err: &Error) -> ExitCode {
        match err {
            Error::Selection(SelectionError::SupervisorRequired { .. }) => {
                ExitCode::CapabilityError
            }
            Error::Selection(_) | Error::Answers(_) => ExitCode::ArgsError,
            Error::InputClosed => ExitCode::Interrupted,
            Error::Profile(_) | Error::Genesis(_) | Error::StateSyncIncomplete(_) => {
                ExitCode::ConfigError
            }
            Error::Document { .. } => ExitCode::ConfigError,
            // Baseline documents always carry every patched key
            Error::MissingKey { .. } => ExitCode::ConfigError,
            Error::NodeCommand { .. } | Error::Fetch(_) => ExitCode::CollaboratorError,
            Error::BinaryUnavailable(_) | Error::CapabilityMissing(_) => {
                ExitCode::CapabilityError
            }
            Error::Timeout { .. } => ExitCode::TimeoutError,
            Error::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ExitCode::PermissionError
            }
            Error::PermissionDenied { .. } => ExitCode::PermissionError,
            Error::Io(_) => ExitCode::IoError,
            Error::Json(_) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
