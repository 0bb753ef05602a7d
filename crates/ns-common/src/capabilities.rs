//! Environment capability flags.
//!
//! Detection lives in ns-core; this is the read-only snapshot every other
//! component receives. Only `has_service_supervisor` guards option selection,
//! the remaining flags feed warnings.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Host capabilities detected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentCapabilities {
    /// systemd (or an equivalent unit-based supervisor) is running as PID 1.
    pub has_service_supervisor: bool,

    /// A docker client and daemon are reachable.
    #[serde(default)]
    pub has_docker: bool,

    /// GNU screen is installed.
    #[serde(default)]
    pub has_screen: bool,

    /// tmux is installed.
    #[serde(default)]
    pub has_tmux: bool,

    /// Running as root.
    #[serde(default)]
    pub is_root: bool,
}

impl EnvironmentCapabilities {
    /// Capabilities of a host with a running supervisor and nothing else.
    pub fn with_supervisor() -> Self {
        EnvironmentCapabilities {
            has_service_supervisor: true,
            ..Default::default()
        }
    }

    /// Capabilities of a bare host (containers, minimal VMs).
    pub fn without_supervisor() -> Self {
        EnvironmentCapabilities::default()
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let flag = |b: bool| if b { "yes" } else { "no" };
        format!(
            "supervisor={} docker={} screen={} tmux={} root={}",
            flag(self.has_service_supervisor),
            flag(self.has_docker),
            flag(self.has_screen),
            flag(self.has_tmux),
            flag(self.is_root)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert!(EnvironmentCapabilities::with_supervisor().has_service_supervisor);
        assert!(!EnvironmentCapabilities::without_supervisor().has_service_supervisor);
    }

    #[test]
    fn test_summary() {
        let caps = EnvironmentCapabilities {
            has_service_supervisor: true,
            has_tmux: true,
            ..Default::default()
        };
        assert_eq!(
            caps.summary(),
            "supervisor=yes docker=no screen=no tmux=yes root=no"
        );
    }

    #[test]
    fn test_missing_optional_flags_deserialize() {
        let caps: EnvironmentCapabilities =
            serde_json::from_str(r#"{"has_service_supervisor": true}"#).unwrap();
        assert!(caps.has_service_supervisor);
        assert!(!caps.has_docker);
    }
}
