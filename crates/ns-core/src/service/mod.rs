//! Launch plans for the installed node.
//!
//! [`ServicePlanner`] maps the selected service manager to a [`ServicePlan`]
//! and renders the files that realize it. The supervisor guard is enforced
//! when the `OptionSet` is built, so planning cannot fail.

mod planner;
mod render;

pub use planner::ServicePlanner;

use ns_common::{Architecture, ServiceManager};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// P2P listen port.
pub const P2P_PORT: u16 = 26656;
/// CometBFT RPC port.
pub const RPC_PORT: u16 = 26657;
/// Cosmos REST API port.
pub const API_PORT: u16 = 1317;
/// EVM JSON-RPC port.
pub const JSON_RPC_PORT: u16 = 8545;

/// Terminal multiplexer for detached sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplexer {
    Screen,
    Tmux,
}

impl Multiplexer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Multiplexer::Screen => "screen",
            Multiplexer::Tmux => "tmux",
        }
    }
}

/// A published container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
    pub purpose: &'static str,
}

/// A host directory mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindMount {
    pub host: PathBuf,
    pub container: PathBuf,
}

/// When systemd restarts the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartMode {
    OnFailure,
    Always,
}

impl RestartMode {
    /// Value of `Restart=`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartMode::OnFailure => "on-failure",
            RestartMode::Always => "always",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestartPolicy {
    pub restart: RestartMode,
    /// `RestartSec=`.
    pub delay_secs: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy {
            restart: RestartMode::OnFailure,
            delay_secs: 3,
        }
    }
}

/// How the node process is kept running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServicePlan {
    /// A systemd unit. When cosmovisor supervises the daemon, `env_vars`
    /// are written to `environment_file`.
    SystemdUnit {
        unit_name: String,
        unit_path: PathBuf,
        exec_start: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        working_directory: PathBuf,
        env_vars: BTreeMap<String, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        environment_file: Option<PathBuf>,
        restart_policy: RestartPolicy,
    },
    /// A detached screen/tmux session that survives the operator leaving it.
    SessionLaunch {
        multiplexer: Multiplexer,
        session_name: String,
        command: Vec<String>,
        script_path: PathBuf,
    },
    /// A long-running container.
    ContainerLaunch {
        image: String,
        container_name: String,
        platform: String,
        ports: Vec<PortBinding>,
        mounts: Vec<BindMount>,
        command: Vec<String>,
        script_path: PathBuf,
    },
    /// Foreground process in the operator's terminal.
    DirectLaunch { command: Vec<String> },
    /// The operator starts the node by hand.
    NoService,
}

impl ServicePlan {
    pub fn kind(&self) -> &'static str {
        match self {
            ServicePlan::SystemdUnit { .. } => "systemd_unit",
            ServicePlan::SessionLaunch { .. } => "session_launch",
            ServicePlan::ContainerLaunch { .. } => "container_launch",
            ServicePlan::DirectLaunch { .. } => "direct_launch",
            ServicePlan::NoService => "no_service",
        }
    }
}

/// Commands that drive the planned service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Lifecycle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
}

/// A rendered file that realizes a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceArtifact {
    pub path: PathBuf,
    #[serde(skip)]
    pub contents: String,
    /// Unix permission bits.
    pub mode: u32,
}

/// Plan, its files and how to operate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub manager: ServiceManager,
    pub architecture: Architecture,
    pub plan: ServicePlan,
    pub lifecycle: Lifecycle,
    pub artifacts: Vec<ServiceArtifact>,
    /// Steps the installer leaves to the operator.
    pub notes: Vec<String>,
}

impl LaunchPlan {
    /// Ports published by a container plan.
    pub fn published_ports(&self) -> Vec<u16> {
        match &self.plan {
            ServicePlan::ContainerLaunch { ports, .. } => ports.iter().map(|p| p.host).collect(),
            _ => Vec::new(),
        }
    }

    /// Account the service runs as, when the plan names one.
    pub fn service_user(&self) -> Option<&str> {
        match &self.plan {
            ServicePlan::SystemdUnit { user, .. } => user.as_deref(),
            _ => None,
        }
    }
}
