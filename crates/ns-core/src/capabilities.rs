//! Host capability detection.
//!
//! Runs once at startup and produces the [`EnvironmentCapabilities`]
//! snapshot that guards option selection:
//! - Service supervisor (systemd as PID 1)
//! - Session multiplexers (screen, tmux)
//! - Docker client and daemon
//! - Effective user

use ns_common::EnvironmentCapabilities;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, trace};

use crate::collab::runner::{which, CommandRunner, CommandSpec};

/// A tool looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolPresence {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ToolPresence {
    fn probe(name: &'static str) -> Self {
        let path = which(name);
        trace!(tool = name, found = path.is_some(), "probed tool");
        ToolPresence { name, path }
    }

    pub fn available(&self) -> bool {
        self.path.is_some()
    }
}

/// Detection result with the evidence behind each flag.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub capabilities: EnvironmentCapabilities,
    pub tools: Vec<ToolPresence>,
    /// PID 1 command name, when readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_process: Option<String>,
    pub effective_uid: u32,
}

/// Detect the capabilities of the current host.
pub fn detect_capabilities() -> DetectionReport {
    debug!("detecting host capabilities");

    let init_process = read_init_process();
    let has_service_supervisor = init_process
        .as_deref()
        .is_some_and(|cmd| cmd.contains("systemd"))
        && systemd_booted();

    let screen = ToolPresence::probe("screen");
    let tmux = ToolPresence::probe("tmux");
    let docker = ToolPresence::probe("docker");
    let has_docker = docker.available() && check_docker_daemon();

    let effective_uid = unsafe { libc::geteuid() };

    let capabilities = EnvironmentCapabilities {
        has_service_supervisor,
        has_docker,
        has_screen: screen.available(),
        has_tmux: tmux.available(),
        is_root: effective_uid == 0,
    };
    debug!(summary = %capabilities.summary(), "capabilities detected");

    DetectionReport {
        capabilities,
        tools: vec![screen, tmux, docker],
        init_process,
        effective_uid,
    }
}

/// First element of `/proc/1/cmdline`.
fn read_init_process() -> Option<String> {
    let cmdline = fs::read("/proc/1/cmdline").ok()?;
    let first = cmdline.split(|b| *b == 0).next()?;
    if first.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(first).to_string())
}

/// systemd creates this directory when it is the running init.
fn systemd_booted() -> bool {
    fs::metadata("/run/systemd/system").is_ok_and(|m| m.is_dir())
}

fn check_docker_daemon() -> bool {
    let spec = CommandSpec::new("docker", ["info", "--format", "{{.ServerVersion}}"])
        .with_timeout(Duration::from_secs(3));
    CommandRunner::default()
        .run(&spec)
        .map(|o| o.success())
        .unwrap_or(false)
}
