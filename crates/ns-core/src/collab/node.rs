//! The chain daemon as a subprocess.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::fetch::{FetchError, HttpClient, MAX_BINARY_BYTES};
use super::runner::{which, CommandRunner, CommandSpec, RunnerError};
use super::sink::{ArtifactSink, FsArtifactSink, WriteError};

const ELF_MAGIC: &[u8] = b"\x7fELF";

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("downloading {url}: {message}")]
    Download { url: String, message: String },

    #[error("'{command}' failed: {message}")]
    Failed { command: String, message: String },

    #[error("'{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl NodeError {
    /// `keys show` on a name the keyring does not hold.
    pub fn is_key_not_found(&self) -> bool {
        match self {
            NodeError::Failed { message, .. } => {
                message.contains("key not found")
                    || message.contains("is not a valid name or address")
            }
            _ => false,
        }
    }
}

impl From<NodeError> for ns_common::Error {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::NotInstalled(name) => ns_common::Error::BinaryUnavailable(name),
            NodeError::Download { .. } => ns_common::Error::Fetch(err.to_string()),
            NodeError::Failed { command, message } => {
                ns_common::Error::NodeCommand { command, message }
            }
            NodeError::Timeout { timeout, .. } => ns_common::Error::Timeout {
                seconds: timeout.as_secs(),
            },
            NodeError::Write(e) => e.into(),
        }
    }
}

pub trait NodeBinary {
    /// Path of the installed daemon, if any.
    fn daemon_path(&self) -> Option<PathBuf>;

    /// Path of the installed cosmovisor, if any.
    fn cosmovisor_path(&self) -> Option<PathBuf>;

    /// Download the daemon from `url` and install it; returns its path.
    fn install_from(&mut self, url: &str) -> Result<PathBuf, NodeError>;

    /// Run a daemon subcommand and return its stdout.
    ///
    /// Interactive commands share the terminal for keyring prompts.
    fn run(&mut self, args: &[String], interactive: bool) -> Result<String, NodeError>;
}

/// Runs the real daemon binary.
#[derive(Debug, Clone)]
pub struct ProcessNodeBinary {
    daemon_name: String,
    binary_dir: PathBuf,
    runner: CommandRunner,
    http: HttpClient,
}

impl ProcessNodeBinary {
    pub fn new(daemon_name: impl Into<String>, binary_dir: impl Into<PathBuf>) -> Self {
        ProcessNodeBinary {
            daemon_name: daemon_name.into(),
            binary_dir: binary_dir.into(),
            runner: CommandRunner::default(),
            http: HttpClient::default(),
        }
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    fn installed_path(&self) -> PathBuf {
        self.binary_dir.join(&self.daemon_name)
    }
}

impl NodeBinary for ProcessNodeBinary {
    fn daemon_path(&self) -> Option<PathBuf> {
        let installed = self.installed_path();
        which(&installed.to_string_lossy()).or_else(|| which(&self.daemon_name))
    }

    fn cosmovisor_path(&self) -> Option<PathBuf> {
        which("cosmovisor")
    }

    fn install_from(&mut self, url: &str) -> Result<PathBuf, NodeError> {
        let download_err = |message: String| NodeError::Download {
            url: url.to_string(),
            message,
        };
        let bytes = self
            .http
            .get_bytes(url, MAX_BINARY_BYTES)
            .map_err(|e: FetchError| download_err(e.to_string()))?;
        if !bytes.starts_with(ELF_MAGIC) {
            return Err(download_err("response is not an ELF executable".to_string()));
        }

        let target = self.installed_path();
        FsArtifactSink.write(&target, &bytes, 0o755)?;
        info!(path = %target.display(), bytes = bytes.len(), "installed daemon binary");
        Ok(target)
    }

    fn run(&mut self, args: &[String], interactive: bool) -> Result<String, NodeError> {
        let path = self
            .daemon_path()
            .ok_or_else(|| NodeError::NotInstalled(self.daemon_name.clone()))?;
        let mut spec = CommandSpec::new(path.to_string_lossy(), args.iter().cloned());
        if interactive {
            spec = spec.interactive();
        }
        let shown = format!("{} {}", self.daemon_name, args.join(" "));
        debug!(command = shown.as_str(), interactive, "running daemon");

        let output = self.runner.run(&spec).map_err(|e| match e {
            RunnerError::CommandNotFound(_) => NodeError::NotInstalled(self.daemon_name.clone()),
            RunnerError::Timeout(timeout) => NodeError::Timeout {
                command: shown.clone(),
                timeout,
            },
            other => NodeError::Failed {
                command: shown.clone(),
                message: other.to_string(),
            },
        })?;

        if !output.success() {
            return Err(NodeError::Failed {
                command: shown,
                message: output.failure_summary(),
            });
        }
        Ok(output.stdout_str())
    }
}

/// Daemon arguments shared by every pipeline command.
pub fn home_args(home: &Path) -> [String; 2] {
    ["--home".to_string(), home.display().to_string()]
}
