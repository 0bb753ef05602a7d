//! Command runner with timeout and output cap.
//!
//! Every node binary invocation and every host probe goes through here:
//!
//! - Per-command timeout with SIGTERM → SIGKILL escalation
//! - Output size caps to prevent memory exhaustion
//! - Interactive mode that hands the terminal to the child for prompts
//!   (keyring passphrases) while still capturing stdout
//! - Command path validation to prevent injection

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

/// Default timeout per command in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default maximum output size in bytes (10MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command path: {0}")]
    InvalidPath(String),
}

/// Output from a command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Command that was executed.
    pub command: String,

    /// Arguments passed to the command.
    pub args: Vec<String>,

    /// Standard output (may be truncated).
    pub stdout: Vec<u8>,

    /// Standard error (empty for interactive commands).
    pub stderr: Vec<u8>,

    /// Exit code (if available).
    pub exit_code: Option<i32>,

    /// Whether output was truncated.
    pub truncated: bool,

    /// Execution duration.
    pub duration: Duration,
}

impl CommandOutput {
    /// Get stdout as string (lossy UTF-8 conversion).
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as string (lossy UTF-8 conversion).
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last non-empty line of stderr, falling back to stdout.
    pub fn failure_summary(&self) -> String {
        let pick = |text: String| {
            text.lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
        };
        pick(self.stderr_str())
            .or_else(|| pick(self.stdout_str()))
            .unwrap_or_else(|| match self.exit_code {
                Some(code) => format!("exited with status {}", code),
                None => "killed by signal".to_string(),
            })
    }
}

/// Specification for a command to run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Command to execute (name on PATH or absolute path).
    pub command: String,

    /// Arguments to pass.
    pub args: Vec<String>,

    /// Extra environment variables.
    pub env: Vec<(String, String)>,

    /// Override timeout (None = use default).
    pub timeout: Option<Duration>,

    /// Inherit stdin and stderr from the installer.
    pub interactive: bool,
}

impl CommandSpec {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            timeout: None,
            interactive: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Shell-like rendering for logs and error messages.
    pub fn display(&self) -> String {
        let mut out = self.command.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

/// Command runner with a default timeout and output cap.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    default_timeout: Duration,
    max_output_bytes: usize,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl CommandRunner {
    pub fn new(default_timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            default_timeout,
            max_output_bytes,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run a command from a specification.
    ///
    /// A timeout is an error; a non-zero exit is not, callers inspect
    /// [`CommandOutput::success`].
    pub fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        validate_command(&spec.command)?;

        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        debug!(
            command = %spec.command,
            args = ?spec.args,
            timeout_ms = timeout.as_millis() as u64,
            interactive = spec.interactive,
            "running command"
        );

        let mut command = Command::new(&spec.command);
        command.args(&spec.args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        if spec.interactive {
            command.stdin(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdin(Stdio::null()).stderr(Stdio::piped());
        }
        command.stdout(Stdio::piped());

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            error!(command = %spec.command, error = %e, "failed to spawn");
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::CommandNotFound(spec.command.clone())
            } else {
                RunnerError::SpawnFailed(e.to_string())
            }
        })?;

        let (stdout, stderr, exit_code, truncated, timed_out) =
            self.execute_with_timeout(&mut child, timeout)?;
        let duration = start.elapsed();

        if timed_out {
            warn!(
                command = %spec.command,
                timeout_ms = timeout.as_millis() as u64,
                "command timed out"
            );
            return Err(RunnerError::Timeout(timeout));
        }

        trace!(
            command = %spec.command,
            duration_ms = duration.as_millis() as u64,
            exit_code = ?exit_code,
            "command complete"
        );

        Ok(CommandOutput {
            command: spec.command.clone(),
            args: spec.args.clone(),
            stdout,
            stderr,
            exit_code,
            truncated,
            duration,
        })
    }

    /// Execute a child process with timeout and output capture.
    #[allow(clippy::type_complexity)]
    fn execute_with_timeout(
        &self,
        child: &mut Child,
        timeout: Duration,
    ) -> Result<(Vec<u8>, Vec<u8>, Option<i32>, bool, bool), RunnerError> {
        let max_output = self.max_output_bytes;
        let deadline = Instant::now() + timeout;
        let mut stdout_buf = Vec::with_capacity(max_output.min(65536));
        let mut stderr_buf = Vec::new();
        let mut truncated = false;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut chunk = vec![0u8; 8192];

        loop {
            if Instant::now() >= deadline {
                kill_with_grace(child);
                let _ = child.wait();
                return Ok((stdout_buf, stderr_buf, None, truncated, true));
            }

            let mut did_read = false;
            if let Some(ref mut out) = stdout {
                if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                    if n > 0 {
                        did_read = true;
                        append_capped(&mut stdout_buf, &chunk[..n], max_output, &mut truncated);
                    }
                }
            }
            if let Some(ref mut err) = stderr {
                if let Ok(n) = try_read_nonblocking(err, &mut chunk) {
                    if n > 0 {
                        did_read = true;
                        append_capped(&mut stderr_buf, &chunk[..n], max_output, &mut truncated);
                    }
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Some(ref mut out) = stdout {
                        drain_to_limit(out, &mut stdout_buf, max_output, &mut truncated)?;
                    }
                    if let Some(ref mut err) = stderr {
                        drain_to_limit(err, &mut stderr_buf, max_output, &mut truncated)?;
                    }
                    return Ok((stdout_buf, stderr_buf, status.code(), truncated, false));
                }
                Ok(None) => {
                    if !did_read {
                        thread::sleep(Duration::from_millis(10));
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to wait for child");
                    return Err(RunnerError::Io(e));
                }
            }
        }
    }
}

/// Validate that a command is safe to execute.
fn validate_command(cmd: &str) -> Result<(), RunnerError> {
    if cmd.is_empty() {
        return Err(RunnerError::InvalidPath("empty command".to_string()));
    }
    if cmd.contains(['|', '&', ';', '$', '`', '\n', '\r']) {
        return Err(RunnerError::InvalidPath(format!(
            "command contains shell metacharacters: {}",
            cmd
        )));
    }
    if cmd.contains('/') && !Path::new(cmd).exists() {
        return Err(RunnerError::CommandNotFound(cmd.to_string()));
    }
    Ok(())
}

fn append_capped(buf: &mut Vec<u8>, data: &[u8], max: usize, truncated: &mut bool) {
    let space = max.saturating_sub(buf.len());
    if space == 0 {
        *truncated = true;
        return;
    }
    let take = data.len().min(space);
    buf.extend_from_slice(&data[..take]);
    if data.len() > space {
        *truncated = true;
    }
}

/// Drain what is immediately available without waiting on grandchildren
/// that still hold the pipe open.
fn drain_to_limit<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; 8192];
    loop {
        if *truncated {
            break;
        }
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) => break,
            Ok(n) => append_capped(buf, &chunk[..n], max, truncated),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Kill a process with SIGTERM, then SIGKILL after the grace period.
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as i32;
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    debug!(pid, "sent SIGTERM");

    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

    match child.try_wait() {
        Ok(Some(_)) => trace!(pid, "process exited after SIGTERM"),
        Ok(None) => {
            warn!(pid, "process did not exit after SIGTERM, sending SIGKILL");
            unsafe {
                libc::kill(pid, libc::SIGKILL);
            }
        }
        Err(e) => error!(pid, error = %e, "failed to check process status"),
    }
}

/// Read from a stream without blocking; `Ok(0)` when nothing is available.
fn try_read_nonblocking<R: Read + std::os::unix::io::AsRawFd>(
    stream: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

/// Locate an executable on `PATH`.
pub fn which(name: &str) -> Option<std::path::PathBuf> {
    if name.contains('/') {
        let path = Path::new(name);
        return is_executable(path).then(|| path.to_path_buf());
    }
    let paths: OsString = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
