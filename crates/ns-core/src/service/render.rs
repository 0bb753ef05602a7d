//! Text of unit files, environment files and launch scripts.

use std::collections::BTreeMap;
use std::path::Path;

use super::{BindMount, Multiplexer, PortBinding, RestartPolicy};

/// Quote a word for POSIX sh when it contains anything but safe characters.
pub(crate) fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

pub(crate) fn shell_join(words: &[String]) -> String {
    words
        .iter()
        .map(|w| shell_quote(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// systemd quoting for `ExecStart=`.
fn systemd_join(words: &[String]) -> String {
    words
        .iter()
        .map(|w| {
            if w.is_empty() || w.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
                format!("\"{}\"", w.replace('\\', r"\\").replace('"', "\\\""))
            } else {
                w.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) struct UnitSpec<'a> {
    pub description: &'a str,
    pub user: Option<&'a str>,
    pub working_directory: &'a Path,
    pub environment_file: Option<&'a Path>,
    pub exec_start: &'a [String],
    pub restart: RestartPolicy,
}

pub(crate) fn systemd_unit(spec: &UnitSpec<'_>) -> String {
    let mut out = String::new();
    out.push_str("[Unit]\n");
    out.push_str(&format!("Description={}\n", spec.description));
    out.push_str("After=network-online.target\n");
    out.push_str("Wants=network-online.target\n");
    out.push('\n');
    out.push_str("[Service]\n");
    out.push_str("Type=simple\n");
    if let Some(user) = spec.user {
        out.push_str(&format!("User={}\n", user));
    }
    out.push_str(&format!(
        "WorkingDirectory={}\n",
        spec.working_directory.display()
    ));
    if let Some(env) = spec.environment_file {
        out.push_str(&format!("EnvironmentFile={}\n", env.display()));
    }
    out.push_str(&format!("ExecStart={}\n", systemd_join(spec.exec_start)));
    out.push_str(&format!("Restart={}\n", spec.restart.restart.as_str()));
    out.push_str(&format!("RestartSec={}\n", spec.restart.delay_secs));
    out.push_str("LimitNOFILE=65535\n");
    out.push('\n');
    out.push_str("[Install]\n");
    out.push_str("WantedBy=multi-user.target\n");
    out
}

/// `KEY=value` lines for a systemd `EnvironmentFile=`.
pub(crate) fn environment_file(vars: &BTreeMap<String, String>) -> String {
    vars.iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
}

pub(crate) fn session_script(
    multiplexer: Multiplexer,
    session_name: &str,
    command: &[String],
) -> String {
    let launch = match multiplexer {
        Multiplexer::Screen => format!(
            "exec screen -dmS {} {}",
            shell_quote(session_name),
            shell_join(command)
        ),
        Multiplexer::Tmux => format!(
            "exec tmux new-session -d -s {} {}",
            shell_quote(session_name),
            shell_quote(&shell_join(command))
        ),
    };
    format!(
        "#!/bin/sh\n# Starts the node in a detached {} session named {}.\nset -e\n{}\n",
        multiplexer.as_str(),
        session_name,
        launch
    )
}

pub(crate) struct ContainerSpec<'a> {
    pub image: &'a str,
    pub container_name: &'a str,
    pub platform: &'a str,
    pub ports: &'a [PortBinding],
    pub mounts: &'a [BindMount],
    pub command: &'a [String],
}

pub(crate) fn docker_script(spec: &ContainerSpec<'_>) -> String {
    let mut lines = vec![
        "exec docker run -d".to_string(),
        format!("  --name {}", shell_quote(spec.container_name)),
        "  --restart unless-stopped".to_string(),
        format!("  --platform {}", shell_quote(spec.platform)),
    ];
    for port in spec.ports {
        lines.push(format!("  -p {}:{}", port.host, port.container));
    }
    for mount in spec.mounts {
        let arg = format!("{}:{}", mount.host.display(), mount.container.display());
        lines.push(format!("  -v {}", shell_quote(&arg)));
    }
    lines.push(format!(
        "  {} {}",
        shell_quote(spec.image),
        shell_join(spec.command)
    ));
    format!(
        "#!/bin/sh\n# Starts the node container {}.\nset -e\n{}\n",
        spec.container_name,
        lines.join(" \\\n")
    )
}
