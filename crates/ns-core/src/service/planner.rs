//! Service manager → launch plan.

use ns_common::{NodeType, OptionSet, ServiceManager};
use ns_config::ChainProfile;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::render::{self, ContainerSpec, UnitSpec};
use super::{
    BindMount, LaunchPlan, Lifecycle, Multiplexer, PortBinding, RestartPolicy, ServiceArtifact,
    ServicePlan, API_PORT, JSON_RPC_PORT, P2P_PORT, RPC_PORT,
};

/// Name of the cosmovisor environment file inside the node home.
pub const COSMOVISOR_ENV_FILE: &str = "cosmovisor.env";

/// Launch script for screen/tmux sessions, inside the node home.
pub const SESSION_SCRIPT: &str = "launch.sh";

/// Launch script for the container, inside the node home.
pub const DOCKER_SCRIPT: &str = "docker-run.sh";

const DEFAULT_COSMOVISOR: &str = "/usr/local/bin/cosmovisor";

/// Builds the [`LaunchPlan`] for an option set.
#[derive(Debug, Clone)]
pub struct ServicePlanner {
    daemon_name: String,
    daemon_path: PathBuf,
    cosmovisor_path: PathBuf,
    docker_image: String,
    unit_dir: PathBuf,
    user: Option<String>,
    restart: RestartPolicy,
}

impl ServicePlanner {
    pub fn new(profile: &ChainProfile) -> Self {
        ServicePlanner {
            daemon_name: profile.daemon_name.clone(),
            daemon_path: profile.daemon_path(),
            cosmovisor_path: PathBuf::from(DEFAULT_COSMOVISOR),
            docker_image: profile.docker_image.clone(),
            unit_dir: profile.unit_dir.clone(),
            user: None,
            restart: RestartPolicy::default(),
        }
    }

    /// Directory receiving unit files.
    pub fn with_unit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.unit_dir = dir.into();
        self
    }

    /// Account the unit runs as; omitted from the unit when `None`.
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    /// Daemon location when it is not the profile's install path.
    pub fn with_daemon_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.daemon_path = path.into();
        self
    }

    pub fn with_cosmovisor_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cosmovisor_path = path.into();
        self
    }

    pub fn plan(&self, options: &OptionSet) -> LaunchPlan {
        let home = options.home();
        let manager = options.service_manager();
        let mut notes = Vec::new();
        let mut artifacts = Vec::new();

        let (plan, lifecycle) = match manager {
            ServiceManager::Cosmovisor => {
                let env_path = home.join(COSMOVISOR_ENV_FILE);
                let exec = vec![
                    self.cosmovisor_path.display().to_string(),
                    "run".to_string(),
                    "start".to_string(),
                    "--home".to_string(),
                    home.display().to_string(),
                ];
                notes.push(format!(
                    "cosmovisor runs the daemon staged in {}",
                    home.join("cosmovisor").join("genesis").join("bin").display()
                ));
                let env = Some((env_path, self.cosmovisor_env_vars(home)));
                self.systemd_plan(options, exec, env, "cosmovisor", &mut artifacts, &mut notes)
            }
            ServiceManager::Systemd => {
                let exec = self.start_command(home);
                self.systemd_plan(options, exec, None, "systemd", &mut artifacts, &mut notes)
            }
            ServiceManager::Screen | ServiceManager::Tmux => {
                let multiplexer = if manager == ServiceManager::Screen {
                    Multiplexer::Screen
                } else {
                    Multiplexer::Tmux
                };
                let session = self.daemon_name.clone();
                let command = self.start_command(home);
                let script_path = home.join(SESSION_SCRIPT);
                artifacts.push(ServiceArtifact {
                    path: script_path.clone(),
                    contents: render::session_script(multiplexer, &session, &command),
                    mode: 0o755,
                });
                let lifecycle = session_lifecycle(multiplexer, &session, &script_path);
                (
                    ServicePlan::SessionLaunch {
                        multiplexer,
                        session_name: session,
                        command,
                        script_path,
                    },
                    lifecycle,
                )
            }
            ServiceManager::Docker => {
                let container_home = PathBuf::from(format!("/root/.{}", self.daemon_name));
                let ports = container_ports();
                let mounts = vec![BindMount {
                    host: home.to_path_buf(),
                    container: container_home.clone(),
                }];
                let command = vec![
                    "start".to_string(),
                    "--home".to_string(),
                    container_home.display().to_string(),
                ];
                let platform = format!("linux/{}", options.architecture());
                let script_path = home.join(DOCKER_SCRIPT);
                artifacts.push(ServiceArtifact {
                    path: script_path.clone(),
                    contents: render::docker_script(&ContainerSpec {
                        image: &self.docker_image,
                        container_name: &self.daemon_name,
                        platform: &platform,
                        ports: &ports,
                        mounts: &mounts,
                        command: &command,
                    }),
                    mode: 0o755,
                });
                if options.node_type() != NodeType::Rpc {
                    notes.push(format!(
                        "rpc.laddr listens on 127.0.0.1 inside the container; \
                         port {} is only reachable for rpc nodes",
                        RPC_PORT
                    ));
                }
                let lifecycle = Lifecycle {
                    start: Some(format!(
                        "sh {}",
                        render::shell_quote(&script_path.display().to_string())
                    )),
                    stop: Some(format!("docker stop {}", self.daemon_name)),
                    status: Some(format!("docker ps --filter name=^{}$", self.daemon_name)),
                    logs: Some(format!("docker logs -f {}", self.daemon_name)),
                };
                (
                    ServicePlan::ContainerLaunch {
                        image: self.docker_image.clone(),
                        container_name: self.daemon_name.clone(),
                        platform,
                        ports,
                        mounts,
                        command,
                        script_path,
                    },
                    lifecycle,
                )
            }
            ServiceManager::Direct => {
                let command = self.start_command(home);
                notes.push("the node runs in the foreground; keep the terminal open".to_string());
                let lifecycle = Lifecycle {
                    start: Some(render::shell_join(&command)),
                    ..Default::default()
                };
                (ServicePlan::DirectLaunch { command }, lifecycle)
            }
            ServiceManager::None => {
                notes.push(format!(
                    "no service configured; start the node with: {}",
                    render::shell_join(&self.start_command(home))
                ));
                (ServicePlan::NoService, Lifecycle::default())
            }
        };

        LaunchPlan {
            manager,
            architecture: options.architecture(),
            plan,
            lifecycle,
            artifacts,
            notes,
        }
    }

    fn start_command(&self, home: &Path) -> Vec<String> {
        vec![
            self.daemon_path.display().to_string(),
            "start".to_string(),
            "--home".to_string(),
            home.display().to_string(),
        ]
    }

    /// Variables cosmovisor reads from the unit's environment.
    fn cosmovisor_env_vars(&self, home: &Path) -> BTreeMap<String, String> {
        [
            ("DAEMON_NAME", self.daemon_name.clone()),
            ("DAEMON_HOME", home.display().to_string()),
            ("DAEMON_ALLOW_DOWNLOAD_BINARIES", "false".to_string()),
            ("DAEMON_RESTART_AFTER_UPGRADE", "true".to_string()),
            ("UNSAFE_SKIP_BACKUP", "true".to_string()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
    }

    fn systemd_plan(
        &self,
        options: &OptionSet,
        exec_start: Vec<String>,
        environment: Option<(PathBuf, BTreeMap<String, String>)>,
        runner: &str,
        artifacts: &mut Vec<ServiceArtifact>,
        notes: &mut Vec<String>,
    ) -> (ServicePlan, Lifecycle) {
        let (environment_file, env_vars) = match environment {
            Some((path, vars)) => {
                artifacts.push(ServiceArtifact {
                    path: path.clone(),
                    contents: render::environment_file(&vars),
                    mode: 0o644,
                });
                (Some(path), vars)
            }
            None => (None, BTreeMap::new()),
        };
        let unit_name = format!("{}.service", self.daemon_name);
        let unit_path = self.unit_dir.join(&unit_name);
        let description = format!(
            "{} {} node ({})",
            self.daemon_name,
            options.node_type(),
            runner
        );
        artifacts.push(ServiceArtifact {
            path: unit_path.clone(),
            contents: render::systemd_unit(&UnitSpec {
                description: &description,
                user: self.user.as_deref(),
                working_directory: options.home(),
                environment_file: environment_file.as_deref(),
                exec_start: &exec_start,
                restart: self.restart,
            }),
            mode: 0o644,
        });
        notes.push(format!(
            "enable and start the unit: systemctl daemon-reload && systemctl enable --now {}",
            unit_name
        ));

        let lifecycle = Lifecycle {
            start: Some(format!("systemctl start {}", unit_name)),
            stop: Some(format!("systemctl stop {}", unit_name)),
            status: Some(format!("systemctl status {}", unit_name)),
            logs: Some(format!("journalctl -u {} -f", unit_name)),
        };
        (
            ServicePlan::SystemdUnit {
                unit_name,
                unit_path,
                exec_start,
                user: self.user.clone(),
                working_directory: options.home().to_path_buf(),
                env_vars,
                environment_file,
                restart_policy: self.restart,
            },
            lifecycle,
        )
    }
}

fn container_ports() -> Vec<PortBinding> {
    [
        (P2P_PORT, "p2p"),
        (RPC_PORT, "rpc"),
        (API_PORT, "api"),
        (JSON_RPC_PORT, "json-rpc"),
    ]
    .into_iter()
    .map(|(port, purpose)| PortBinding {
        host: port,
        container: port,
        purpose,
    })
    .collect()
}

fn session_lifecycle(multiplexer: Multiplexer, session: &str, script: &Path) -> Lifecycle {
    let start = Some(format!("sh {}", render::shell_quote(&script.display().to_string())));
    match multiplexer {
        Multiplexer::Screen => Lifecycle {
            start,
            stop: Some(format!("screen -S {} -X quit", session)),
            status: Some(format!("screen -ls {}", session)),
            logs: Some(format!("screen -r {}", session)),
        },
        Multiplexer::Tmux => Lifecycle {
            start,
            stop: Some(format!("tmux kill-session -t {}", session)),
            status: Some(format!("tmux has-session -t {}", session)),
            logs: Some(format!("tmux attach -t {}", session)),
        },
    }
}
