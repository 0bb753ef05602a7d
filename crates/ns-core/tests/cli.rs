//! CLI tests for ns-core.
//!
//! Every test pins the chain profile through a temp config directory so the
//! host's own profile never leaks in. Nothing here needs a daemon, network
//! access or root.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a Command for the ns-core binary with an isolated profile lookup.
fn ns_core(config: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ns-core").expect("ns-core binary should exist");
    cmd.env_remove("NODE_SETUP_PROFILE")
        .env_remove("NODE_SETUP_HOME")
        .env("NODE_SETUP_CONFIG_DIR", config.path())
        .env("XDG_CONFIG_HOME", config.path())
        .env("NO_COLOR", "1");
    cmd
}

fn write_answers(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("answers.toml");
    fs::write(&path, body).unwrap();
    path
}

fn rpc_answers(home: &Path) -> String {
    format!(
        "architecture = \"amd64\"\nmoniker = \"cli-node\"\nnode_type = \"rpc\"\n\
         service_manager = \"docker\"\nhome = \"{}\"\n",
        home.display()
    )
}

// ============================================================================
// Informational commands
// ============================================================================

mod info {
    use super::*;

    #[test]
    fn version_json_has_schema_versions() {
        let config = TempDir::new().unwrap();
        ns_core(&config)
            .args(["-f", "json", "version"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("\"schema_version\"")
                    .and(predicate::str::contains("profile_schema_version")),
            );
    }

    #[test]
    fn schema_describes_answers_file() {
        let config = TempDir::new().unwrap();
        ns_core(&config)
            .arg("schema")
            .assert()
            .success()
            .stdout(
                predicate::str::contains("\"node_type\"")
                    .and(predicate::str::contains("\"state_sync\""))
                    .and(predicate::str::contains("\"service_manager\"")),
            );
    }

    #[test]
    fn completions_generate_for_bash() {
        let config = TempDir::new().unwrap();
        ns_core(&config)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("ns-core"));
    }
}

// ============================================================================
// Argument errors
// ============================================================================

mod invalid_args {
    use super::*;

    #[test]
    fn unknown_command_fails() {
        let config = TempDir::new().unwrap();
        ns_core(&config)
            .arg("nonexistent-command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn unknown_node_type_fails() {
        let config = TempDir::new().unwrap();
        ns_core(&config)
            .args(["render", "--node-type", "sentry"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("sentry"));
    }

    #[test]
    fn genesis_file_and_url_conflict() {
        let config = TempDir::new().unwrap();
        ns_core(&config)
            .args([
                "install",
                "--dry-run",
                "--genesis-file",
                "/tmp/genesis.json",
                "--genesis-url",
                "https://example.invalid/genesis",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot be used with"));
    }

    #[test]
    fn misspelled_answers_key_is_args_error() {
        let config = TempDir::new().unwrap();
        let answers = write_answers(config.path(), "node_typ = \"rpc\"\n");
        ns_core(&config)
            .args(["-f", "json", "render", "--assume-supervisor", "--answers"])
            .arg(&answers)
            .assert()
            .code(10)
            .stdout(predicate::str::contains("\"code\": 21"));
    }

    #[test]
    fn missing_profile_file_is_config_error() {
        let config = TempDir::new().unwrap();
        ns_core(&config)
            .args(["check", "--profile", "/nonexistent/profile.toml"])
            .assert()
            .code(13);
    }
}

// ============================================================================
// render
// ============================================================================

mod render {
    use super::*;

    #[test]
    fn rpc_docker_render_opens_rpc_and_publishes_ports() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let answers = write_answers(config.path(), &rpc_answers(home.path()));
        ns_core(&config)
            .args(["-f", "json", "render", "--assume-supervisor", "--answers"])
            .arg(&answers)
            .assert()
            .success()
            .stdout(
                predicate::str::contains("tcp://0.0.0.0:26657")
                    .and(predicate::str::contains("container_launch"))
                    .and(predicate::str::contains("docker-run.sh")),
            );
        // render writes nothing
        assert!(!home.path().join("config").exists());
    }

    #[test]
    fn flags_override_answers_file() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let answers = write_answers(config.path(), &rpc_answers(home.path()));
        ns_core(&config)
            .args(["-f", "json", "render", "--assume-supervisor", "--answers"])
            .arg(&answers)
            .args(["--node-type", "archive", "--service-manager", "none"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("pruning = \\\"nothing\\\"")
                    .and(predicate::str::contains("container_launch").not()),
            );
    }

    #[test]
    fn custom_node_type_exits_manual_action() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        ns_core(&config)
            .args(["-f", "summary", "render", "--assume-supervisor"])
            .args(["--node-type", "custom", "--service-manager", "none"])
            .arg("--home")
            .arg(home.path())
            .assert()
            .code(1)
            .stdout(predicate::str::contains("manual edit required"));
    }

    #[test]
    fn incomplete_state_sync_is_config_error() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let answers = write_answers(
            config.path(),
            &format!(
                "node_type = \"full\"\nsync_mode = \"state-sync\"\nservice_manager = \"none\"\n\
                 home = \"{}\"\n\n[state_sync]\nrpc_servers = [\"https://rpc.nodechain.network\"]\n\
                 trust_height = 1000\n",
                home.path().display()
            ),
        );
        ns_core(&config)
            .args(["-f", "json", "render", "--assume-supervisor", "--answers"])
            .arg(&answers)
            .assert()
            .code(13)
            .stdout(predicate::str::contains("\"code\": 31"));
    }

    #[test]
    fn supervisor_manager_without_supervisor_is_capability_error() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        // Without --assume-supervisor the host is detected; containers and
        // CI runners rarely run systemd as PID 1, so only assert when the
        // command is rejected.
        let output = ns_core(&config)
            .args(["-f", "exitcode", "render", "--service-manager", "systemd"])
            .arg("--home")
            .arg(home.path())
            .output()
            .unwrap();
        let code = output.status.code().unwrap();
        assert!(code == 0 || code == 11, "unexpected exit code {}", code);
        assert!(output.stdout.is_empty());
    }
}

// ============================================================================
// patch
// ============================================================================

mod patch {
    use super::*;

    /// Render a full node and place its documents under `<home>/config`.
    fn seed_home(config: &TempDir, home: &Path) {
        let output = ns_core(config)
            .args(["-f", "json", "render", "--assume-supervisor"])
            .args(["--node-type", "full", "--service-manager", "none"])
            .arg("--home")
            .arg(home)
            .output()
            .unwrap();
        assert!(output.status.success());
        let preview: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let dir = home.join("config");
        fs::create_dir_all(&dir).unwrap();
        for (file, key) in [("config.toml", "config_toml"), ("app.toml", "app_toml")] {
            let text = preview["documents"][key].as_str().unwrap();
            fs::write(dir.join(file), text).unwrap();
        }
    }

    #[test]
    fn archive_profile_rewrites_pruning() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        seed_home(&config, home.path());

        ns_core(&config)
            .args(["-f", "summary", "patch", "--node-type", "archive", "--home"])
            .arg(home.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("2 files written"));

        let app = fs::read_to_string(home.path().join("config/app.toml")).unwrap();
        assert!(app.contains("pruning = \"nothing\""));
    }

    #[test]
    fn dry_run_leaves_files_alone() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        seed_home(&config, home.path());
        let before = fs::read_to_string(home.path().join("config/config.toml")).unwrap();

        ns_core(&config)
            .args(["patch", "--node-type", "validator", "--dry-run", "--home"])
            .arg(home.path())
            .assert()
            .success();

        let after = fs::read_to_string(home.path().join("config/config.toml")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn missing_documents_fail() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        ns_core(&config)
            .args(["patch", "--node-type", "rpc", "--home"])
            .arg(home.path())
            .assert()
            .failure()
            .stderr(
                predicate::str::contains("config.toml")
                    .or(predicate::str::contains("No such file")),
            );
    }
}

// ============================================================================
// check / install
// ============================================================================

mod check {
    use super::*;

    #[test]
    fn builtin_profile_passes() {
        let config = TempDir::new().unwrap();
        ns_core(&config)
            .args(["-f", "json", "check"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("\"profile_source\": \"builtin_default\"")
                    .and(predicate::str::contains("nodechain_9000-1")),
            );
    }

    #[test]
    fn profile_file_in_config_dir_is_used() {
        let config = TempDir::new().unwrap();
        fs::write(
            config.path().join("profile.toml"),
            "chain_id = \"clitest-1\"\ndaemon_name = \"clitestd\"\n",
        )
        .unwrap();
        ns_core(&config)
            .args(["-f", "json", "check"])
            .assert()
            .success()
            .stdout(predicate::str::contains("clitest-1"));
    }

    #[test]
    fn bad_answers_fail_check() {
        let config = TempDir::new().unwrap();
        let answers = write_answers(config.path(), "external_address = \"not an address\"\n");
        ns_core(&config)
            .args(["check", "--answers"])
            .arg(&answers)
            .assert()
            .code(13)
            .stdout(predicate::str::contains("FAIL"));
    }
}

mod install {
    use super::*;

    /// A profile whose daemon is a stub script in a temp bin dir.
    fn stub_profile(config: &TempDir) -> PathBuf {
        let bin = config.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let daemon = bin.join("stubd");
        fs::write(&daemon, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&daemon, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(
            config.path().join("profile.toml"),
            format!(
                "chain_id = \"stub-1\"\ndaemon_name = \"stubd\"\nbinary_dir = \"{}\"\n",
                bin.display()
            ),
        )
        .unwrap();
        daemon
    }

    #[test]
    fn dry_run_reports_documents_and_writes_nothing() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        stub_profile(&config);
        let genesis = config.path().join("genesis.json");
        fs::write(
            &genesis,
            r#"{"chain_id":"stub-1","genesis_time":"2024-03-01T12:00:00Z","app_state":{}}"#,
        )
        .unwrap();

        ns_core(&config)
            .args(["-f", "json", "install", "--dry-run", "--yes"])
            .args(["--node-type", "full", "--service-manager", "none"])
            .arg("--genesis-file")
            .arg(&genesis)
            .arg("--home")
            .arg(home.path())
            .assert()
            .success()
            .stdout(
                predicate::str::contains("\"dry_run\": true")
                    .and(predicate::str::contains("\"genesis_placeholder\": false"))
                    .and(predicate::str::contains("\"config_toml\"")),
            );
        assert!(!home.path().join("config").exists());
    }

    #[test]
    fn missing_daemon_fails_binary_stage() {
        let config = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        fs::write(
            config.path().join("profile.toml"),
            format!(
                "chain_id = \"stub-1\"\ndaemon_name = \"nsd-absent-daemon\"\nbinary_dir = \"{}\"\n",
                config.path().join("empty-bin").display()
            ),
        )
        .unwrap();

        ns_core(&config)
            .args(["-f", "json", "install", "--dry-run", "--yes"])
            .args(["--service-manager", "none", "--home"])
            .arg(home.path())
            .assert()
            .code(11)
            .stdout(predicate::str::contains("\"stage\": \"binary\""));
    }
}
