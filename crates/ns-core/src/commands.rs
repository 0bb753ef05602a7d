//! Commands that work without running the install pipeline.

use ns_common::{Error, NodeType, OptionAnswers, OptionSet, ServiceManager};
use ns_config::validate::validate_profile;
use ns_config::{
    ChainProfile, ConfigDocument, ConfigPatcher, ConfigTemplate, DocumentKind, GenesisInput,
    ProfilePath, ProfileSource, SyncPlan,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::capabilities::DetectionReport;
use crate::collab::{ArtifactSink, Clock, WrittenArtifact};
use crate::orchestrator::RenderedDocuments;
use crate::prompt::options_from_answers;
use crate::service::{LaunchPlan, ServicePlanner};

/// Parse answers file text (TOML).
pub fn parse_answers(text: &str) -> Result<OptionAnswers, Error> {
    toml::from_str(text).map_err(|e| Error::Answers(e.message().to_string()))
}

/// Read and parse an answers file.
pub fn load_answers(path: &Path) -> Result<OptionAnswers, Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Answers(format!("{}: {}", path.display(), e)))?;
    let answers = parse_answers(&text)
        .map_err(|e| Error::Answers(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), "answers loaded");
    Ok(answers)
}

// ============================================================================
// render
// ============================================================================

/// Documents and launch plan derived from an option set, nothing written.
#[derive(Debug, Clone, Serialize)]
pub struct RenderPreview {
    pub chain_id: String,
    pub options: OptionSet,
    pub applied: Vec<String>,
    pub notices: Vec<String>,
    pub manual_edit_required: bool,
    pub launch: LaunchPlan,
    pub documents: RenderedDocuments,
}

/// Build and patch the documents as a first start would, and plan the
/// service. The genesis is the placeholder.
pub fn render_preview(
    options: OptionSet,
    profile: &ChainProfile,
    clock: &dyn Clock,
) -> Result<RenderPreview, Error> {
    let set = ConfigTemplate::build(&options, profile, GenesisInput::none(clock.now()))?;
    let sync = SyncPlan::from_options(&options);
    let outcome = ConfigPatcher::patch(set.consensus, set.app, options.node_type(), Some(&sync))?;
    let launch = ServicePlanner::new(profile).plan(&options);

    let mut notices = outcome.notices;
    notices.extend(launch.notes.iter().cloned());

    Ok(RenderPreview {
        chain_id: profile.chain_id.clone(),
        documents: RenderedDocuments {
            config_toml: outcome.consensus.render(),
            app_toml: outcome.app.render(),
            genesis_json: set.genesis.render(),
        },
        applied: outcome.applied,
        manual_edit_required: outcome.manual_edit_required,
        notices,
        launch,
        options,
    })
}

// ============================================================================
// patch
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    pub home: PathBuf,
    pub node_type: NodeType,
    pub applied: Vec<String>,
    pub notices: Vec<String>,
    pub manual_edit_required: bool,
    pub artifacts: Vec<WrittenArtifact>,
}

/// Re-apply a node-type profile to the documents already in `<home>/config`.
///
/// Keys are found structurally, so reformatted files still patch; a key the
/// profile needs but the file lacks is an error and nothing is written.
pub fn repatch_home(
    home: &Path,
    node_type: NodeType,
    sink: &mut dyn ArtifactSink,
) -> Result<PatchReport, Error> {
    let config_dir = home.join("config");
    let read = |kind: DocumentKind| -> Result<ConfigDocument, Error> {
        let path = config_dir.join(kind.file_name());
        let text = std::fs::read_to_string(&path)?;
        Ok(ConfigDocument::parse(kind, &text)?)
    };
    let consensus = read(DocumentKind::Consensus)?;
    let app = read(DocumentKind::App)?;

    let outcome = ConfigPatcher::patch(consensus, app, node_type, None)?;

    let mut artifacts = Vec::new();
    if !outcome.manual_edit_required {
        for doc in [&outcome.consensus, &outcome.app] {
            let path = config_dir.join(doc.kind().file_name());
            artifacts.push(sink.write(&path, doc.render().as_bytes(), 0o644)?);
        }
    }
    info!(
        home = %home.display(),
        node_type = node_type.as_str(),
        keys = outcome.applied.len(),
        "documents re-patched"
    );

    Ok(PatchReport {
        home: home.to_path_buf(),
        node_type,
        applied: outcome.applied,
        notices: outcome.notices,
        manual_edit_required: outcome.manual_edit_required,
        artifacts,
    })
}

// ============================================================================
// check
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckItem {
    pub check: &'static str,
    pub status: CheckStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub chain_id: String,
    pub profile_source: ProfileSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_path: Option<PathBuf>,
    pub detection: DetectionReport,
    pub available_managers: Vec<ServiceManager>,
    pub checks: Vec<CheckItem>,
}

impl CheckReport {
    pub fn ok(&self) -> bool {
        !self
            .checks
            .iter()
            .any(|c| matches!(c.status, CheckStatus::Error))
    }
}

/// Validate the profile, the host and optionally an answers file.
pub fn check(
    profile: &ChainProfile,
    profile_path: &ProfilePath,
    detection: DetectionReport,
    answers: Option<&Path>,
) -> CheckReport {
    let env = detection.capabilities;
    let mut checks = Vec::new();

    checks.push(match validate_profile(profile) {
        Ok(()) => CheckItem {
            check: "profile",
            status: CheckStatus::Ok,
            message: format!("{} ({})", profile.chain_id, profile_path.source),
        },
        Err(e) => CheckItem {
            check: "profile",
            status: CheckStatus::Error,
            message: e.to_string(),
        },
    });

    checks.push(if env.has_service_supervisor {
        CheckItem {
            check: "supervisor",
            status: CheckStatus::Ok,
            message: "systemd is running; cosmovisor and systemd are available".to_string(),
        }
    } else {
        CheckItem {
            check: "supervisor",
            status: CheckStatus::Warning,
            message: "no service supervisor; only direct, screen, tmux, docker or none".to_string(),
        }
    });

    if !env.is_root {
        checks.push(CheckItem {
            check: "privileges",
            status: CheckStatus::Warning,
            message: format!(
                "not running as root; writing units to {} may fail",
                profile.unit_dir.display()
            ),
        });
    }

    if let Some(path) = answers {
        let result = load_answers(path).and_then(|a| options_from_answers(env, profile, a));
        checks.push(match result {
            Ok(options) => CheckItem {
                check: "answers",
                status: CheckStatus::Ok,
                message: format!(
                    "{} node, {} sync, {} service",
                    options.node_type(),
                    options.sync_mode(),
                    options.service_manager()
                ),
            },
            Err(e) => CheckItem {
                check: "answers",
                status: CheckStatus::Error,
                message: e.to_string(),
            },
        });
    }

    CheckReport {
        chain_id: profile.chain_id.clone(),
        profile_source: profile_path.source.clone(),
        profile_path: profile_path.path.clone(),
        available_managers: ServiceManager::available(&env),
        detection,
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{FixedClock, MemoryArtifactSink};
    use chrono::{TimeZone, Utc};
    use ns_common::{Architecture, EnvironmentCapabilities, OptionSetBuilder};
    use std::fs;
    use tempfile::TempDir;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
    }

    fn options(node_type: NodeType, manager: ServiceManager) -> OptionSet {
        let mut b = OptionSetBuilder::new(EnvironmentCapabilities::with_supervisor());
        b.architecture(Architecture::Amd64).node_type(node_type);
        b.service_manager(manager).unwrap();
        b.home("/srv/noded").unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_parse_answers_rejects_unknown_fields() {
        let err = parse_answers("node_typ = \"rpc\"\n").unwrap_err();
        assert_eq!(err.code(), 21);
        let answers = parse_answers("node_type = \"rpc\"\nservice_manager = \"docker\"\n").unwrap();
        assert_eq!(answers.node_type, Some(NodeType::Rpc));
    }

    #[test]
    fn test_render_preview_is_deterministic() {
        let profile = ChainProfile::builtin();
        let preview = || {
            render_preview(options(NodeType::Rpc, ServiceManager::Docker), &profile, &clock())
                .unwrap()
        };
        let a = preview();
        let b = preview();
        assert_eq!(a.documents, b.documents);
        assert_eq!(a.launch, b.launch);
        assert!(a.documents.config_toml.contains("tcp://0.0.0.0:26657"));
    }

    #[test]
    fn test_repatch_preserves_other_keys() {
        let profile = ChainProfile::builtin();
        let preview =
            render_preview(options(NodeType::Full, ServiceManager::None), &profile, &clock())
                .unwrap();
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config");
        fs::create_dir_all(&config).unwrap();
        let consensus = preview
            .documents
            .config_toml
            .replace("[p2p]", "[p2p]\n# operator note\ncustom_key = \"kept\"");
        fs::write(config.join("config.toml"), consensus).unwrap();
        fs::write(config.join("app.toml"), &preview.documents.app_toml).unwrap();

        let mut sink = MemoryArtifactSink::new();
        let report = repatch_home(dir.path(), NodeType::Archive, &mut sink).unwrap();
        assert!(!report.applied.is_empty());
        assert_eq!(report.artifacts.len(), 2);

        let app = sink.get_str(&config.join("app.toml")).unwrap();
        assert!(app.contains("pruning = \"nothing\""));
        let consensus = sink.get_str(&config.join("config.toml")).unwrap();
        assert!(consensus.contains("custom_key = \"kept\""));
    }

    #[test]
    fn test_repatch_sdk_app_toml_with_nested_tables() {
        let profile = ChainProfile::builtin();
        let preview =
            render_preview(options(NodeType::Full, ServiceManager::None), &profile, &clock())
                .unwrap();
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config");
        fs::create_dir_all(&config).unwrap();
        let app = format!(
            "{}\n{}",
            preview.documents.app_toml,
            r#"###############################################################################
###                        Streaming                                        ###
###############################################################################

[streaming]

[streaming.abci]
keys = []
plugin = ""
stop-node-on-err = true

[wasm]
query_gas_limit = 300000
"#
        );
        fs::write(config.join("config.toml"), &preview.documents.config_toml).unwrap();
        fs::write(config.join("app.toml"), app).unwrap();

        let mut sink = MemoryArtifactSink::new();
        let report = repatch_home(dir.path(), NodeType::Archive, &mut sink).unwrap();
        assert_eq!(report.artifacts.len(), 2);

        let app = sink.get_str(&config.join("app.toml")).unwrap();
        assert!(app.contains("pruning = \"nothing\""));
        assert!(
            app.contains("[streaming.abci]\nkeys = []\nplugin = \"\"\nstop-node-on-err = true\n")
        );
        assert!(app.contains("[wasm]\nquery_gas_limit = 300000\n"));
    }

    #[test]
    fn test_repatch_missing_key_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config");
        fs::create_dir_all(&config).unwrap();
        fs::write(config.join("config.toml"), "moniker = \"x\"\n").unwrap();
        fs::write(config.join("app.toml"), "minimum-gas-prices = \"\"\n").unwrap();

        let mut sink = MemoryArtifactSink::new();
        let err = repatch_home(dir.path(), NodeType::Validator, &mut sink).unwrap_err();
        assert!(matches!(err, Error::MissingKey { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_check_flags_bad_answers() {
        let dir = TempDir::new().unwrap();
        let answers = dir.path().join("answers.toml");
        fs::write(&answers, "service_manager = \"cosmovisor\"\n").unwrap();
        let detection = DetectionReport {
            capabilities: EnvironmentCapabilities::without_supervisor(),
            tools: Vec::new(),
            init_process: None,
            effective_uid: 1000,
        };
        let report = check(
            &ChainProfile::builtin(),
            &ProfilePath::default(),
            detection,
            Some(&answers),
        );
        assert!(!report.ok());
        assert!(!report.available_managers.contains(&ServiceManager::Systemd));
        assert!(report.checks.iter().any(|c| c.check == "privileges"));
    }
}
