//! The install pipeline.
//!
//! Stages run strictly in [`Stage::PIPELINE`] order. Each one logs
//! `stage.started` and `stage.finished` (or `stage.skipped` / `stage.failed`);
//! the first failure halts the run and is returned as a [`PipelineError`]
//! naming the stage. Artifacts written before the failure stay in place and
//! are listed in the error.

use chrono::{DateTime, Utc};
use ns_common::{Error, NodeType, OptionSet, ServiceManager, SyncMode};
use ns_config::{
    ChainProfile, ConfigPatcher, ConfigTemplate, DocumentKind, GenesisInput, PatchOutcome,
    SyncPlan, TemplateSet,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

use crate::collab::node::home_args;
use crate::collab::{ArtifactSink, Clock, GenesisFetcher, NodeBinary, WrittenArtifact};
use crate::exit_codes::ExitCode;
use crate::logging::{event_names, LogContext, Stage};
use crate::service::{LaunchPlan, ServicePlanner};

/// Pipeline stages, in order.
pub type PipelineStage = Stage;

/// Report schema version.
pub const REPORT_SCHEMA_VERSION: &str = "1.0.0";

/// Marker written by the daemon's `init`.
const NODE_KEY_FILE: &str = "config/node_key.json";

/// Present once the node has stored blocks.
const BLOCKSTORE_DIR: &str = "data/blockstore.db";

/// Genesis written by the daemon's `init`.
const GENESIS_FILE: &str = "config/genesis.json";

/// A stage failure.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: Error,
    /// Artifacts written before the failure.
    pub written: Vec<WrittenArtifact>,
}

/// Where the genesis document comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenesisSource {
    /// The profile's `genesis_url`, if any.
    #[default]
    Profile,
    Url(String),
    File(PathBuf),
}

/// Run settings that are not operator options.
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    pub genesis: GenesisSource,
    /// Render everything, write nothing, run no daemon command.
    pub dry_run: bool,
    pub unit_dir: Option<PathBuf>,
    /// `User=` of the systemd unit. The node home is handed over to this
    /// account after it is written.
    pub service_user: Option<String>,
}

/// The non-root account the installer was started from, if any.
pub fn service_user_from_env() -> Option<String> {
    ["SUDO_USER", "USER"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|user| user.trim().to_string())
        .find(|user| !user.is_empty() && user != "root")
}

/// Borrowed collaborators for one run.
pub struct Collaborators<'a> {
    pub node: &'a mut dyn NodeBinary,
    pub genesis: &'a dyn GenesisFetcher,
    pub sink: &'a mut dyn ArtifactSink,
    pub clock: &'a dyn Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Finished,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What a stage produced and how to record it.
struct Step<T> {
    value: T,
    status: StageStatus,
    detail: Option<String>,
}

impl<T> Step<T> {
    fn done(value: T) -> Self {
        Step {
            value,
            status: StageStatus::Finished,
            detail: None,
        }
    }

    fn with_detail(value: T, detail: impl Into<String>) -> Self {
        Step {
            value,
            status: StageStatus::Finished,
            detail: Some(detail.into()),
        }
    }

    fn skipped(value: T, reason: impl Into<String>) -> Self {
        Step {
            value,
            status: StageStatus::Skipped,
            detail: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryRecord {
    pub daemon_path: PathBuf,
    pub downloaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cosmovisor_path: Option<PathBuf>,
}

/// Rendered documents, reported on dry runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDocuments {
    pub config_toml: String,
    pub app_toml: String,
    pub genesis_json: String,
}

/// Result of a completed install.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub schema_version: String,
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub dry_run: bool,
    pub chain_id: String,
    pub daemon_name: String,
    pub options: OptionSet,
    pub stages: Vec<StageRecord>,
    pub binary: BinaryRecord,
    pub genesis_placeholder: bool,
    /// `file:key` of every patch write.
    pub applied: Vec<String>,
    pub artifacts: Vec<WrittenArtifact>,
    pub launch: LaunchPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validator_address: Option<String>,
    pub warnings: Vec<String>,
    pub notices: Vec<String>,
    /// Documents need hand editing or a snapshot must be placed.
    pub manual_action_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<RenderedDocuments>,
}

impl InstallReport {
    pub fn exit_code(&self) -> ExitCode {
        if self.manual_action_required {
            ExitCode::ManualActionRequired
        } else {
            ExitCode::Clean
        }
    }
}

/// Result of the patch stage.
struct Patched {
    outcome: PatchOutcome,
    first_start: bool,
}

/// Accumulated state between stages.
#[derive(Default)]
struct Progress {
    stages: Vec<StageRecord>,
    warnings: Vec<String>,
    notices: Vec<String>,
    written: Vec<WrittenArtifact>,
}

impl Progress {
    fn fail(&mut self, stage: Stage, source: Error) -> PipelineError {
        PipelineError {
            stage,
            source,
            written: std::mem::take(&mut self.written),
        }
    }
}

/// Drives one install.
pub struct Orchestrator<'a> {
    profile: &'a ChainProfile,
    request: InstallRequest,
    ctx: LogContext,
}

impl<'a> Orchestrator<'a> {
    pub fn new(profile: &'a ChainProfile, request: InstallRequest, ctx: LogContext) -> Self {
        Orchestrator {
            profile,
            request,
            ctx,
        }
    }

    /// Run every stage; `collect` supplies the option set.
    pub fn run(
        &self,
        collect: impl FnOnce() -> Result<OptionSet, Error>,
        collab: &mut Collaborators<'_>,
    ) -> Result<InstallReport, PipelineError> {
        crate::log_event!(
            self.ctx,
            INFO,
            event_names::INSTALL_STARTED,
            Stage::Init,
            "install started",
            chain_id = self.profile.chain_id.as_str(),
            dry_run = self.request.dry_run
        );
        let mut progress = Progress::default();

        let options = self.stage(&mut progress, Stage::Options, |p| {
            let options = collect()?;
            p.warnings.extend(options.warnings());
            Ok(Step::done(options))
        })?;

        let binary = self.stage(&mut progress, Stage::Binary, |p| {
            self.resolve_binary(&options, collab.node, p)
        })?;

        self.stage(&mut progress, Stage::NodeInit, |_| {
            self.init_home(&options, collab.node)
        })?;

        let genesis_input = self.stage(&mut progress, Stage::Genesis, |p| {
            Ok(Step::done(self.genesis_input(&options, collab.genesis, collab.clock, p)))
        })?;

        let template = self.stage(&mut progress, Stage::Template, |p| {
            let set = ConfigTemplate::build(&options, self.profile, genesis_input)?;
            if let Some(ref warning) = set.genesis_warning {
                self.genesis_degraded(warning);
                p.warnings.push(warning.clone());
            }
            Ok(Step::done(set))
        })?;

        let TemplateSet {
            consensus,
            app,
            genesis,
            ..
        } = template;

        let patched = self.stage(&mut progress, Stage::Patch, |p| {
            let patched = self.patch(&options, consensus, app)?;
            p.notices.extend(patched.outcome.notices.iter().cloned());
            let detail = format!("{} keys", patched.outcome.applied.len());
            Ok(Step::with_detail(patched, detail))
        })?;

        let launch = self.stage(&mut progress, Stage::Service, |p| {
            let launch = self.plan_service(&options, &binary);
            p.notices.extend(launch.notes.iter().cloned());
            if let Some(user) = launch.service_user() {
                if options.home().starts_with("/root") {
                    p.warnings.push(format!(
                        "{} is inside /root, which '{}' cannot enter; pick a home outside /root",
                        options.home().display(),
                        user
                    ));
                }
            }
            let detail = launch.plan.kind();
            Ok(Step::with_detail(launch, detail))
        })?;

        let documents = RenderedDocuments {
            config_toml: patched.outcome.consensus.render(),
            app_toml: patched.outcome.app.render(),
            genesis_json: genesis.render(),
        };

        self.stage(&mut progress, Stage::Emit, |p| {
            self.emit(&options, &binary, &documents, &launch, collab.sink, p)?;
            let detail = format!("{} artifacts", p.written.len());
            Ok(Step::with_detail((), detail))
        })?;

        let network_genesis = !genesis.is_placeholder() && self.has_genesis_source();
        let validator_address = self.stage(&mut progress, Stage::Keys, |p| {
            self.keys(&options, network_genesis, &launch, collab, p)
        })?;

        let snapshot_pending = patched.first_start && options.sync_mode() == SyncMode::Snapshot;
        let bootstrapped = options.validator().is_some_and(|v| v.bootstrap_genesis);
        let genesis_pending = genesis.is_placeholder() && !bootstrapped;
        if genesis_pending {
            progress.notices.push(format!(
                "replace {} with the network genesis before starting the node",
                options.home().join("config/genesis.json").display()
            ));
        }

        let report = InstallReport {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            run_id: self.ctx.run_id.clone(),
            generated_at: collab.clock.now(),
            dry_run: self.request.dry_run,
            chain_id: self.profile.chain_id.clone(),
            daemon_name: self.profile.daemon_name.clone(),
            manual_action_required: patched.outcome.manual_edit_required
                || snapshot_pending
                || genesis_pending,
            genesis_placeholder: genesis.is_placeholder(),
            applied: patched.outcome.applied,
            stages: progress.stages,
            binary,
            artifacts: progress.written,
            launch,
            validator_address,
            warnings: progress.warnings,
            notices: progress.notices,
            documents: self.request.dry_run.then_some(documents),
            options,
        };

        crate::log_event!(
            self.ctx,
            INFO,
            event_names::INSTALL_FINISHED,
            Stage::Keys,
            "install finished",
            artifacts = report.artifacts.len(),
            manual_action_required = report.manual_action_required
        );
        Ok(report)
    }

    /// Run one stage with its lifecycle events.
    fn stage<T>(
        &self,
        progress: &mut Progress,
        stage: Stage,
        f: impl FnOnce(&mut Progress) -> Result<Step<T>, Error>,
    ) -> Result<T, PipelineError> {
        crate::log_event!(self.ctx, DEBUG, event_names::STAGE_STARTED, stage, "stage started");
        let started = Instant::now();

        match f(progress) {
            Ok(Step {
                value,
                status,
                detail,
            }) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let detail_text = detail.clone().unwrap_or_default();
                match status {
                    StageStatus::Finished => crate::log_event!(
                        self.ctx,
                        INFO,
                        event_names::STAGE_FINISHED,
                        stage,
                        "stage complete",
                        duration_ms = duration_ms,
                        detail = detail_text.as_str()
                    ),
                    StageStatus::Skipped => crate::log_event!(
                        self.ctx,
                        INFO,
                        event_names::STAGE_SKIPPED,
                        stage,
                        "stage skipped",
                        reason = detail_text.as_str()
                    ),
                }
                progress.stages.push(StageRecord {
                    stage,
                    status,
                    duration_ms,
                    detail,
                });
                Ok(value)
            }
            Err(source) => {
                let reason = source.to_string();
                crate::log_event!(
                    self.ctx,
                    ERROR,
                    event_names::STAGE_FAILED,
                    stage,
                    "stage failed",
                    code = source.code(),
                    error = reason.as_str()
                );
                Err(progress.fail(stage, source))
            }
        }
    }

    fn resolve_binary(
        &self,
        options: &OptionSet,
        node: &mut dyn NodeBinary,
        progress: &mut Progress,
    ) -> Result<Step<BinaryRecord>, Error> {
        let cosmovisor = options.service_manager() == ServiceManager::Cosmovisor;
        let cosmovisor_path = if cosmovisor {
            match node.cosmovisor_path() {
                Some(path) => Some(path),
                None if self.request.dry_run => {
                    progress.warnings.push(
                        "cosmovisor is not installed; install it before starting".to_string(),
                    );
                    None
                }
                None => return Err(Error::BinaryUnavailable("cosmovisor".to_string())),
            }
        } else {
            None
        };

        if let Some(path) = node.daemon_path() {
            let detail = path.display().to_string();
            return Ok(Step::with_detail(
                BinaryRecord {
                    daemon_path: path,
                    downloaded: false,
                    cosmovisor_path,
                },
                detail,
            ));
        }

        let url = self
            .profile
            .binary_url(options.architecture())
            .ok_or_else(|| Error::BinaryUnavailable(self.profile.daemon_name.clone()))?;

        if self.request.dry_run {
            progress.notices.push(format!(
                "{} is not installed; a real run downloads it from {}",
                self.profile.daemon_name, url
            ));
            return Ok(Step::skipped(
                BinaryRecord {
                    daemon_path: self.profile.daemon_path(),
                    downloaded: false,
                    cosmovisor_path,
                },
                "download not performed on a dry run",
            ));
        }

        let path = node.install_from(&url)?;
        crate::log_event!(
            self.ctx,
            INFO,
            event_names::BINARY_DOWNLOADED,
            Stage::Binary,
            "daemon downloaded",
            url = url.as_str(),
            arch = options.architecture().as_str()
        );
        let detail = format!("downloaded {}", path.display());
        Ok(Step::with_detail(
            BinaryRecord {
                daemon_path: path,
                downloaded: true,
                cosmovisor_path,
            },
            detail,
        ))
    }

    fn init_home(
        &self,
        options: &OptionSet,
        node: &mut dyn NodeBinary,
    ) -> Result<Step<()>, Error> {
        let home = options.home();
        if home.join(NODE_KEY_FILE).exists() {
            return Ok(Step::skipped((), "node home already initialized"));
        }
        if self.request.dry_run {
            return Ok(Step::skipped((), "init not run on a dry run"));
        }

        let mut args = vec![
            "init".to_string(),
            options.moniker().to_string(),
            "--chain-id".to_string(),
            self.profile.chain_id.clone(),
        ];
        args.extend(home_args(home));
        node.run(&args, false)?;
        self.command_ran(Stage::NodeInit, &args);
        Ok(Step::done(()))
    }

    /// Whether a network genesis was asked for, by flag or by the profile.
    fn has_genesis_source(&self) -> bool {
        match self.request.genesis {
            GenesisSource::Profile => self.profile.genesis_url.is_some(),
            GenesisSource::Url(_) | GenesisSource::File(_) => true,
        }
    }

    fn genesis_input(
        &self,
        options: &OptionSet,
        fetcher: &dyn GenesisFetcher,
        clock: &dyn Clock,
        progress: &mut Progress,
    ) -> GenesisInput {
        let now = clock.now();
        let fetched = match &self.request.genesis {
            GenesisSource::File(path) => Some((
                path.display().to_string(),
                std::fs::read_to_string(path).map_err(|e| e.to_string()),
            )),
            GenesisSource::Url(url) => Some((
                url.clone(),
                fetcher.fetch(url).map_err(|e| e.to_string()),
            )),
            GenesisSource::Profile => self.profile.genesis_url.as_ref().map(|url| {
                (url.clone(), fetcher.fetch(url).map_err(|e| e.to_string()))
            }),
        };

        match fetched {
            Some((label, Ok(text))) => GenesisInput::supplied(label, text, now),
            Some((label, Err(reason))) => {
                let warning = format!(
                    "genesis from {} unavailable ({}); wrote a placeholder for {}",
                    label, reason, self.profile.chain_id
                );
                self.genesis_degraded(&warning);
                progress.warnings.push(warning.clone());
                GenesisInput::unavailable(warning, now)
            }
            None => match self.local_genesis(options) {
                Some((path, text)) => {
                    GenesisInput::supplied(path.display().to_string(), text, now)
                }
                None => GenesisInput::none(now),
            },
        }
    }

    /// The genesis `init` produced, when a validator bootstraps a new chain
    /// without a network genesis. The ceremony needs its `app_state`.
    fn local_genesis(&self, options: &OptionSet) -> Option<(PathBuf, String)> {
        let bootstrapping = options.node_type() == NodeType::Validator
            && options.validator().is_some_and(|v| v.bootstrap_genesis);
        if !bootstrapping {
            return None;
        }
        let path = options.home().join(GENESIS_FILE);
        let text = std::fs::read_to_string(&path).ok()?;
        Some((path, text))
    }

    fn genesis_degraded(&self, warning: &str) {
        crate::log_event!(
            self.ctx,
            WARN,
            event_names::GENESIS_DEGRADED,
            Stage::Genesis,
            warning
        );
    }

    fn patch(
        &self,
        options: &OptionSet,
        consensus: ns_config::ConfigDocument,
        app: ns_config::ConfigDocument,
    ) -> Result<Patched, Error> {
        let first_start = !options.home().join(BLOCKSTORE_DIR).exists();
        let sync = SyncPlan::from_options(options);
        let mut outcome = ConfigPatcher::patch(
            consensus,
            app,
            options.node_type(),
            first_start.then_some(&sync),
        )?;
        if !first_start && options.sync_mode() != SyncMode::Genesis {
            outcome.notices.push(format!(
                "node already has chain data; {} not applied",
                options.sync_mode()
            ));
        }
        Ok(Patched {
            outcome,
            first_start,
        })
    }

    fn plan_service(&self, options: &OptionSet, binary: &BinaryRecord) -> LaunchPlan {
        let mut planner = ServicePlanner::new(self.profile)
            .with_user(self.request.service_user.clone())
            .with_daemon_path(&binary.daemon_path);
        if let Some(ref dir) = self.request.unit_dir {
            planner = planner.with_unit_dir(dir);
        }
        if let Some(ref path) = binary.cosmovisor_path {
            planner = planner.with_cosmovisor_path(path);
        }
        planner.plan(options)
    }

    fn emit(
        &self,
        options: &OptionSet,
        binary: &BinaryRecord,
        documents: &RenderedDocuments,
        launch: &LaunchPlan,
        sink: &mut dyn ArtifactSink,
        progress: &mut Progress,
    ) -> Result<(), Error> {
        let config_dir = options.home().join("config");
        let files = [
            (
                config_dir.join(DocumentKind::Consensus.file_name()),
                documents.config_toml.as_bytes(),
            ),
            (
                config_dir.join(DocumentKind::App.file_name()),
                documents.app_toml.as_bytes(),
            ),
            (config_dir.join("genesis.json"), documents.genesis_json.as_bytes()),
        ];
        for (path, contents) in files {
            self.write(sink, &path, contents, 0o644, progress)?;
        }

        for artifact in &launch.artifacts {
            self.write(
                sink,
                &artifact.path,
                artifact.contents.as_bytes(),
                artifact.mode,
                progress,
            )?;
        }

        if options.service_manager() == ServiceManager::Cosmovisor {
            let target = options
                .home()
                .join("cosmovisor/genesis/bin")
                .join(&self.profile.daemon_name);
            if self.request.dry_run {
                progress.notices.push(format!(
                    "a real run copies {} to {}",
                    binary.daemon_path.display(),
                    target.display()
                ));
            } else {
                let bytes = std::fs::read(&binary.daemon_path)?;
                self.write(sink, &target, &bytes, 0o755, progress)?;
            }
        }

        self.hand_over_home(options, launch, sink)
    }

    /// Give the node home to the account the service runs as. `init` and
    /// every write above ran as the installer's user.
    fn hand_over_home(
        &self,
        options: &OptionSet,
        launch: &LaunchPlan,
        sink: &mut dyn ArtifactSink,
    ) -> Result<(), Error> {
        let Some(owner) = launch.service_user() else {
            return Ok(());
        };
        let changed = sink.hand_over(options.home(), owner)?;
        crate::log_event!(
            self.ctx,
            DEBUG,
            event_names::ARTIFACT_WRITTEN,
            Stage::Emit,
            "node home handed over",
            owner = owner,
            entries = changed
        );
        Ok(())
    }

    fn write(
        &self,
        sink: &mut dyn ArtifactSink,
        path: &Path,
        contents: &[u8],
        mode: u32,
        progress: &mut Progress,
    ) -> Result<(), Error> {
        let written = sink.write(path, contents, mode)?;
        let shown = written.path.display().to_string();
        crate::log_event!(
            self.ctx,
            DEBUG,
            event_names::ARTIFACT_WRITTEN,
            Stage::Emit,
            "artifact written",
            path = shown.as_str(),
            sha256 = written.sha256.as_str(),
            persistent = sink.is_persistent()
        );
        progress.written.push(written);
        Ok(())
    }

    fn keys(
        &self,
        options: &OptionSet,
        network_genesis: bool,
        launch: &LaunchPlan,
        collab: &mut Collaborators<'_>,
        progress: &mut Progress,
    ) -> Result<Step<Option<String>>, Error> {
        let setup = match options.validator() {
            Some(setup) if options.node_type() == NodeType::Validator => setup,
            _ => return Ok(Step::skipped(None, "no validator key requested")),
        };
        if self.request.dry_run {
            progress.notices.push(format!(
                "a real run creates or reuses the '{}' key",
                setup.key_name
            ));
            return Ok(Step::skipped(None, "keys not touched on a dry run"));
        }

        let node = &mut *collab.node;
        let backend = self.profile.keyring_backend.as_str();
        // The file backend asks for its passphrase on the terminal.
        let passphrase = backend == "file";
        let home = home_args(options.home());
        let keyring = ["--keyring-backend".to_string(), backend.to_string()];
        let key_command = |verb: &str, tail: &[&str]| -> Vec<String> {
            ["keys", verb, setup.key_name.as_str()]
                .iter()
                .chain(tail)
                .map(|s| s.to_string())
                .chain(keyring.iter().cloned())
                .chain(home.iter().cloned())
                .collect()
        };
        let show = key_command("show", &["-a"]);

        let exists = match keyring_entry(options.home(), backend, &setup.key_name) {
            Some(entry) => entry.exists(),
            None => match node.run(&show, false) {
                Ok(_) => true,
                Err(e) if e.is_key_not_found() => false,
                Err(e) => return Err(e.into()),
            },
        };
        if !exists {
            let add = key_command("add", &[]);
            node.run(&add, true)?;
            self.command_ran(Stage::Keys, &add);
            progress.notices.push(format!(
                "back up the mnemonic of the '{}' key shown above",
                setup.key_name
            ));
        }
        let address = node.run(&show, passphrase)?.trim().to_string();
        if address.is_empty() {
            return Err(Error::NodeCommand {
                command: format!("{} {}", self.profile.daemon_name, show.join(" ")),
                message: "no address printed".to_string(),
            });
        }

        if setup.bootstrap_genesis {
            if network_genesis {
                progress.warnings.push(
                    "bootstrapping a validator on top of a fetched network genesis".to_string(),
                );
            }
            let denom = &self.profile.denom;
            let steps: [(Vec<String>, bool); 4] = [
                (
                    vec![
                        "genesis".to_string(),
                        "add-genesis-account".to_string(),
                        address.clone(),
                        format!("{}{}", setup.account_amount, denom),
                    ],
                    false,
                ),
                (
                    vec![
                        "genesis".to_string(),
                        "gentx".to_string(),
                        setup.key_name.clone(),
                        format!("{}{}", setup.self_delegation, denom),
                        "--chain-id".to_string(),
                        self.profile.chain_id.clone(),
                        keyring[0].clone(),
                        keyring[1].clone(),
                    ],
                    passphrase,
                ),
                (vec!["genesis".to_string(), "collect-gentxs".to_string()], false),
                (vec!["genesis".to_string(), "validate-genesis".to_string()], false),
            ];
            for (mut step, interactive) in steps {
                step.extend(home.iter().cloned());
                node.run(&step, interactive)?;
                self.command_ran(Stage::Keys, &step);
            }
            progress.notices.push(
                "genesis.json was rewritten by collect-gentxs; its digest above predates that"
                    .to_string(),
            );
        }

        // The keyring and gentx files were created after the home was handed over.
        self.hand_over_home(options, launch, collab.sink)?;

        let detail = format!("validator address {}", address);
        Ok(Step::with_detail(Some(address), detail))
    }

    fn command_ran(&self, stage: Stage, args: &[String]) {
        let command = format!("{} {}", self.profile.daemon_name, args.join(" "));
        crate::log_event!(
            self.ctx,
            INFO,
            event_names::COMMAND_RAN,
            stage,
            "daemon command ran",
            command = command.as_str()
        );
    }
}

/// On-disk record of a key, for backends that keep one file per key.
fn keyring_entry(home: &Path, backend: &str, key_name: &str) -> Option<PathBuf> {
    matches!(backend, "file" | "test").then(|| {
        home.join(format!("keyring-{}", backend))
            .join(format!("{}.info", key_name))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{FetchError, FixedClock};
    use chrono::TimeZone;
    use ns_common::{Architecture, EnvironmentCapabilities, OptionSetBuilder, ValidatorSetup};
    use tempfile::TempDir;

    fn options(home: &Path, validator: Option<ValidatorSetup>) -> OptionSet {
        let mut b = OptionSetBuilder::new(EnvironmentCapabilities::with_supervisor());
        b.architecture(Architecture::Amd64);
        b.node_type(if validator.is_some() {
            NodeType::Validator
        } else {
            NodeType::Full
        });
        b.service_manager(ServiceManager::None).unwrap();
        b.home(home).unwrap();
        b.validator(validator).unwrap();
        b.build().unwrap()
    }

    fn bootstrap() -> Option<ValidatorSetup> {
        let mut setup = ValidatorSetup::new("operator");
        setup.bootstrap_genesis = true;
        Some(setup)
    }

    struct NoGenesis;
    impl GenesisFetcher for NoGenesis {
        fn fetch(&self, url: &str) -> Result<String, FetchError> {
            Err(FetchError::Transport {
                url: url.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = PipelineError {
            stage: Stage::NodeInit,
            source: Error::BinaryUnavailable("noded".to_string()),
            written: Vec::new(),
        };
        assert!(err.to_string().starts_with("node_init stage failed"));
    }

    #[test]
    fn test_genesis_input_degrades_on_fetch_failure() {
        let profile = ChainProfile::builtin();
        let orch = Orchestrator::new(
            &profile,
            InstallRequest {
                genesis: GenesisSource::Url("https://example.invalid/genesis.json".to_string()),
                ..Default::default()
            },
            LogContext::new("run-test", "host-test"),
        );
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        let mut progress = Progress::default();
        let home = TempDir::new().unwrap();
        let full = options(home.path(), None);
        let input = orch.genesis_input(&full, &NoGenesis, &clock, &mut progress);
        assert!(input.source.is_none());
        assert!(input.unavailable_reason.is_some());
        assert_eq!(progress.warnings.len(), 1);
        assert!(progress.warnings[0].contains("connection refused"));
    }

    #[test]
    fn test_genesis_input_without_source() {
        let mut profile = ChainProfile::builtin();
        profile.genesis_url = None;
        let orch = Orchestrator::new(
            &profile,
            InstallRequest::default(),
            LogContext::new("run-test", "host-test"),
        );
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        let mut progress = Progress::default();
        let home = TempDir::new().unwrap();
        let full = options(home.path(), None);
        let input = orch.genesis_input(&full, &NoGenesis, &clock, &mut progress);
        assert!(input.source.is_none());
        assert!(input.unavailable_reason.is_none());
        assert!(progress.warnings.is_empty());
    }

    #[test]
    fn test_bootstrap_reads_back_init_genesis() {
        let mut profile = ChainProfile::builtin();
        profile.genesis_url = None;
        let orch = Orchestrator::new(
            &profile,
            InstallRequest::default(),
            LogContext::new("run-test", "host-test"),
        );
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        let home = TempDir::new().unwrap();
        let genesis = home.path().join(GENESIS_FILE);
        std::fs::create_dir_all(genesis.parent().unwrap()).unwrap();
        std::fs::write(&genesis, r#"{"chain_id":"x","app_state":{}}"#).unwrap();

        let mut progress = Progress::default();
        let validator = options(home.path(), bootstrap());
        let input = orch.genesis_input(&validator, &NoGenesis, &clock, &mut progress);
        let (label, text) = input.source.unwrap();
        assert_eq!(label, genesis.display().to_string());
        assert!(text.contains("app_state"));

        // A plain node never reuses a local genesis.
        let full = options(home.path(), None);
        let input = orch.genesis_input(&full, &NoGenesis, &clock, &mut progress);
        assert!(input.source.is_none());
    }

    #[test]
    fn test_keyring_entry_for_file_backends() {
        let home = Path::new("/srv/noded");
        assert_eq!(
            keyring_entry(home, "file", "operator"),
            Some(PathBuf::from("/srv/noded/keyring-file/operator.info"))
        );
        assert_eq!(
            keyring_entry(home, "test", "operator"),
            Some(PathBuf::from("/srv/noded/keyring-test/operator.info"))
        );
        assert_eq!(keyring_entry(home, "os", "operator"), None);
    }
}
