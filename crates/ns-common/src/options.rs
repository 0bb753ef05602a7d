//! Operator options.
//!
//! [`OptionSet`] is the immutable record of every choice the operator made.
//! It can only be produced by [`OptionSetBuilder`], whose setters validate
//! each field the moment it is supplied so that interactive collection can
//! re-prompt a single field instead of failing the whole run.
//!
//! The service-manager guard lives here: selecting `cosmovisor` or `systemd`
//! on a host without a service supervisor is rejected at selection time and
//! is never downgraded to a different manager.

use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::capabilities::EnvironmentCapabilities;

/// Moniker used when the operator leaves the field empty.
pub const DEFAULT_MONIKER: &str = "my-node";

/// Longest moniker CometBFT accepts.
pub const MAX_MONIKER_LEN: usize = 70;

/// Default state-sync trust period (one week).
pub const DEFAULT_TRUST_PERIOD_HOURS: u64 = 168;

/// Errors raised while selecting a single option.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("'{value}' is not a valid {field} (expected one of: {allowed})")]
    InvalidChoice {
        field: &'static str,
        value: String,
        allowed: String,
    },

    #[error("invalid {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("service manager '{manager}' requires a service supervisor, none detected")]
    SupervisorRequired { manager: ServiceManager },

    #[error("missing required option: {0}")]
    MissingField(&'static str),
}

impl SelectionError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        SelectionError::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

fn choices<T: Copy>(all: &[T], name: impl Fn(T) -> &'static str) -> String {
    all.iter().map(|v| name(*v)).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Enumerated choices
// ============================================================================

/// CPU architecture of the release binary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    pub const ALL: &'static [Architecture] = &[Architecture::Amd64, Architecture::Arm64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
        }
    }

    /// Parse from operator input, accepting kernel spellings.
    pub fn parse(s: &str) -> Option<Architecture> {
        match s.trim().to_lowercase().as_str() {
            "amd64" | "x86_64" | "x86-64" | "x64" => Some(Architecture::Amd64),
            "arm64" | "aarch64" => Some(Architecture::Arm64),
            _ => None,
        }
    }

    /// Architecture of the running host, when it is one we ship binaries for.
    pub fn host() -> Option<Architecture> {
        Architecture::parse(std::env::consts::ARCH)
    }
}

/// Role of the node, which selects the configuration patch set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    /// Pruned full node.
    Full,
    /// Keeps every historical state.
    Archive,
    /// Public RPC/API endpoint.
    Rpc,
    /// Block-signing validator.
    Validator,
    /// No patches; the operator edits the documents.
    Custom,
}

impl NodeType {
    pub const ALL: &'static [NodeType] = &[
        NodeType::Full,
        NodeType::Archive,
        NodeType::Rpc,
        NodeType::Validator,
        NodeType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Full => "full",
            NodeType::Archive => "archive",
            NodeType::Rpc => "rpc",
            NodeType::Validator => "validator",
            NodeType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<NodeType> {
        match s.trim().to_lowercase().as_str() {
            "full" | "fullnode" | "full-node" => Some(NodeType::Full),
            "archive" | "archival" => Some(NodeType::Archive),
            "rpc" | "api" => Some(NodeType::Rpc),
            "validator" | "val" => Some(NodeType::Validator),
            "custom" => Some(NodeType::Custom),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            NodeType::Full => "pruned full node, default pruning, kv indexer",
            NodeType::Archive => "archive node, no pruning, no state-sync snapshots",
            NodeType::Rpc => "public RPC node, listens on all interfaces, API enabled",
            NodeType::Validator => "validator, aggressive pruning, no indexer, metrics on",
            NodeType::Custom => "no changes, edit the configuration by hand",
        }
    }
}

/// How the node obtains chain state before its first start.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
    ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Fetch a trusted recent snapshot over the P2P network.
    StateSync,
    /// Operator places a pre-synced data directory.
    Snapshot,
    /// Replay the chain from genesis.
    #[default]
    Genesis,
}

impl SyncMode {
    pub const ALL: &'static [SyncMode] =
        &[SyncMode::StateSync, SyncMode::Snapshot, SyncMode::Genesis];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::StateSync => "state-sync",
            SyncMode::Snapshot => "snapshot",
            SyncMode::Genesis => "genesis",
        }
    }

    pub fn parse(s: &str) -> Option<SyncMode> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "state-sync" | "statesync" => Some(SyncMode::StateSync),
            "snapshot" => Some(SyncMode::Snapshot),
            "genesis" | "" => Some(SyncMode::Genesis),
            _ => None,
        }
    }
}

/// Process supervisor that keeps the node running.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceManager {
    /// systemd unit running cosmovisor.
    Cosmovisor,
    /// systemd unit running the daemon directly.
    Systemd,
    /// Foreground process.
    Direct,
    /// Detached GNU screen session.
    Screen,
    /// Detached tmux session.
    Tmux,
    /// Docker container.
    Docker,
    /// Nothing is launched.
    None,
}

impl ServiceManager {
    pub const ALL: &'static [ServiceManager] = &[
        ServiceManager::Cosmovisor,
        ServiceManager::Systemd,
        ServiceManager::Direct,
        ServiceManager::Screen,
        ServiceManager::Tmux,
        ServiceManager::Docker,
        ServiceManager::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceManager::Cosmovisor => "cosmovisor",
            ServiceManager::Systemd => "systemd",
            ServiceManager::Direct => "direct",
            ServiceManager::Screen => "screen",
            ServiceManager::Tmux => "tmux",
            ServiceManager::Docker => "docker",
            ServiceManager::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<ServiceManager> {
        match s.trim().to_lowercase().as_str() {
            "cosmovisor" => Some(ServiceManager::Cosmovisor),
            "systemd" | "systemctl" | "service" => Some(ServiceManager::Systemd),
            "direct" | "foreground" => Some(ServiceManager::Direct),
            "screen" => Some(ServiceManager::Screen),
            "tmux" => Some(ServiceManager::Tmux),
            "docker" | "container" => Some(ServiceManager::Docker),
            "none" | "manual" => Some(ServiceManager::None),
            _ => None,
        }
    }

    /// Whether this manager emits a unit for a running service supervisor.
    pub fn requires_supervisor(&self) -> bool {
        matches!(self, ServiceManager::Cosmovisor | ServiceManager::Systemd)
    }

    /// Managers that can be selected on a host with the given capabilities.
    pub fn available(env: &EnvironmentCapabilities) -> Vec<ServiceManager> {
        ServiceManager::ALL
            .iter()
            .copied()
            .filter(|m| env.has_service_supervisor || !m.requires_supervisor())
            .collect()
    }
}

macro_rules! display_and_from_str {
    ($ty:ident, $field:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = SelectionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::parse(s).ok_or_else(|| SelectionError::InvalidChoice {
                    field: $field,
                    value: s.trim().to_string(),
                    allowed: choices($ty::ALL, |v| v.as_str()),
                })
            }
        }
    };
}

display_and_from_str!(Architecture, "architecture");
display_and_from_str!(NodeType, "node type");
display_and_from_str!(SyncMode, "sync mode");
display_and_from_str!(ServiceManager, "service manager");

// ============================================================================
// Compound options
// ============================================================================

/// Parameters for bootstrapping with state sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StateSyncParams {
    /// Trusted RPC servers; a single server is used twice.
    pub rpc_servers: Vec<String>,

    /// Height of the trusted header.
    #[serde(default)]
    pub trust_height: Option<u64>,

    /// Hash of the trusted header (hex).
    #[serde(default)]
    pub trust_hash: Option<String>,

    /// Trust period in hours.
    #[serde(default = "default_trust_period_hours")]
    pub trust_period_hours: u64,
}

fn default_trust_period_hours() -> u64 {
    DEFAULT_TRUST_PERIOD_HOURS
}

impl StateSyncParams {
    /// Params for a single RPC server with the trust point still unknown.
    pub fn from_rpc(rpc: impl Into<String>) -> Self {
        StateSyncParams {
            rpc_servers: vec![rpc.into()],
            trust_height: None,
            trust_hash: None,
            trust_period_hours: DEFAULT_TRUST_PERIOD_HOURS,
        }
    }

    /// Set the trust point.
    pub fn with_trust(mut self, height: u64, hash: impl Into<String>) -> Self {
        self.trust_height = Some(height);
        self.trust_hash = Some(hash.into());
        self
    }

    /// Whether both halves of the trust point are present and non-empty.
    pub fn has_trust_point(&self) -> bool {
        self.trust_height.is_some_and(|h| h > 0)
            && self.trust_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Key and genesis-ceremony settings for validator installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidatorSetup {
    /// Keyring entry holding the operator key.
    pub key_name: String,

    /// Run add-genesis-account / gentx / collect-gentxs for a new local chain.
    #[serde(default)]
    pub bootstrap_genesis: bool,

    /// Genesis balance of the operator account (base denom units).
    #[serde(default = "default_account_amount")]
    pub account_amount: u64,

    /// Self delegation in the gentx (base denom units).
    #[serde(default = "default_self_delegation")]
    pub self_delegation: u64,
}

fn default_account_amount() -> u64 {
    100_000_000_000
}

fn default_self_delegation() -> u64 {
    10_000_000_000
}

impl ValidatorSetup {
    pub fn new(key_name: impl Into<String>) -> Self {
        ValidatorSetup {
            key_name: key_name.into(),
            bootstrap_genesis: false,
            account_amount: default_account_amount(),
            self_delegation: default_self_delegation(),
        }
    }
}

// ============================================================================
// OptionSet
// ============================================================================

/// Validated, immutable operator choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionSet {
    architecture: Architecture,
    moniker: String,
    external_address: String,
    node_type: NodeType,
    sync_mode: SyncMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_sync: Option<StateSyncParams>,
    service_manager: ServiceManager,
    environment: EnvironmentCapabilities,
    home: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    validator: Option<ValidatorSetup>,
}

impl OptionSet {
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn moniker(&self) -> &str {
        &self.moniker
    }

    /// Advertised `host:port`, empty when the node does not advertise.
    pub fn external_address(&self) -> &str {
        &self.external_address
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    pub fn state_sync(&self) -> Option<&StateSyncParams> {
        self.state_sync.as_ref()
    }

    pub fn service_manager(&self) -> ServiceManager {
        self.service_manager
    }

    pub fn environment(&self) -> &EnvironmentCapabilities {
        &self.environment
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn validator(&self) -> Option<&ValidatorSetup> {
        self.validator.as_ref()
    }

    /// Non-fatal observations about the selection.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let env = &self.environment;

        match self.service_manager {
            ServiceManager::Screen if !env.has_screen => {
                warnings.push("screen is not installed; install it before starting".to_string())
            }
            ServiceManager::Tmux if !env.has_tmux => {
                warnings.push("tmux is not installed; install it before starting".to_string())
            }
            ServiceManager::Docker if !env.has_docker => warnings.push(
                "docker is not reachable; the container cannot be started yet".to_string(),
            ),
            _ => {}
        }

        if self.external_address.is_empty() {
            warnings.push(
                "no external address set; inbound peers cannot dial this node".to_string(),
            );
        }

        if self.sync_mode == SyncMode::StateSync
            && !self.state_sync.as_ref().is_some_and(|p| p.has_trust_point())
        {
            warnings.push("state sync selected without a complete trust point".to_string());
        }

        warnings
    }
}

/// Field-by-field constructor for [`OptionSet`].
#[derive(Debug, Clone)]
pub struct OptionSetBuilder {
    environment: EnvironmentCapabilities,
    architecture: Option<Architecture>,
    moniker: Option<String>,
    external_address: Option<String>,
    node_type: Option<NodeType>,
    sync_mode: SyncMode,
    state_sync: Option<StateSyncParams>,
    service_manager: Option<ServiceManager>,
    home: Option<PathBuf>,
    validator: Option<ValidatorSetup>,
}

impl OptionSetBuilder {
    /// Start a builder for a host with the given (already detected) capabilities.
    pub fn new(environment: EnvironmentCapabilities) -> Self {
        OptionSetBuilder {
            environment,
            architecture: None,
            moniker: None,
            external_address: None,
            node_type: None,
            sync_mode: SyncMode::default(),
            state_sync: None,
            service_manager: None,
            home: None,
            validator: None,
        }
    }

    pub fn environment(&self) -> &EnvironmentCapabilities {
        &self.environment
    }

    pub fn node_type_selected(&self) -> Option<NodeType> {
        self.node_type
    }

    pub fn architecture(&mut self, architecture: Architecture) -> &mut Self {
        self.architecture = Some(architecture);
        self
    }

    /// Set the moniker; empty input falls back to [`DEFAULT_MONIKER`].
    pub fn moniker(&mut self, raw: &str) -> Result<&mut Self, SelectionError> {
        self.moniker = Some(validate_moniker(raw)?);
        Ok(self)
    }

    pub fn external_address(&mut self, raw: &str) -> Result<&mut Self, SelectionError> {
        self.external_address = Some(validate_external_address(raw)?);
        Ok(self)
    }

    pub fn node_type(&mut self, node_type: NodeType) -> &mut Self {
        self.node_type = Some(node_type);
        self
    }

    /// Set the sync mode. Parameters are kept only for state sync; the trust
    /// point may still be empty here, the patcher refuses it later.
    pub fn sync_mode(
        &mut self,
        mode: SyncMode,
        params: Option<StateSyncParams>,
    ) -> Result<&mut Self, SelectionError> {
        self.state_sync = match (mode, params) {
            (SyncMode::StateSync, Some(params)) => Some(validate_state_sync(params)?),
            _ => None,
        };
        self.sync_mode = mode;
        Ok(self)
    }

    /// Select the service manager, enforcing the supervisor guard.
    pub fn service_manager(
        &mut self,
        manager: ServiceManager,
    ) -> Result<&mut Self, SelectionError> {
        if manager.requires_supervisor() && !self.environment.has_service_supervisor {
            return Err(SelectionError::SupervisorRequired { manager });
        }
        self.service_manager = Some(manager);
        Ok(self)
    }

    pub fn home(&mut self, home: impl Into<PathBuf>) -> Result<&mut Self, SelectionError> {
        let home = home.into();
        if home.as_os_str().is_empty() {
            return Err(SelectionError::invalid("home", "must not be empty"));
        }
        if !home.is_absolute() {
            return Err(SelectionError::invalid(
                "home",
                format!("'{}' must be an absolute path", home.display()),
            ));
        }
        self.home = Some(home);
        Ok(self)
    }

    pub fn validator(
        &mut self,
        setup: Option<ValidatorSetup>,
    ) -> Result<&mut Self, SelectionError> {
        if let Some(ref setup) = setup {
            validate_key_name(&setup.key_name)?;
            if setup.bootstrap_genesis && setup.self_delegation > setup.account_amount {
                return Err(SelectionError::invalid(
                    "validator.self_delegation",
                    "cannot exceed the genesis account amount",
                ));
            }
        }
        self.validator = setup;
        Ok(self)
    }

    /// Apply every field present in an answers file.
    pub fn apply_answers(&mut self, answers: OptionAnswers) -> Result<&mut Self, SelectionError> {
        if let Some(arch) = answers.architecture {
            self.architecture(arch);
        }
        if let Some(ref moniker) = answers.moniker {
            self.moniker(moniker)?;
        }
        if let Some(ref addr) = answers.external_address {
            self.external_address(addr)?;
        }
        if let Some(node_type) = answers.node_type {
            self.node_type(node_type);
        }
        if let Some(mode) = answers.implied_sync_mode() {
            self.sync_mode(mode, answers.state_sync)?;
        }
        if let Some(manager) = answers.service_manager {
            self.service_manager(manager)?;
        }
        if let Some(home) = answers.home {
            self.home(home)?;
        }
        if answers.validator.is_some() {
            self.validator(answers.validator)?;
        }
        Ok(self)
    }

    /// Finish construction.
    pub fn build(self) -> Result<OptionSet, SelectionError> {
        let node_type = self.node_type.ok_or(SelectionError::MissingField("node_type"))?;
        if self.validator.is_some() && node_type != NodeType::Validator {
            return Err(SelectionError::invalid(
                "validator",
                format!("key setup is only valid for validator nodes, not '{}'", node_type),
            ));
        }

        Ok(OptionSet {
            architecture: self
                .architecture
                .ok_or(SelectionError::MissingField("architecture"))?,
            moniker: self.moniker.unwrap_or_else(|| DEFAULT_MONIKER.to_string()),
            external_address: self.external_address.unwrap_or_default(),
            node_type,
            sync_mode: self.sync_mode,
            state_sync: self.state_sync,
            service_manager: self
                .service_manager
                .ok_or(SelectionError::MissingField("service_manager"))?,
            environment: self.environment,
            home: self.home.ok_or(SelectionError::MissingField("home"))?,
            validator: self.validator,
        })
    }
}

/// Answers file for non-interactive installs.
///
/// Every field is optional; missing ones fall back to the same defaults the
/// interactive prompts offer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OptionAnswers {
    pub architecture: Option<Architecture>,
    pub moniker: Option<String>,
    pub external_address: Option<String>,
    pub node_type: Option<NodeType>,
    pub sync_mode: Option<SyncMode>,
    pub state_sync: Option<StateSyncParams>,
    pub service_manager: Option<ServiceManager>,
    pub home: Option<PathBuf>,
    pub validator: Option<ValidatorSetup>,
}

impl OptionAnswers {
    /// The sync mode asked for. State-sync parameters without a mode mean
    /// state sync.
    pub fn implied_sync_mode(&self) -> Option<SyncMode> {
        self.sync_mode
            .or_else(|| self.state_sync.as_ref().map(|_| SyncMode::StateSync))
    }
}

// ============================================================================
// Field validation
// ============================================================================

/// Validate a moniker, substituting the default for empty input.
pub fn validate_moniker(raw: &str) -> Result<String, SelectionError> {
    let moniker = raw.trim();
    if moniker.is_empty() {
        return Ok(DEFAULT_MONIKER.to_string());
    }
    if moniker.chars().count() > MAX_MONIKER_LEN {
        return Err(SelectionError::invalid(
            "moniker",
            format!("longer than {} characters", MAX_MONIKER_LEN),
        ));
    }
    if moniker.chars().any(|c| c.is_control() || c == '"') {
        return Err(SelectionError::invalid(
            "moniker",
            "must not contain control characters or quotes",
        ));
    }
    Ok(moniker.to_string())
}

/// Validate a `host:port` address. Empty input means "do not advertise".
pub fn validate_external_address(raw: &str) -> Result<String, SelectionError> {
    let addr = raw.trim();
    if addr.is_empty() {
        return Ok(String::new());
    }
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| SelectionError::invalid("external address", "expected host:port"))?;
    if host.is_empty() || host.chars().any(char::is_whitespace) || host.contains('/') {
        return Err(SelectionError::invalid(
            "external address",
            format!("'{}' is not a valid host", host),
        ));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(addr.to_string()),
        _ => Err(SelectionError::invalid(
            "external address",
            format!("'{}' is not a valid port", port),
        )),
    }
}

fn validate_rpc_server(raw: &str) -> Result<String, SelectionError> {
    let server = raw.trim().trim_end_matches('/');
    let rest = server
        .strip_prefix("http://")
        .or_else(|| server.strip_prefix("https://"))
        .ok_or_else(|| {
            SelectionError::invalid(
                "state sync rpc server",
                format!("'{}' must start with http:// or https://", server),
            )
        })?;
    if rest.is_empty() || rest.chars().any(char::is_whitespace) {
        return Err(SelectionError::invalid(
            "state sync rpc server",
            format!("'{}' has no host", server),
        ));
    }
    Ok(server.to_string())
}

fn validate_state_sync(params: StateSyncParams) -> Result<StateSyncParams, SelectionError> {
    let rpc_servers = params
        .rpc_servers
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| validate_rpc_server(s))
        .collect::<Result<Vec<_>, _>>()?;

    let trust_hash = match params.trust_hash.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(hash) => {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(SelectionError::invalid(
                    "trust hash",
                    "expected 64 hexadecimal characters",
                ));
            }
            Some(hash.to_ascii_uppercase())
        }
    };

    if params.trust_period_hours == 0 {
        return Err(SelectionError::invalid("trust period", "must be positive"));
    }

    Ok(StateSyncParams {
        rpc_servers,
        trust_height: params.trust_height.filter(|h| *h > 0),
        trust_hash,
        trust_period_hours: params.trust_period_hours,
    })
}

fn validate_key_name(name: &str) -> Result<(), SelectionError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SelectionError::invalid(
            "validator.key_name",
            "use letters, digits, '-' or '_'",
        ));
    }
    Ok(())
}
