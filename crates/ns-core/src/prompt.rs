//! Operator option collection.
//!
//! Interactive installs ask one question per option and validate each answer
//! immediately through [`OptionSetBuilder`]; a rejected answer is reported
//! and asked again, with no retry limit. End of input aborts the run.
//!
//! Non-interactive installs read an answers file and fill the gaps with the
//! same defaults the prompts offer.

use ns_common::options::{DEFAULT_MONIKER, DEFAULT_TRUST_PERIOD_HOURS};
use ns_common::{
    Architecture, EnvironmentCapabilities, Error, NodeType, OptionAnswers, OptionSet,
    OptionSetBuilder, SelectionError, ServiceManager, StateSyncParams, SyncMode, ValidatorSetup,
};
use ns_config::ChainProfile;
use std::io::{self, BufRead, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::collab::{AddressProbe, TrustFetcher};
use crate::logging::event_names;
use crate::service::P2P_PORT;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("operator input closed")]
    Closed,

    #[error("prompt I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl From<PromptError> for Error {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::Closed => Error::InputClosed,
            PromptError::Io(e) => Error::Io(e),
        }
    }
}

/// Line-oriented operator dialogue.
pub trait Prompter {
    /// Ask one question and return the trimmed answer. An empty answer
    /// selects `default` when one is offered.
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String, PromptError>;

    /// Show a message that needs no answer.
    fn tell(&mut self, message: &str);
}

/// Prompts on a terminal (questions on stderr, answers from stdin).
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompter<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        TerminalPrompter {
            input: io::stdin().lock(),
            output: io::stderr(),
        }
    }
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        TerminalPrompter { input, output }
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn ask(&mut self, question: &str, default: Option<&str>) -> Result<String, PromptError> {
        match default {
            Some(d) if !d.is_empty() => write!(self.output, "{} [{}]: ", question, d)?,
            _ => write!(self.output, "{}: ", question)?,
        }
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Err(PromptError::Closed);
        }
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(default.unwrap_or_default().to_string());
        }
        Ok(answer.to_string())
    }

    fn tell(&mut self, message: &str) {
        let _ = writeln!(self.output, "{}", message);
    }
}

/// Network helpers used while prompting.
pub struct PromptServices<'a> {
    pub address: Option<&'a dyn AddressProbe>,
    pub trust: Option<&'a dyn TrustFetcher>,
}

impl PromptServices<'_> {
    /// No network access; defaults that need it are left empty.
    pub fn offline() -> Self {
        PromptServices {
            address: None,
            trust: None,
        }
    }
}

/// Ask until `parse` accepts the answer.
fn ask_until<T>(
    prompter: &mut dyn Prompter,
    question: &str,
    default: Option<&str>,
    mut parse: impl FnMut(&str) -> Result<T, String>,
) -> Result<T, PromptError> {
    loop {
        let answer = prompter.ask(question, default)?;
        match parse(&answer) {
            Ok(value) => return Ok(value),
            Err(message) => {
                debug!(
                    target: event_names::OPTION_REJECTED,
                    question,
                    answer = answer.as_str(),
                    "answer rejected"
                );
                prompter.tell(&format!("  {}", message));
            }
        }
    }
}

/// Numbered menu; accepts the number or the name.
fn choose<T: Copy>(
    prompter: &mut dyn Prompter,
    title: &str,
    all: &[T],
    label: impl Fn(T) -> String,
    parse: impl Fn(&str) -> Option<T>,
    default: Option<T>,
) -> Result<T, PromptError> {
    prompter.tell(title);
    for (idx, value) in all.iter().enumerate() {
        prompter.tell(&format!("  {}) {}", idx + 1, label(*value)));
    }
    let default_idx = default
        .and_then(|d| all.iter().position(|v| label(*v) == label(d)))
        .map(|i| (i + 1).to_string());
    ask_until(prompter, "Choice", default_idx.as_deref(), |answer| {
        if let Ok(n) = answer.parse::<usize>() {
            return all
                .get(n.wrapping_sub(1))
                .copied()
                .ok_or_else(|| format!("choose a number between 1 and {}", all.len()));
        }
        parse(answer).ok_or_else(|| format!("'{}' is not one of the listed choices", answer))
    })
}

fn yes_no(prompter: &mut dyn Prompter, question: &str, default: bool) -> Result<bool, PromptError> {
    let default = if default { "y" } else { "n" };
    ask_until(prompter, question, Some(default), |a| {
        match a.to_lowercase().as_str() {
            "y" | "yes" => Ok(true),
            "n" | "no" => Ok(false),
            _ => Err("answer y or n".to_string()),
        }
    })
}

/// `host:port` default for the detected public address.
pub fn advertised_address(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => format!("{}:{}", v4, P2P_PORT),
        IpAddr::V6(v6) => format!("[{}]:{}", v6, P2P_PORT),
    }
}

/// Collect the option set interactively.
///
/// Fields already present in `seed` (from flags or a partial answers file)
/// are applied without asking.
pub fn collect_options(
    prompter: &mut dyn Prompter,
    environment: EnvironmentCapabilities,
    profile: &ChainProfile,
    seed: OptionAnswers,
    services: &PromptServices<'_>,
) -> Result<OptionSet, Error> {
    let mut builder = OptionSetBuilder::new(environment);

    // Architecture
    let architecture = match seed.architecture {
        Some(a) => a,
        None => choose(
            prompter,
            "Binary architecture:",
            Architecture::ALL,
            |a| a.as_str().to_string(),
            Architecture::parse,
            Architecture::host(),
        )?,
    };
    builder.architecture(architecture);

    // Moniker
    match seed.moniker {
        Some(ref m) => {
            builder.moniker(m)?;
        }
        None => ask_until(prompter, "Node moniker", Some(DEFAULT_MONIKER), |a| {
            builder.moniker(a).map(|_| ()).map_err(|e| e.to_string())
        })?,
    }

    // External address
    match seed.external_address {
        Some(ref addr) => {
            builder.external_address(addr)?;
        }
        None => {
            let detected = detect_address(prompter, services);
            ask_until(
                prompter,
                "External address (host:port, empty to not advertise)",
                detected.as_deref(),
                |a| builder.external_address(a).map(|_| ()).map_err(|e| e.to_string()),
            )?;
        }
    }

    // Node type
    let node_type = match seed.node_type {
        Some(n) => n,
        None => choose(
            prompter,
            "Node type:",
            NodeType::ALL,
            |n| format!("{} - {}", n.as_str(), n.description()),
            NodeType::parse,
            Some(NodeType::Full),
        )?,
    };
    builder.node_type(node_type);

    // Sync mode
    match seed.implied_sync_mode() {
        Some(mode) => {
            builder.sync_mode(mode, seed.state_sync.clone())?;
        }
        None => {
            let mode = choose(
                prompter,
                "Sync mode:",
                SyncMode::ALL,
                |m| m.as_str().to_string(),
                SyncMode::parse,
                Some(SyncMode::Genesis),
            )?;
            loop {
                let params = match mode {
                    SyncMode::StateSync => Some(ask_state_sync(prompter, services)?),
                    _ => None,
                };
                match builder.sync_mode(mode, params) {
                    Ok(_) => break,
                    Err(e) => prompter.tell(&format!("  {}", e)),
                }
            }
        }
    }

    // Service manager
    match seed.service_manager {
        Some(m) => {
            builder.service_manager(m)?;
        }
        None => {
            if !environment.has_service_supervisor {
                prompter.tell(
                    "No service supervisor detected: cosmovisor and systemd are unavailable.",
                );
            }
            let default = if environment.has_service_supervisor {
                ServiceManager::Systemd
            } else {
                ServiceManager::Direct
            };
            loop {
                let manager = choose(
                    prompter,
                    "Service manager:",
                    ServiceManager::ALL,
                    |m| m.as_str().to_string(),
                    ServiceManager::parse,
                    Some(default),
                )?;
                match builder.service_manager(manager) {
                    Ok(_) => break,
                    Err(e) => {
                        warn!(
                            target: event_names::OPTION_REJECTED,
                            manager = manager.as_str(),
                            "service manager rejected"
                        );
                        prompter.tell(&format!("  {}", e));
                    }
                }
            }
        }
    }

    // Home
    match seed.home {
        Some(home) => {
            builder.home(home)?;
        }
        None => {
            let default = profile.home().display().to_string();
            ask_until(prompter, "Node home directory", Some(&default), |a| {
                builder
                    .home(PathBuf::from(a))
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })?;
        }
    }

    // Validator key
    if node_type == NodeType::Validator {
        match seed.validator {
            Some(setup) => {
                builder.validator(Some(setup))?;
            }
            None => {
                let key_name = ask_until(prompter, "Operator key name", Some("validator"), |a| {
                    let setup = ValidatorSetup::new(a);
                    builder
                        .clone()
                        .validator(Some(setup))
                        .map(|_| a.to_string())
                        .map_err(|e| e.to_string())
                })?;
                let mut setup = ValidatorSetup::new(key_name);
                setup.bootstrap_genesis = yes_no(
                    prompter,
                    "Create a new local chain genesis with this validator (y/n)",
                    false,
                )?;
                builder.validator(Some(setup))?;
            }
        }
    }

    Ok(builder.build()?)
}

fn detect_address(prompter: &mut dyn Prompter, services: &PromptServices<'_>) -> Option<String> {
    let probe = services.address?;
    match probe.public_ip() {
        Ok(ip) => Some(advertised_address(ip)),
        Err(e) => {
            warn!(error = %e, "public address detection failed");
            prompter.tell(&format!("Could not detect the public address: {}", e));
            None
        }
    }
}

fn ask_state_sync(
    prompter: &mut dyn Prompter,
    services: &PromptServices<'_>,
) -> Result<StateSyncParams, PromptError> {
    let servers: Vec<String> = ask_until(
        prompter,
        "Trusted RPC servers (comma separated)",
        None,
        |a| {
            let servers: Vec<String> = a
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if servers.is_empty() {
                Err("at least one RPC server is required".to_string())
            } else {
                Ok(servers)
            }
        },
    )?;
    let mut params = StateSyncParams {
        rpc_servers: servers,
        trust_height: None,
        trust_hash: None,
        trust_period_hours: DEFAULT_TRUST_PERIOD_HOURS,
    };

    if let Some(trust) = services.trust {
        if yes_no(prompter, "Derive trust height and hash from the first RPC server (y/n)", true)? {
            match trust.fetch_trust_point(&params.rpc_servers[0]) {
                Ok(point) => {
                    prompter.tell(&format!(
                        "  trust height {} hash {}",
                        point.height, point.hash
                    ));
                    return Ok(params.with_trust(point.height, point.hash));
                }
                Err(e) => {
                    warn!(error = %e, "trust point derivation failed");
                    prompter.tell(&format!("  could not derive the trust point: {}", e));
                }
            }
        }
    }

    let height = ask_until(prompter, "Trust height", None, |a| match a.parse::<u64>() {
        Ok(h) if h > 0 => Ok(h),
        _ => Err("enter a positive block height".to_string()),
    })?;
    let hash = ask_until(prompter, "Trust hash", None, |a| {
        if a.len() == 64 && a.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(a.to_string())
        } else {
            Err("enter the 64 hex digit block hash".to_string())
        }
    })?;
    params = params.with_trust(height, hash);
    Ok(params)
}

/// Build the option set from an answers file, filling gaps with defaults.
pub fn options_from_answers(
    environment: EnvironmentCapabilities,
    profile: &ChainProfile,
    mut answers: OptionAnswers,
) -> Result<OptionSet, Error> {
    if answers.architecture.is_none() {
        answers.architecture = Architecture::host();
    }
    if answers.node_type.is_none() {
        answers.node_type = Some(NodeType::Full);
    }
    if answers.service_manager.is_none() {
        answers.service_manager = Some(if environment.has_service_supervisor {
            ServiceManager::Systemd
        } else {
            ServiceManager::Direct
        });
    }
    if answers.home.is_none() {
        answers.home = Some(profile.home());
    }
    let mut builder = OptionSetBuilder::new(environment);
    builder.apply_answers(answers)?;
    builder.build().map_err(|e| match e {
        SelectionError::MissingField(field) => Error::Answers(format!("missing {}", field)),
        other => Error::Selection(other),
    })
}
