//! node-setup installer CLI entry point.

use clap::{Args, CommandFactory, Parser, Subcommand};
use ns_common::{
    Architecture, EnvironmentCapabilities, Error, NodeType, OptionAnswers, OutputFormat,
    ServiceManager, SyncMode,
};
use ns_config::{load_profile, ChainProfile, ProfilePath};
use ns_core::capabilities::{detect_capabilities, DetectionReport};
use ns_core::collab::{
    AddressProbe, ArtifactSink, FsArtifactSink, HttpAddressProbe, HttpClient, HttpGenesisFetcher,
    HttpTrustFetcher, MemoryArtifactSink, ProcessNodeBinary, SystemClock,
};
use ns_core::commands::{self, load_answers};
use ns_core::exit_codes::ExitCode;
use ns_core::logging::{
    event_names, generate_run_id, get_host_id, init_logging, LogConfig, LogContext, LogFormat,
    LogLevel, Stage,
};
use ns_core::orchestrator::service_user_from_env;
use ns_core::output;
use ns_core::prompt::{collect_options, options_from_answers, PromptServices, TerminalPrompter};
use ns_core::{log_event, Collaborators, GenesisSource, InstallRequest, Orchestrator};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Report/schema version of this CLI's payloads.
const SCHEMA_VERSION: &str = ns_core::orchestrator::REPORT_SCHEMA_VERSION;

#[derive(Parser)]
#[command(name = "ns-core")]
#[command(author, version, about = "Cosmos node installer core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "md")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Chain profile file
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    /// Node home directory
    #[arg(long, global = true, env = "NODE_SETUP_HOME")]
    home: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a node: options, binary, init, genesis, documents, service, keys
    Install(InstallArgs),

    /// Print the documents and launch plan an answers file produces
    Render(RenderArgs),

    /// Re-apply a node-type profile to the documents in <home>/config
    Patch(PatchArgs),

    /// Detect host capabilities and validate the profile and answers
    Check(CheckArgs),

    /// Print the JSON schema of the answers file
    Schema,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Print version information
    Version,
}

/// Option values given on the command line; they override the answers file.
#[derive(Args, Debug, Default)]
struct OptionFlags {
    /// Answers file (TOML)
    #[arg(long)]
    answers: Option<PathBuf>,

    #[arg(long, value_enum)]
    arch: Option<Architecture>,

    #[arg(long)]
    moniker: Option<String>,

    /// host:port advertised to peers
    #[arg(long)]
    external_address: Option<String>,

    #[arg(long, value_enum)]
    node_type: Option<NodeType>,

    #[arg(long, value_enum)]
    sync_mode: Option<SyncMode>,

    #[arg(long, value_enum)]
    service_manager: Option<ServiceManager>,
}

#[derive(Args, Debug)]
struct InstallArgs {
    #[command(flatten)]
    options: OptionFlags,

    /// Do not prompt; missing options take their defaults
    #[arg(long, short = 'y')]
    yes: bool,

    /// Render everything, write nothing, run no daemon command
    #[arg(long)]
    dry_run: bool,

    /// Use a local genesis file instead of fetching one
    #[arg(long, conflicts_with = "genesis_url")]
    genesis_file: Option<PathBuf>,

    /// Fetch genesis from this URL instead of the profile's
    #[arg(long)]
    genesis_url: Option<String>,

    /// Directory receiving the systemd unit
    #[arg(long)]
    unit_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    options: OptionFlags,

    /// Render as if the target host runs systemd
    #[arg(long)]
    assume_supervisor: bool,
}

#[derive(Args, Debug)]
struct PatchArgs {
    /// Node-type profile to apply
    #[arg(long, value_enum)]
    node_type: NodeType,

    /// Show the result without writing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Also validate this answers file
    #[arg(long)]
    answers: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let log_format = match cli.global.format {
        OutputFormat::Json => Some(LogFormat::Jsonl),
        _ => None,
    };
    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        log_format,
    );
    let log_config = if cli.global.no_color {
        log_config.with_color(false)
    } else {
        log_config
    };
    init_logging(&log_config);

    let exit_code = match cli.command {
        Commands::Install(ref args) => run_install(&cli.global, args),
        Commands::Render(ref args) => run_render(&cli.global, args),
        Commands::Patch(ref args) => run_patch(&cli.global, args),
        Commands::Check(ref args) => run_check(&cli.global, args),
        Commands::Schema => run_schema(),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "ns-core", &mut std::io::stdout());
            ExitCode::Clean
        }
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Shared helpers
// ============================================================================

fn use_color(global: &GlobalOpts) -> bool {
    !global.no_color && std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal()
}

fn print_payload(payload: Option<String>) {
    if let Some(text) = payload {
        println!("{}", text.trim_end());
    }
}

/// Report an error in the selected format and map it to an exit code.
fn fail(global: &GlobalOpts, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json => print_payload(output::error_payload(err, global.format, false)),
        format => {
            if let Some(text) = output::error_payload(err, format, use_color(global)) {
                eprintln!("{}", text);
            }
        }
    }
    ExitCode::for_error(err)
}

fn load_profile_or_fail(
    global: &GlobalOpts,
    ctx: &LogContext,
) -> Result<(ChainProfile, ProfilePath), ExitCode> {
    match load_profile(global.profile.as_deref()) {
        Ok((profile, path)) => {
            match path.path {
                Some(ref file) => {
                    let file = file.display().to_string();
                    log_event!(
                        ctx,
                        DEBUG,
                        event_names::PROFILE_LOADED,
                        Stage::Init,
                        "chain profile loaded",
                        chain_id = profile.chain_id.as_str(),
                        path = file.as_str()
                    );
                }
                None => log_event!(
                    ctx,
                    DEBUG,
                    event_names::PROFILE_DEFAULT_USED,
                    Stage::Init,
                    "using the built-in chain profile",
                    chain_id = profile.chain_id.as_str()
                ),
            }
            Ok((profile, path))
        }
        Err(e) => Err(fail(global, &e.into())),
    }
}

fn detect(ctx: &LogContext) -> DetectionReport {
    let detection = detect_capabilities();
    let summary = detection.capabilities.summary();
    log_event!(
        ctx,
        DEBUG,
        event_names::CAPABILITIES_DETECTED,
        Stage::Init,
        "host capabilities detected",
        summary = summary.as_str()
    );
    detection
}

/// Answers file (if any) overlaid with command-line values.
fn seed_answers(global: &GlobalOpts, flags: &OptionFlags) -> Result<OptionAnswers, Error> {
    let mut answers = match flags.answers {
        Some(ref path) => load_answers(path)?,
        None => OptionAnswers::default(),
    };
    if flags.arch.is_some() {
        answers.architecture = flags.arch;
    }
    if flags.moniker.is_some() {
        answers.moniker = flags.moniker.clone();
    }
    if flags.external_address.is_some() {
        answers.external_address = flags.external_address.clone();
    }
    if flags.node_type.is_some() {
        answers.node_type = flags.node_type;
    }
    if flags.sync_mode.is_some() {
        answers.sync_mode = flags.sync_mode;
    }
    if flags.service_manager.is_some() {
        answers.service_manager = flags.service_manager;
    }
    if global.home.is_some() {
        answers.home = global.home.clone();
    }
    Ok(answers)
}

fn new_context() -> LogContext {
    LogContext::new(generate_run_id(), get_host_id())
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_install(global: &GlobalOpts, args: &InstallArgs) -> ExitCode {
    let ctx = new_context();
    let (profile, _) = match load_profile_or_fail(global, &ctx) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let detection = detect(&ctx);
    let env = detection.capabilities;
    let seed = match seed_answers(global, &args.options) {
        Ok(seed) => seed,
        Err(e) => return fail(global, &e),
    };

    let genesis = match (&args.genesis_file, &args.genesis_url) {
        (Some(path), _) => GenesisSource::File(path.clone()),
        (None, Some(url)) => GenesisSource::Url(url.clone()),
        (None, None) => GenesisSource::Profile,
    };
    let request = InstallRequest {
        genesis,
        dry_run: args.dry_run,
        unit_dir: args.unit_dir.clone(),
        service_user: service_user_from_env(),
    };

    let http = HttpClient::default();
    let genesis_fetcher = HttpGenesisFetcher::new(http.clone());
    let mut node = ProcessNodeBinary::new(profile.daemon_name.clone(), profile.binary_dir.clone());
    let mut fs_sink = FsArtifactSink;
    let mut memory_sink = MemoryArtifactSink::new();
    let sink: &mut dyn ArtifactSink = if args.dry_run {
        &mut memory_sink
    } else {
        &mut fs_sink
    };
    let clock = SystemClock;
    let mut collab = Collaborators {
        node: &mut node,
        genesis: &genesis_fetcher,
        sink,
        clock: &clock,
    };

    let interactive = args.options.answers.is_none() && !args.yes;
    let orchestrator = Orchestrator::new(&profile, request, ctx);
    let result = orchestrator.run(
        || {
            if !interactive {
                return options_from_answers(env, &profile, seed);
            }
            let trust = HttpTrustFetcher::new(http.clone());
            let probe = profile
                .address_probe_url
                .as_ref()
                .map(HttpAddressProbe::new);
            let services = PromptServices {
                address: probe.as_ref().map(|p| p as &dyn AddressProbe),
                trust: Some(&trust),
            };
            let mut prompter = TerminalPrompter::stdio();
            collect_options(&mut prompter, env, &profile, seed, &services)
        },
        &mut collab,
    );

    match result {
        Ok(report) => {
            print_payload(output::install_report(&report, global.format));
            report.exit_code()
        }
        Err(err) => {
            let payload = output::pipeline_error_payload(&err, global.format, use_color(global));
            if let Some(text) = payload {
                if global.format == OutputFormat::Json {
                    println!("{}", text);
                } else {
                    eprintln!("{}", text);
                }
            }
            ExitCode::for_error(&err.source)
        }
    }
}

fn run_render(global: &GlobalOpts, args: &RenderArgs) -> ExitCode {
    let ctx = new_context();
    let (profile, _) = match load_profile_or_fail(global, &ctx) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let env = if args.assume_supervisor {
        EnvironmentCapabilities::with_supervisor()
    } else {
        detect(&ctx).capabilities
    };

    let preview = seed_answers(global, &args.options)
        .and_then(|seed| options_from_answers(env, &profile, seed))
        .and_then(|options| commands::render_preview(options, &profile, &SystemClock));
    match preview {
        Ok(preview) => {
            print_payload(output::render_preview(&preview, global.format));
            if preview.manual_edit_required {
                ExitCode::ManualActionRequired
            } else {
                ExitCode::Clean
            }
        }
        Err(e) => fail(global, &e),
    }
}

fn run_patch(global: &GlobalOpts, args: &PatchArgs) -> ExitCode {
    let ctx = new_context();
    let (profile, _) = match load_profile_or_fail(global, &ctx) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let home = global.home.clone().unwrap_or_else(|| profile.home());

    let mut fs_sink = FsArtifactSink;
    let mut memory_sink = MemoryArtifactSink::new();
    let sink: &mut dyn ArtifactSink = if args.dry_run {
        &mut memory_sink
    } else {
        &mut fs_sink
    };

    match commands::repatch_home(&home, args.node_type, sink) {
        Ok(report) => {
            print_payload(output::patch_report(&report, global.format));
            if report.manual_edit_required {
                ExitCode::ManualActionRequired
            } else {
                ExitCode::Clean
            }
        }
        Err(e) => fail(global, &e),
    }
}

fn run_check(global: &GlobalOpts, args: &CheckArgs) -> ExitCode {
    let ctx = new_context();
    let (profile, profile_path) = match load_profile_or_fail(global, &ctx) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let detection = detect(&ctx);
    let report = commands::check(&profile, &profile_path, detection, args.answers.as_deref());
    print_payload(output::check_report(&report, global.format));
    if report.ok() {
        ExitCode::Clean
    } else {
        ExitCode::ConfigError
    }
}

fn run_schema() -> ExitCode {
    let schema = schemars::schema_for!(OptionAnswers);
    println!("{}", output::to_json(&schema));
    ExitCode::Clean
}

fn print_version(global: &GlobalOpts) {
    let version_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "ns_core_version": env!("CARGO_PKG_VERSION"),
        "profile_schema_version": ns_config::PROFILE_SCHEMA_VERSION,
    });

    match global.format {
        OutputFormat::Json => println!("{}", output::to_json(&version_info)),
        OutputFormat::Exitcode => {}
        _ => {
            println!("ns-core {}", env!("CARGO_PKG_VERSION"));
            println!("report schema version: {}", SCHEMA_VERSION);
        }
    }
}
