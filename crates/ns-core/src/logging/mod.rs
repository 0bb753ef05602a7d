//! Structured logging for ns-core.
//!
//! Two renderings of the same `tracing` events:
//! - human lines for an operator watching an install
//! - JSONL (`--format json` or `NS_LOG_FORMAT=jsonl`) for automation
//!
//! Every event carries the run's correlation ids and its pipeline stage, and
//! uses its event name as the tracing target:
//!
//! ```ignore
//! let ctx = LogContext::new(generate_run_id(), get_host_id());
//! log_event!(ctx, INFO, event_names::STAGE_STARTED, Stage::Genesis, "fetching genesis");
//! ```
//!
//! stdout belongs to command payloads; logs always go to stderr, where the
//! interactive prompts also live.

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Level, LogContext, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.filter_directives())
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Jsonl => registry.with(JsonlLayer::stderr()).try_init(),
        LogFormat::Human => {
            // Event names replace module paths as targets; they stay visible.
            let human = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(config.color && std::io::stderr().is_terminal());
            if config.timestamps {
                registry.with(human).try_init()
            } else {
                registry.with(human.without_time()).try_init()
            }
        }
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}

/// Run id for this invocation (`ns-YYYYMMDD-HHMMSS-xxxx`).
pub fn generate_run_id() -> String {
    ns_common::RunId::new().to_string()
}

/// Stable, non-identifying host id: a digest prefix of the machine id or
/// hostname, random when neither is available.
pub fn get_host_id() -> String {
    let seed = std::fs::read_to_string("/etc/machine-id")
        .ok()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()));

    let digest = match seed {
        Some(seed) => {
            use sha2::{Digest, Sha256};
            hex::encode(Sha256::digest(seed.as_bytes()))
        }
        None => uuid::Uuid::new_v4().simple().to_string(),
    };
    format!("host-{}", &digest[..8])
}

/// Emit one structured event with the run context.
///
/// `$event` must be one of the `event_names` constants: it becomes the
/// tracing target, which has to be known at compile time.
///
/// ```ignore
/// log_event!(ctx, WARN, event_names::GENESIS_DEGRADED, Stage::Genesis, "placeholder genesis",
///     reason = reason);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, $level:ident, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::event!(
            target: $event,
            tracing::Level::$level,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            $($key = $val,)*
            message = %$msg,
        )
    };
}
