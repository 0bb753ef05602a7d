//! External collaborators of the install pipeline.
//!
//! Everything with a side effect outside the process sits behind a trait so
//! the orchestrator can run against scripted fakes:
//! - [`NodeBinary`]: the chain daemon (and cosmovisor) as a subprocess
//! - [`GenesisFetcher`], [`TrustFetcher`], [`AddressProbe`]: one-shot HTTP
//! - [`ArtifactSink`]: whole-file writes
//! - [`Clock`]: the timestamp of a placeholder genesis
//!
//! Operator prompting lives in [`crate::prompt`].

pub mod clock;
pub mod fetch;
pub mod node;
pub mod runner;
pub mod sink;

pub use clock::{Clock, FixedClock, SystemClock};
pub use fetch::{
    AddressProbe, FetchError, GenesisFetcher, HttpAddressProbe, HttpClient, HttpGenesisFetcher,
    HttpTrustFetcher, TrustFetcher, TrustPoint,
};
pub use node::{NodeBinary, NodeError, ProcessNodeBinary};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, RunnerError};
pub use sink::{ArtifactSink, FsArtifactSink, MemoryArtifactSink, WriteError, WrittenArtifact};
