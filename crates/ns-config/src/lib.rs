//! node-setup configuration derivation.
//!
//! This crate provides:
//! - The chain profile (process-wide constants) and its resolution
//!   (CLI → env → XDG → /etc → built-in)
//! - A structural model of `config.toml` / `app.toml`
//! - The baseline template and the genesis document
//! - The node-type and sync-mode patch policy

pub mod document;
pub mod genesis;
pub mod patch;
pub mod profile;
pub mod resolve;
pub mod template;
pub mod validate;

pub use document::{ConfigDocument, ConfigValue, DocumentError, DocumentKind};
pub use genesis::{GenesisDocument, GenesisError, GenesisOrigin};
pub use patch::{node_type_patches, ConfigPatcher, KeyPatch, PatchError, PatchOutcome, SyncPlan};
pub use profile::{ChainProfile, ProfileError};
pub use resolve::{load_profile, resolve_profile, ProfilePath, ProfileSource};
pub use template::{ConfigTemplate, GenesisInput, TemplateSet};
pub use validate::{ValidationError, ValidationResult};

/// Schema version for profile files.
pub const PROFILE_SCHEMA_VERSION: &str = "1.0.0";

impl From<DocumentError> for ns_common::Error {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::MissingKey { document, path } => ns_common::Error::MissingKey {
                document: document.file_name().to_string(),
                path,
            },
            other => ns_common::Error::Document {
                document: other.document().file_name().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<PatchError> for ns_common::Error {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::Document(inner) => inner.into(),
            PatchError::StateSyncIncomplete(reason) => {
                ns_common::Error::StateSyncIncomplete(reason)
            }
        }
    }
}

impl From<GenesisError> for ns_common::Error {
    fn from(err: GenesisError) -> Self {
        ns_common::Error::Genesis(err.to_string())
    }
}

impl From<ProfileError> for ns_common::Error {
    fn from(err: ProfileError) -> Self {
        ns_common::Error::Profile(err.to_string())
    }
}
