//! Chain profile: the process-wide constants of the chain being installed.
//!
//! None of these values are operator choices. A built-in profile ships in the
//! binary; deployments for another network override it with a `profile.toml`
//! found through [`crate::resolve`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::validate::{validate_profile, ValidationError};

/// Errors while loading a chain profile.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Constants describing one chain network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ChainProfile {
    /// Schema version of the profile file.
    pub schema_version: String,

    /// Chain identifier written into genesis and passed to `init`.
    pub chain_id: String,

    /// Name of the node daemon binary.
    pub daemon_name: String,

    /// Base denomination.
    pub denom: String,

    /// `minimum-gas-prices` written into app.toml.
    pub minimum_gas_prices: String,

    /// Peers as `node_id@host:port`.
    pub persistent_peers: Vec<String>,

    /// Where to download genesis from, if anywhere.
    pub genesis_url: Option<String>,

    /// Container image for docker launches.
    pub docker_image: String,

    /// Release download URL; `{arch}` is replaced with `amd64` or `arm64`.
    pub binary_url_template: Option<String>,

    /// Directory the daemon binary is installed into.
    pub binary_dir: PathBuf,

    /// Keyring backend used for key commands.
    pub keyring_backend: String,

    /// Node home; defaults to `~/.<daemon_name>`.
    pub default_home: Option<PathBuf>,

    /// Plain-text endpoint answering with the caller's public IP.
    pub address_probe_url: Option<String>,

    /// Directory systemd units are written to.
    pub unit_dir: PathBuf,
}

impl Default for ChainProfile {
    fn default() -> Self {
        ChainProfile::builtin()
    }
}

impl ChainProfile {
    /// The profile compiled into the binary.
    pub fn builtin() -> Self {
        ChainProfile {
            schema_version: crate::PROFILE_SCHEMA_VERSION.to_string(),
            chain_id: "nodechain_9000-1".to_string(),
            daemon_name: "noded".to_string(),
            denom: "anode".to_string(),
            minimum_gas_prices: "0.0025anode".to_string(),
            persistent_peers: vec![
                "5d3c6fb3b21fc1df9b1d1e0f1a6a2fc4d8e9a7b1@seed-1.nodechain.network:26656"
                    .to_string(),
                "8a14c37e2d7f0b6e95d4a2c1f3e8b7a6d5c4b3a2@seed-2.nodechain.network:26656"
                    .to_string(),
            ],
            genesis_url: None,
            docker_image: "ghcr.io/nodechain/noded:latest".to_string(),
            binary_url_template: None,
            binary_dir: PathBuf::from("/usr/local/bin"),
            keyring_backend: "file".to_string(),
            default_home: None,
            address_probe_url: Some("https://api.ipify.org".to_string()),
            unit_dir: PathBuf::from("/etc/systemd/system"),
        }
    }

    /// Load and validate a profile file. Missing fields take built-in values.
    pub fn from_file(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let profile = Self::from_toml_str(&text).map_err(|err| match err {
            ProfileError::Parse { message, .. } => ProfileError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })?;
        Ok(profile)
    }

    /// Parse and validate profile TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        let profile: ChainProfile = toml::from_str(text).map_err(|e| ProfileError::Parse {
            path: PathBuf::new(),
            message: e.message().to_string(),
        })?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    /// Node home used when the operator does not choose one.
    pub fn home(&self) -> PathBuf {
        if let Some(home) = &self.default_home {
            return home.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/root"))
            .join(format!(".{}", self.daemon_name))
    }

    /// Release URL for an architecture, if the profile configures downloads.
    pub fn binary_url(&self, arch: ns_common::Architecture) -> Option<String> {
        self.binary_url_template
            .as_ref()
            .map(|t| t.replace("{arch}", arch.as_str()))
    }

    /// Peers joined the way `p2p.persistent_peers` expects.
    pub fn persistent_peers_joined(&self) -> String {
        self.persistent_peers.join(",")
    }

    /// Installed path of the daemon binary.
    pub fn daemon_path(&self) -> PathBuf {
        self.binary_dir.join(&self.daemon_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_common::Architecture;

    #[test]
    fn test_builtin_is_valid() {
        validate_profile(&ChainProfile::builtin()).unwrap();
    }

    #[test]
    fn test_partial_file_keeps_builtin_defaults() {
        let profile = ChainProfile::from_toml_str("chain_id = \"testnet-7\"\n").unwrap();
        assert_eq!(profile.chain_id, "testnet-7");
        assert_eq!(profile.daemon_name, ChainProfile::builtin().daemon_name);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ChainProfile::from_toml_str("chainid = \"x\"\n").unwrap_err();
        assert!(matches!(err, ProfileError::Parse { .. }));
    }

    #[test]
    fn test_binary_url() {
        let profile = ChainProfile {
            binary_url_template: Some("https://dl.example.com/noded-linux-{arch}".into()),
            ..ChainProfile::builtin()
        };
        assert_eq!(
            profile.binary_url(Architecture::Arm64).as_deref(),
            Some("https://dl.example.com/noded-linux-arm64")
        );
        assert!(ChainProfile::builtin().binary_url(Architecture::Amd64).is_none());
    }

    #[test]
    fn test_home_default() {
        let profile = ChainProfile {
            default_home: Some("/srv/noded".into()),
            ..ChainProfile::builtin()
        };
        assert_eq!(profile.home(), PathBuf::from("/srv/noded"));
        assert!(ChainProfile::builtin().home().ends_with(".noded"));
    }

    #[test]
    fn test_from_file_missing() {
        let err = ChainProfile::from_file(Path::new("/nonexistent/profile.toml")).unwrap_err();
        assert!(matches!(err, ProfileError::Io { .. }));
    }
}
