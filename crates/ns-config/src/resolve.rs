//! Chain profile discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG paths →
//! system config → built-in profile.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::profile::{ChainProfile, ProfileError};

/// Where the active profile came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    /// Explicitly provided via `--profile`.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in the XDG config directory.
    XdgConfig,

    /// Found in /etc/node-setup/.
    SystemConfig,

    /// Compiled-in profile.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ProfileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileSource::CliArgument => write!(f, "CLI argument"),
            ProfileSource::Environment => write!(f, "environment variable"),
            ProfileSource::XdgConfig => write!(f, "XDG config"),
            ProfileSource::SystemConfig => write!(f, "system config"),
            ProfileSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// A discovered profile file (or its absence).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePath {
    pub path: Option<PathBuf>,
    pub source: ProfileSource,
}

/// Environment variable names.
pub const ENV_PROFILE_PATH: &str = "NODE_SETUP_PROFILE";
pub const ENV_CONFIG_DIR: &str = "NODE_SETUP_CONFIG_DIR";

const PROFILE_FILENAME: &str = "profile.toml";

/// Application name for XDG directories.
const APP_NAME: &str = "node-setup";

/// Find the profile file using the standard resolution order.
///
/// 1. Explicit CLI path (if it exists)
/// 2. `NODE_SETUP_PROFILE`
/// 3. `NODE_SETUP_CONFIG_DIR` + `profile.toml`
/// 4. XDG config directory (~/.config/node-setup/)
/// 5. System config (/etc/node-setup/)
/// 6. Built-in profile (None)
pub fn resolve_profile(cli_path: Option<&Path>) -> ProfilePath {
    let found = |path: PathBuf, source: ProfileSource| ProfilePath {
        path: Some(path),
        source,
    };

    if let Some(path) = cli_path {
        if path.exists() {
            return found(path.to_path_buf(), ProfileSource::CliArgument);
        }
    }

    if let Ok(env_path) = std::env::var(ENV_PROFILE_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return found(path, ProfileSource::Environment);
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(PROFILE_FILENAME);
        if path.exists() {
            return found(path, ProfileSource::Environment);
        }
    }

    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(PROFILE_FILENAME);
        if path.exists() {
            return found(path, ProfileSource::XdgConfig);
        }
    }

    let system_path = system_config_dir().join(PROFILE_FILENAME);
    if system_path.exists() {
        return found(system_path, ProfileSource::SystemConfig);
    }

    ProfilePath::default()
}

/// Resolve and load the active profile.
///
/// A `--profile` path that does not exist is an error rather than a silent
/// fall-through to the next source.
pub fn load_profile(cli_path: Option<&Path>) -> Result<(ChainProfile, ProfilePath), ProfileError> {
    if let Some(path) = cli_path {
        if !path.exists() {
            return Err(ProfileError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
    }

    let resolved = resolve_profile(cli_path);
    let profile = match &resolved.path {
        Some(path) => ChainProfile::from_file(path)?,
        None => ChainProfile::builtin(),
    };
    Ok((profile, resolved))
}

/// Get the XDG config directory for node-setup.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}
