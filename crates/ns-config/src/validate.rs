//! Chain profile validation errors and semantic validation.

use thiserror::Error;

use crate::profile::ChainProfile;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Profile validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }

    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a chain profile semantically.
pub fn validate_profile(profile: &ChainProfile) -> ValidationResult<()> {
    if profile.schema_version != crate::PROFILE_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::PROFILE_SCHEMA_VERSION.to_string(),
            actual: profile.schema_version.clone(),
        });
    }

    require("chain_id", &profile.chain_id)?;
    require("daemon_name", &profile.daemon_name)?;
    require("denom", &profile.denom)?;
    require("docker_image", &profile.docker_image)?;
    require("keyring_backend", &profile.keyring_backend)?;

    if profile.chain_id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::invalid("chain_id", "must not contain whitespace"));
    }

    if !profile
        .daemon_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid(
            "daemon_name",
            "must be a plain file name",
        ));
    }

    for peer in &profile.persistent_peers {
        validate_peer(peer)?;
    }

    if let Some(template) = &profile.binary_url_template {
        validate_url("binary_url_template", template)?;
        if !template.contains("{arch}") {
            return Err(ValidationError::invalid(
                "binary_url_template",
                "must contain the {arch} placeholder",
            ));
        }
    }

    if let Some(url) = &profile.genesis_url {
        validate_url("genesis_url", url)?;
    }

    if let Some(url) = &profile.address_probe_url {
        validate_url("address_probe_url", url)?;
    }

    if !matches!(
        profile.keyring_backend.as_str(),
        "os" | "file" | "kwallet" | "pass" | "test" | "memory"
    ) {
        return Err(ValidationError::invalid(
            "keyring_backend",
            format!("unknown backend '{}'", profile.keyring_backend),
        ));
    }

    if let Some(home) = &profile.default_home {
        if !home.is_absolute() {
            return Err(ValidationError::invalid(
                "default_home",
                "must be an absolute path",
            ));
        }
    }

    Ok(())
}

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

fn validate_url(field: &str, url: &str) -> ValidationResult<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ValidationError::invalid(
            field,
            format!("'{}' is not an http(s) URL", url),
        ));
    }
    Ok(())
}

/// Validate a `node_id@host:port` peer entry.
pub fn validate_peer(peer: &str) -> ValidationResult<()> {
    let invalid = |message: &str| {
        ValidationError::invalid("persistent_peers", format!("'{}': {}", peer, message))
    };

    let (id, addr) = peer.split_once('@').ok_or_else(|| invalid("expected id@host:port"))?;
    if id.len() != 40 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("node id must be 40 hex characters"));
    }
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(invalid("invalid port")),
    }
}
