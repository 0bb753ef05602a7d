//! Genesis document handling.
//!
//! Genesis is opaque apart from `chain_id` and `genesis_time`. It is taken
//! verbatim from a supplied source, or synthesized as a two-field placeholder
//! that is flagged so callers can tell the operator a real genesis is still
//! needed.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Genesis source errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenesisError {
    #[error("not valid JSON: {0}")]
    InvalidJson(String),

    #[error("genesis must be a JSON object")]
    NotAnObject,

    #[error("genesis has no '{0}' field")]
    MissingField(&'static str),

    #[error("genesis is for chain '{found}', expected '{expected}'")]
    ChainIdMismatch { expected: String, found: String },
}

/// Where a genesis document came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenesisOrigin {
    /// Taken from a fetched or local document.
    Supplied { label: String },
    /// Synthesized; not usable to join a live network.
    Placeholder { reason: String },
}

/// A genesis document ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct GenesisDocument {
    value: Value,
    placeholder: bool,
    origin: GenesisOrigin,
    raw: Option<String>,
}

impl GenesisDocument {
    /// Accept a supplied source: a raw genesis, or an RPC `/genesis` response
    /// whose `result.genesis` holds it.
    pub fn from_source(
        text: &str,
        label: impl Into<String>,
        expected_chain_id: &str,
    ) -> Result<Self, GenesisError> {
        let parsed: Value =
            serde_json::from_str(text).map_err(|e| GenesisError::InvalidJson(e.to_string()))?;

        let (value, raw) = match parsed.pointer("/result/genesis") {
            Some(inner) => (inner.clone(), None),
            None => (parsed, Some(text.to_string())),
        };

        let obj = value.as_object().ok_or(GenesisError::NotAnObject)?;
        let chain_id = obj
            .get("chain_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(GenesisError::MissingField("chain_id"))?;
        obj.get("genesis_time")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(GenesisError::MissingField("genesis_time"))?;

        if chain_id != expected_chain_id {
            return Err(GenesisError::ChainIdMismatch {
                expected: expected_chain_id.to_string(),
                found: chain_id.to_string(),
            });
        }

        Ok(GenesisDocument {
            value,
            placeholder: false,
            origin: GenesisOrigin::Supplied {
                label: label.into(),
            },
            raw,
        })
    }

    /// Synthesize the two-field placeholder.
    pub fn placeholder(
        chain_id: &str,
        timestamp: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        let value = serde_json::json!({
            "chain_id": chain_id,
            "genesis_time": timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        GenesisDocument {
            value,
            placeholder: true,
            origin: GenesisOrigin::Placeholder {
                reason: reason.into(),
            },
            raw: None,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn origin(&self) -> &GenesisOrigin {
        &self.origin
    }

    pub fn chain_id(&self) -> Option<&str> {
        self.value.get("chain_id").and_then(Value::as_str)
    }

    pub fn genesis_time(&self) -> Option<&str> {
        self.value.get("genesis_time").and_then(Value::as_str)
    }

    /// File contents for `config/genesis.json`.
    pub fn render(&self) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut text =
            serde_json::to_string_pretty(&self.value).unwrap_or_else(|_| "{}".to_string());
        text.push('\n');
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RAW: &str =
        r#"{"genesis_time":"2024-03-01T12:00:00Z","chain_id":"test-1","app_state":{}}"#;

    #[test]
    fn test_raw_source_kept_verbatim() {
        let doc = GenesisDocument::from_source(RAW, "file", "test-1").unwrap();
        assert!(!doc.is_placeholder());
        assert_eq!(doc.render(), RAW);
        assert_eq!(doc.chain_id(), Some("test-1"));
    }

    #[test]
    fn test_rpc_envelope_unwrapped() {
        let envelope = format!(r#"{{"jsonrpc":"2.0","id":-1,"result":{{"genesis":{}}}}}"#, RAW);
        let doc = GenesisDocument::from_source(&envelope, "rpc", "test-1").unwrap();
        assert_eq!(doc.genesis_time(), Some("2024-03-01T12:00:00Z"));
        assert!(doc.value().get("jsonrpc").is_none());
    }

    #[test]
    fn test_chain_id_mismatch() {
        let err = GenesisDocument::from_source(RAW, "file", "main-1").unwrap_err();
        assert_eq!(
            err,
            GenesisError::ChainIdMismatch {
                expected: "main-1".into(),
                found: "test-1".into()
            }
        );
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            GenesisDocument::from_source(r#"{"chain_id":"a"}"#, "f", "a").unwrap_err(),
            GenesisError::MissingField("genesis_time")
        );
        assert_eq!(
            GenesisDocument::from_source("[]", "f", "a").unwrap_err(),
            GenesisError::NotAnObject
        );
        assert!(matches!(
            GenesisDocument::from_source("<html>", "f", "a").unwrap_err(),
            GenesisError::InvalidJson(_)
        ));
    }

    #[test]
    fn test_placeholder() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 14, 30, 22).unwrap();
        let doc = GenesisDocument::placeholder("test-1", ts, "fetch failed");
        assert!(doc.is_placeholder());
        assert_eq!(doc.chain_id(), Some("test-1"));
        assert_eq!(doc.genesis_time(), Some("2026-01-15T14:30:22Z"));
        assert_eq!(
            doc.origin(),
            &GenesisOrigin::Placeholder {
                reason: "fetch failed".into()
            }
        );
        assert!(doc.render().ends_with("}\n"));
    }
}
