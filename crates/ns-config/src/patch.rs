//! Node-type and sync-mode patches.
//!
//! Patches only overwrite keys that the baseline template already carries.
//! Every write goes through [`ConfigDocument::set`], so a key missing from the
//! target document is an error, never a silent no-op. Applying a patch twice
//! gives the same documents as applying it once.

use ns_common::{NodeType, OptionSet, StateSyncParams, SyncMode};
use std::time::Duration;
use thiserror::Error;

use crate::document::{ConfigDocument, ConfigValue, DocumentError, DocumentKind};

/// Patch application errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("{0}")]
    StateSyncIncomplete(String),
}

/// Value written by a static patch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchValue {
    Str(&'static str),
    Int(i64),
    Bool(bool),
}

impl From<PatchValue> for ConfigValue {
    fn from(v: PatchValue) -> Self {
        match v {
            PatchValue::Str(s) => ConfigValue::String(s.to_string()),
            PatchValue::Int(i) => ConfigValue::Integer(i),
            PatchValue::Bool(b) => ConfigValue::Bool(b),
        }
    }
}

/// One `(document, key path, value)` entry of the node-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPatch {
    pub document: DocumentKind,
    pub path: &'static str,
    pub value: PatchValue,
}

const fn app(path: &'static str, value: PatchValue) -> KeyPatch {
    KeyPatch {
        document: DocumentKind::App,
        path,
        value,
    }
}

const fn consensus(path: &'static str, value: PatchValue) -> KeyPatch {
    KeyPatch {
        document: DocumentKind::Consensus,
        path,
        value,
    }
}

use PatchValue::{Bool, Int, Str};

const FULL: &[KeyPatch] = &[
    app("pruning", Str("default")),
    consensus("tx_index.indexer", Str("kv")),
];

const ARCHIVE: &[KeyPatch] = &[
    app("pruning", Str("nothing")),
    consensus("tx_index.indexer", Str("kv")),
    app("state-sync.snapshot-interval", Int(0)),
];

const RPC: &[KeyPatch] = &[
    app("pruning", Str("default")),
    consensus("tx_index.indexer", Str("kv")),
    consensus("rpc.laddr", Str("tcp://0.0.0.0:26657")),
    consensus("p2p.max_num_inbound_peers", Int(100)),
    app("api.enable", Bool(true)),
];

const VALIDATOR: &[KeyPatch] = &[
    app("pruning", Str("custom")),
    app("pruning-keep-recent", Str("100")),
    app("pruning-interval", Str("10")),
    consensus("tx_index.indexer", Str("null")),
    app("telemetry.enabled", Bool(true)),
    consensus("instrumentation.prometheus", Bool(true)),
];

/// Static patch table for a node type. `custom` has no entries.
pub fn node_type_patches(node_type: NodeType) -> &'static [KeyPatch] {
    match node_type {
        NodeType::Full => FULL,
        NodeType::Archive => ARCHIVE,
        NodeType::Rpc => RPC,
        NodeType::Validator => VALIDATOR,
        NodeType::Custom => &[],
    }
}

/// Sync-mode request, applied only on the node's first start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub mode: SyncMode,
    pub state_sync: Option<StateSyncParams>,
}

impl SyncPlan {
    pub fn from_options(options: &OptionSet) -> Self {
        SyncPlan {
            mode: options.sync_mode(),
            state_sync: options.state_sync().cloned(),
        }
    }
}

/// Patched documents plus what the operator still has to do.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub consensus: ConfigDocument,
    pub app: ConfigDocument,
    /// Documents were left untouched and need hand editing.
    pub manual_edit_required: bool,
    /// Operator-facing follow-ups.
    pub notices: Vec<String>,
    /// `file:key` of every write, in order.
    pub applied: Vec<String>,
}

/// Node-type and sync-mode patch policy.
pub struct ConfigPatcher;

impl ConfigPatcher {
    /// Apply the node-type table and, when given, the sync plan.
    ///
    /// State-sync parameters are checked before any write, so an incomplete
    /// trust point leaves both documents untouched.
    pub fn patch(
        consensus: ConfigDocument,
        app: ConfigDocument,
        node_type: NodeType,
        sync: Option<&SyncPlan>,
    ) -> Result<PatchOutcome, PatchError> {
        let mut outcome = PatchOutcome {
            consensus,
            app,
            manual_edit_required: false,
            notices: Vec::new(),
            applied: Vec::new(),
        };

        if node_type == NodeType::Custom {
            outcome.manual_edit_required = true;
            outcome.notices.push(
                "custom node type: no changes applied, review config.toml and app.toml by hand"
                    .to_string(),
            );
            if sync.is_some_and(|s| s.mode == SyncMode::StateSync) {
                outcome
                    .notices
                    .push("enable state sync in config.toml [statesync] by hand".to_string());
            }
            return Ok(outcome);
        }

        let state_sync = match sync {
            Some(plan) if plan.mode == SyncMode::StateSync => {
                Some(Self::state_sync_values(plan.state_sync.as_ref())?)
            }
            _ => None,
        };

        for patch in node_type_patches(node_type) {
            outcome.write(patch.document, patch.path, patch.value.into())?;
        }

        match sync.map(|s| s.mode) {
            Some(SyncMode::StateSync) => {
                if let Some((values, duplicated)) = state_sync {
                    for (path, value) in values {
                        outcome.write(DocumentKind::Consensus, path, value)?;
                    }
                    if duplicated {
                        outcome.notices.push(
                            "only one state-sync RPC server given; it is listed twice".to_string(),
                        );
                    }
                }
            }
            Some(SyncMode::Snapshot) => outcome.notices.push(
                "place a pre-synced data directory in the node home before the first start"
                    .to_string(),
            ),
            Some(SyncMode::Genesis) | None => {}
        }

        Ok(outcome)
    }

    fn state_sync_values(
        params: Option<&StateSyncParams>,
    ) -> Result<(Vec<(&'static str, ConfigValue)>, bool), PatchError> {
        let params = params.ok_or_else(|| {
            PatchError::StateSyncIncomplete("no state-sync parameters supplied".to_string())
        })?;

        let mut servers: Vec<String> = params
            .rpc_servers
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if servers.is_empty() {
            return Err(PatchError::StateSyncIncomplete(
                "at least one trusted RPC server is required".to_string(),
            ));
        }
        let height = params.trust_height.filter(|h| *h > 0).ok_or_else(|| {
            PatchError::StateSyncIncomplete("trust height is empty".to_string())
        })?;
        let hash = params
            .trust_hash
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PatchError::StateSyncIncomplete("trust hash is empty".to_string()))?;
        let height = i64::try_from(height).map_err(|_| {
            PatchError::StateSyncIncomplete(format!("trust height {} is out of range", height))
        })?;

        let duplicated = servers.len() == 1;
        if duplicated {
            servers.push(servers[0].clone());
        }

        Ok((
            vec![
                ("statesync.enable", ConfigValue::Bool(true)),
                ("statesync.rpc_servers", ConfigValue::String(servers.join(","))),
                ("statesync.trust_height", ConfigValue::Integer(height)),
                ("statesync.trust_hash", ConfigValue::String(hash.to_string())),
                (
                    "statesync.trust_period",
                    ConfigValue::Duration(Duration::from_secs(params.trust_period_hours * 3600)),
                ),
            ],
            duplicated,
        ))
    }
}

impl PatchOutcome {
    fn write(
        &mut self,
        document: DocumentKind,
        path: &str,
        value: ConfigValue,
    ) -> Result<(), DocumentError> {
        let doc = match document {
            DocumentKind::Consensus => &mut self.consensus,
            DocumentKind::App => &mut self.app,
        };
        doc.set(path, value)?;
        self.applied.push(format!("{}:{}", document.file_name(), path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ChainProfile;
    use crate::template::ConfigTemplate;

    fn docs() -> (ConfigDocument, ConfigDocument) {
        let profile = ChainProfile::builtin();
        (
            ConfigTemplate::consensus("m", "", &profile),
            ConfigTemplate::app(&profile),
        )
    }

    fn patched(node_type: NodeType, sync: Option<&SyncPlan>) -> PatchOutcome {
        let (c, a) = docs();
        ConfigPatcher::patch(c, a, node_type, sync).unwrap()
    }

    fn str_at<'a>(doc: &'a ConfigDocument, path: &str) -> Option<&'a str> {
        doc.get(path).and_then(ConfigValue::as_str)
    }

    #[test]
    fn test_archive_values() {
        let out = patched(NodeType::Archive, None);
        assert_eq!(str_at(&out.app, "pruning"), Some("nothing"));
        assert_eq!(
            out.app.get("state-sync.snapshot-interval").and_then(ConfigValue::as_integer),
            Some(0)
        );
        assert_eq!(str_at(&out.consensus, "tx_index.indexer"), Some("kv"));
    }

    #[test]
    fn test_validator_values() {
        let out = patched(NodeType::Validator, None);
        assert_eq!(str_at(&out.app, "pruning"), Some("custom"));
        assert_eq!(str_at(&out.app, "pruning-keep-recent"), Some("100"));
        assert_eq!(str_at(&out.app, "pruning-interval"), Some("10"));
        assert_eq!(str_at(&out.consensus, "tx_index.indexer"), Some("null"));
        assert_eq!(out.app.get("telemetry.enabled").and_then(ConfigValue::as_bool), Some(true));
        assert_eq!(
            out.consensus.get("instrumentation.prometheus").and_then(ConfigValue::as_bool),
            Some(true)
        );
    }

    #[test]
    fn test_rpc_values() {
        let out = patched(NodeType::Rpc, None);
        assert_eq!(str_at(&out.consensus, "rpc.laddr"), Some("tcp://0.0.0.0:26657"));
        assert_eq!(
            out.consensus.get("p2p.max_num_inbound_peers").and_then(ConfigValue::as_integer),
            Some(100)
        );
        assert_eq!(out.app.get("api.enable").and_then(ConfigValue::as_bool), Some(true));
    }

    #[test]
    fn test_custom_is_untouched() {
        let (c, a) = docs();
        let out = ConfigPatcher::patch(c.clone(), a.clone(), NodeType::Custom, None).unwrap();
        assert!(out.manual_edit_required);
        assert_eq!(out.consensus, c);
        assert_eq!(out.app, a);
        assert!(out.applied.is_empty());
    }

    #[test]
    fn test_missing_key_is_error() {
        let (_, a) = docs();
        let bare = ConfigDocument::new(DocumentKind::Consensus);
        let err = ConfigPatcher::patch(bare, a, NodeType::Full, None).unwrap_err();
        assert_eq!(
            err,
            PatchError::Document(DocumentError::MissingKey {
                document: DocumentKind::Consensus,
                path: "tx_index.indexer".into()
            })
        );
    }

    #[test]
    fn test_state_sync_applied_and_server_duplicated() {
        let plan = SyncPlan {
            mode: SyncMode::StateSync,
            state_sync: Some(
                StateSyncParams::from_rpc("https://rpc.example.com:443")
                    .with_trust(4200, "AB".repeat(32)),
            ),
        };
        let out = patched(NodeType::Full, Some(&plan));
        assert_eq!(
            out.consensus.get("statesync.enable").and_then(ConfigValue::as_bool),
            Some(true)
        );
        assert_eq!(
            str_at(&out.consensus, "statesync.rpc_servers"),
            Some("https://rpc.example.com:443,https://rpc.example.com:443")
        );
        assert_eq!(
            out.consensus.get("statesync.trust_height").and_then(ConfigValue::as_integer),
            Some(4200)
        );
        assert!(out.consensus.render().contains("trust_period = \"168h0m0s\""));
        assert_eq!(out.notices.len(), 1);
    }

    #[test]
    fn test_state_sync_empty_hash_fails() {
        let plan = SyncPlan {
            mode: SyncMode::StateSync,
            state_sync: Some(StateSyncParams {
                trust_height: Some(10),
                ..StateSyncParams::from_rpc("https://rpc.example.com")
            }),
        };
        let (c, a) = docs();
        let err = ConfigPatcher::patch(c, a, NodeType::Full, Some(&plan)).unwrap_err();
        assert!(matches!(err, PatchError::StateSyncIncomplete(_)));
    }

    #[test]
    fn test_snapshot_adds_notice_only() {
        let plan = SyncPlan {
            mode: SyncMode::Snapshot,
            state_sync: None,
        };
        let with = patched(NodeType::Full, Some(&plan));
        let without = patched(NodeType::Full, None);
        assert_eq!(with.consensus, without.consensus);
        assert!(with.notices.iter().any(|n| n.contains("pre-synced")));
    }

    #[test]
    fn test_idempotent() {
        for node_type in NodeType::ALL {
            let once = patched(*node_type, None);
            let twice =
                ConfigPatcher::patch(once.consensus.clone(), once.app.clone(), *node_type, None)
                    .unwrap();
            assert_eq!(once.consensus.render(), twice.consensus.render());
            assert_eq!(once.app.render(), twice.app.render());
        }
    }

    #[test]
    fn test_every_table_path_exists_in_baseline() {
        let (c, a) = docs();
        for node_type in NodeType::ALL {
            for patch in node_type_patches(*node_type) {
                let doc = match patch.document {
                    DocumentKind::Consensus => &c,
                    DocumentKind::App => &a,
                };
                assert!(doc.contains(patch.path), "{} missing {}", doc.kind(), patch.path);
            }
        }
    }
}
