//! Baseline configuration documents.
//!
//! The baseline key set is identical for every node type and sync mode; the
//! patcher only overwrites values. The operator's moniker and external
//! address are the only interpolated options, the rest come from the chain
//! profile.

use chrono::{DateTime, Utc};
use ns_common::OptionSet;
use std::time::Duration;

use crate::document::{ConfigDocument, ConfigValue, DocumentError, DocumentKind};
use crate::genesis::{GenesisDocument, GenesisError};
use crate::profile::ChainProfile;

/// Input to genesis construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisInput {
    /// Label and text of a supplied genesis, if any.
    pub source: Option<(String, String)>,
    /// Why no source is available, for the placeholder origin.
    pub unavailable_reason: Option<String>,
    /// `genesis_time` used if a placeholder is synthesized.
    pub timestamp: DateTime<Utc>,
}

impl GenesisInput {
    pub fn none(timestamp: DateTime<Utc>) -> Self {
        GenesisInput {
            source: None,
            unavailable_reason: None,
            timestamp,
        }
    }

    pub fn supplied(
        label: impl Into<String>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        GenesisInput {
            source: Some((label.into(), text.into())),
            unavailable_reason: None,
            timestamp,
        }
    }

    pub fn unavailable(reason: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        GenesisInput {
            source: None,
            unavailable_reason: Some(reason.into()),
            timestamp,
        }
    }
}

/// Output of [`ConfigTemplate::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateSet {
    pub consensus: ConfigDocument,
    pub app: ConfigDocument,
    pub genesis: GenesisDocument,
    /// Set when a supplied genesis was unusable and the placeholder was used.
    pub genesis_warning: Option<String>,
}

/// Baseline document builder.
pub struct ConfigTemplate;

impl ConfigTemplate {
    /// Build all three documents. Pure: equal inputs give equal output.
    ///
    /// A supplied genesis that is unreadable degrades to the placeholder with a
    /// warning; one for a different chain is rejected.
    pub fn build(
        options: &OptionSet,
        profile: &ChainProfile,
        genesis: GenesisInput,
    ) -> Result<TemplateSet, GenesisError> {
        let (genesis, genesis_warning) = Self::genesis(profile, genesis)?;
        Ok(TemplateSet {
            consensus: Self::consensus(options.moniker(), options.external_address(), profile),
            app: Self::app(profile),
            genesis,
            genesis_warning,
        })
    }

    fn genesis(
        profile: &ChainProfile,
        input: GenesisInput,
    ) -> Result<(GenesisDocument, Option<String>), GenesisError> {
        let reason = match input.source {
            Some((label, text)) => {
                match GenesisDocument::from_source(&text, &label, &profile.chain_id) {
                    Ok(doc) => return Ok((doc, None)),
                    Err(err @ GenesisError::ChainIdMismatch { .. }) => return Err(err),
                    Err(err) => {
                        let reason = format!("genesis from {} unusable: {}", label, err);
                        let placeholder = GenesisDocument::placeholder(
                            &profile.chain_id,
                            input.timestamp,
                            reason.clone(),
                        );
                        return Ok((placeholder, Some(reason)));
                    }
                }
            }
            None => input
                .unavailable_reason
                .unwrap_or_else(|| "no genesis source configured".to_string()),
        };
        Ok((
            GenesisDocument::placeholder(&profile.chain_id, input.timestamp, reason),
            None,
        ))
    }

    /// Baseline `config.toml`.
    pub fn consensus(
        moniker: &str,
        external_address: &str,
        profile: &ChainProfile,
    ) -> ConfigDocument {
        let secs = Duration::from_secs;
        let millis = Duration::from_millis;
        let entries: Vec<(&str, ConfigValue)> = vec![
            ("proxy_app", "tcp://127.0.0.1:26658".into()),
            ("moniker", moniker.into()),
            ("db_backend", "goleveldb".into()),
            ("db_dir", "data".into()),
            ("log_level", "info".into()),
            ("log_format", "plain".into()),
            ("genesis_file", "config/genesis.json".into()),
            ("priv_validator_key_file", "config/priv_validator_key.json".into()),
            ("priv_validator_state_file", "data/priv_validator_state.json".into()),
            ("priv_validator_laddr", "".into()),
            ("node_key_file", "config/node_key.json".into()),
            ("abci", "socket".into()),
            ("filter_peers", false.into()),
            ("rpc.laddr", "tcp://127.0.0.1:26657".into()),
            ("rpc.cors_allowed_origins", ConfigValue::List(Vec::new())),
            ("rpc.cors_allowed_methods", ConfigValue::strings(["HEAD", "GET", "POST"])),
            (
                "rpc.cors_allowed_headers",
                ConfigValue::strings([
                    "Origin",
                    "Accept",
                    "Content-Type",
                    "X-Requested-With",
                    "X-Server-Time",
                ]),
            ),
            ("rpc.grpc_laddr", "".into()),
            ("rpc.grpc_max_open_connections", 900.into()),
            ("rpc.unsafe", false.into()),
            ("rpc.max_open_connections", 900.into()),
            ("rpc.max_subscription_clients", 100.into()),
            ("rpc.max_subscriptions_per_client", 5.into()),
            ("rpc.timeout_broadcast_tx_commit", secs(10).into()),
            ("rpc.max_body_bytes", 1_000_000.into()),
            ("rpc.max_header_bytes", 1_048_576.into()),
            ("rpc.tls_cert_file", "".into()),
            ("rpc.tls_key_file", "".into()),
            ("rpc.pprof_laddr", "localhost:6060".into()),
            ("p2p.laddr", "tcp://0.0.0.0:26656".into()),
            ("p2p.external_address", external_address.into()),
            ("p2p.seeds", "".into()),
            ("p2p.persistent_peers", profile.persistent_peers_joined().into()),
            ("p2p.upnp", false.into()),
            ("p2p.addr_book_file", "config/addrbook.json".into()),
            ("p2p.addr_book_strict", true.into()),
            ("p2p.max_num_inbound_peers", 40.into()),
            ("p2p.max_num_outbound_peers", 10.into()),
            ("p2p.unconditional_peer_ids", "".into()),
            ("p2p.persistent_peers_max_dial_period", secs(0).into()),
            ("p2p.flush_throttle_timeout", millis(100).into()),
            ("p2p.max_packet_msg_payload_size", 1024.into()),
            ("p2p.send_rate", 5_120_000.into()),
            ("p2p.recv_rate", 5_120_000.into()),
            ("p2p.pex", true.into()),
            ("p2p.seed_mode", false.into()),
            ("p2p.private_peer_ids", "".into()),
            ("p2p.allow_duplicate_ip", false.into()),
            ("p2p.handshake_timeout", secs(20).into()),
            ("p2p.dial_timeout", secs(3).into()),
            ("mempool.version", "v0".into()),
            ("mempool.recheck", true.into()),
            ("mempool.broadcast", true.into()),
            ("mempool.wal_dir", "".into()),
            ("mempool.size", 5000.into()),
            ("mempool.max_txs_bytes", 1_073_741_824.into()),
            ("mempool.cache_size", 10_000.into()),
            ("mempool.keep-invalid-txs-in-cache", false.into()),
            ("mempool.max_tx_bytes", 1_048_576.into()),
            ("mempool.max_batch_bytes", 0.into()),
            ("statesync.enable", false.into()),
            ("statesync.rpc_servers", "".into()),
            ("statesync.trust_height", 0.into()),
            ("statesync.trust_hash", "".into()),
            ("statesync.trust_period", secs(168 * 3600).into()),
            ("statesync.discovery_time", secs(15).into()),
            ("statesync.temp_dir", "".into()),
            ("statesync.chunk_request_timeout", secs(10).into()),
            ("statesync.chunk_fetchers", "4".into()),
            ("consensus.wal_file", "data/cs.wal/wal".into()),
            ("consensus.timeout_propose", secs(3).into()),
            ("consensus.timeout_propose_delta", millis(500).into()),
            ("consensus.timeout_prevote", secs(1).into()),
            ("consensus.timeout_prevote_delta", millis(500).into()),
            ("consensus.timeout_precommit", secs(1).into()),
            ("consensus.timeout_precommit_delta", millis(500).into()),
            ("consensus.timeout_commit", secs(5).into()),
            ("consensus.double_sign_check_height", 0.into()),
            ("consensus.skip_timeout_commit", false.into()),
            ("consensus.create_empty_blocks", true.into()),
            ("consensus.create_empty_blocks_interval", secs(0).into()),
            ("consensus.peer_gossip_sleep_duration", millis(100).into()),
            ("consensus.peer_query_maj23_sleep_duration", secs(2).into()),
            ("storage.discard_abci_responses", false.into()),
            ("tx_index.indexer", "kv".into()),
            ("tx_index.psql-conn", "".into()),
            ("instrumentation.prometheus", false.into()),
            ("instrumentation.prometheus_listen_addr", ":26660".into()),
            ("instrumentation.max_open_connections", 3.into()),
            ("instrumentation.namespace", "cometbft".into()),
        ];
        assemble(DocumentKind::Consensus, entries)
    }

    /// Baseline `app.toml`.
    pub fn app(profile: &ChainProfile) -> ConfigDocument {
        let secs = Duration::from_secs;
        let entries: Vec<(&str, ConfigValue)> = vec![
            ("minimum-gas-prices", profile.minimum_gas_prices.as_str().into()),
            ("pruning", "default".into()),
            ("pruning-keep-recent", "0".into()),
            ("pruning-interval", "0".into()),
            ("halt-height", 0.into()),
            ("halt-time", 0.into()),
            ("min-retain-blocks", 0.into()),
            ("inter-block-cache", true.into()),
            ("index-events", ConfigValue::List(Vec::new())),
            ("iavl-cache-size", 781_250.into()),
            ("iavl-disable-fastnode", false.into()),
            ("app-db-backend", "".into()),
            ("telemetry.service-name", "".into()),
            ("telemetry.enabled", false.into()),
            ("telemetry.enable-hostname", false.into()),
            ("telemetry.enable-hostname-label", false.into()),
            ("telemetry.enable-service-label", false.into()),
            ("telemetry.prometheus-retention-time", 0.into()),
            ("telemetry.global-labels", ConfigValue::List(Vec::new())),
            ("api.enable", false.into()),
            ("api.swagger", false.into()),
            ("api.address", "tcp://0.0.0.0:1317".into()),
            ("api.max-open-connections", 1000.into()),
            ("api.rpc-read-timeout", 10.into()),
            ("api.rpc-write-timeout", 0.into()),
            ("api.rpc-max-body-bytes", 1_000_000.into()),
            ("api.enabled-unsafe-cors", false.into()),
            ("rosetta.enable", false.into()),
            ("rosetta.address", ":8080".into()),
            ("rosetta.blockchain", "app".into()),
            ("rosetta.network", "network".into()),
            ("rosetta.retries", 3.into()),
            ("rosetta.offline", false.into()),
            ("grpc.enable", true.into()),
            ("grpc.address", "0.0.0.0:9090".into()),
            ("grpc-web.enable", true.into()),
            ("grpc-web.address", "0.0.0.0:9091".into()),
            ("grpc-web.enable-unsafe-cors", false.into()),
            ("state-sync.snapshot-interval", 1000.into()),
            ("state-sync.snapshot-keep-recent", 2.into()),
            ("store.streamers", ConfigValue::List(Vec::new())),
            ("mempool.max-txs", 5000.into()),
            ("evm.tracer", "".into()),
            ("evm.max-tx-gas-wanted", 0.into()),
            ("json-rpc.enable", true.into()),
            ("json-rpc.address", "127.0.0.1:8545".into()),
            ("json-rpc.ws-address", "127.0.0.1:8546".into()),
            ("json-rpc.api", "eth,net,web3".into()),
            ("json-rpc.gas-cap", 25_000_000.into()),
            ("json-rpc.evm-timeout", secs(5).into()),
            ("json-rpc.txfee-cap", 1.0.into()),
            ("json-rpc.filter-cap", 200.into()),
            ("json-rpc.feehistory-cap", 100.into()),
            ("json-rpc.logs-cap", 10_000.into()),
            ("json-rpc.block-range-cap", 10_000.into()),
            ("json-rpc.http-timeout", secs(30).into()),
            ("json-rpc.http-idle-timeout", secs(120).into()),
            ("json-rpc.allow-unprotected-txs", false.into()),
            ("json-rpc.max-open-connections", 0.into()),
            ("json-rpc.enable-indexer", false.into()),
            ("tls.certificate-path", "".into()),
            ("tls.key-path", "".into()),
        ];
        assemble(DocumentKind::App, entries)
    }
}

fn assemble(kind: DocumentKind, entries: Vec<(&str, ConfigValue)>) -> ConfigDocument {
    let mut doc = ConfigDocument::new(kind);
    for (path, value) in entries {
        // Static paths are unique and well-formed.
        let inserted: Result<(), DocumentError> = doc.insert(path, value);
        debug_assert!(inserted.is_ok(), "baseline key {} rejected", path);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ns_common::{
        Architecture, EnvironmentCapabilities, NodeType, OptionSetBuilder, ServiceManager,
    };

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap()
    }

    fn options(node_type: NodeType) -> OptionSet {
        let mut b = OptionSetBuilder::new(EnvironmentCapabilities::with_supervisor());
        b.architecture(Architecture::Amd64);
        b.moniker("alpha").unwrap();
        b.external_address("203.0.113.7:26656").unwrap();
        b.node_type(node_type);
        b.service_manager(ServiceManager::Systemd).unwrap();
        b.home("/srv/noded").unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_interpolation() {
        let set = ConfigTemplate::build(
            &options(NodeType::Full),
            &ChainProfile::builtin(),
            GenesisInput::none(ts()),
        )
        .unwrap();
        assert_eq!(set.consensus.get("moniker"), Some(&ConfigValue::from("alpha")));
        assert_eq!(
            set.consensus.get("p2p.external_address"),
            Some(&ConfigValue::from("203.0.113.7:26656"))
        );
        assert_eq!(
            set.consensus.get("p2p.persistent_peers").and_then(ConfigValue::as_str),
            Some(ChainProfile::builtin().persistent_peers_joined().as_str())
        );
        assert_eq!(
            set.app.get("minimum-gas-prices").and_then(ConfigValue::as_str),
            Some("0.0025anode")
        );
    }

    #[test]
    fn test_baseline_values() {
        let profile = ChainProfile::builtin();
        let consensus = ConfigTemplate::consensus("m", "", &profile);
        let app = ConfigTemplate::app(&profile);
        let int =
            |doc: &ConfigDocument, path: &str| doc.get(path).and_then(ConfigValue::as_integer);
        assert_eq!(
            consensus.get("rpc.laddr").and_then(ConfigValue::as_str),
            Some("tcp://127.0.0.1:26657")
        );
        assert_eq!(int(&consensus, "p2p.max_num_inbound_peers"), Some(40));
        assert_eq!(int(&consensus, "p2p.max_num_outbound_peers"), Some(10));
        assert_eq!(
            consensus.get("statesync.enable").and_then(ConfigValue::as_bool),
            Some(false)
        );
        assert_eq!(
            consensus.get("tx_index.indexer").and_then(ConfigValue::as_str),
            Some("kv")
        );
        assert_eq!(app.get("pruning").and_then(ConfigValue::as_str), Some("default"));
        assert_eq!(app.get("api.enable").and_then(ConfigValue::as_bool), Some(false));
        assert_eq!(int(&app, "state-sync.snapshot-interval"), Some(1000));
        assert!(!app.contains("chain-id"));
    }

    #[test]
    fn test_key_set_independent_of_options() {
        let profile = ChainProfile::builtin();
        let build = |node_type| {
            ConfigTemplate::build(&options(node_type), &profile, GenesisInput::none(ts())).unwrap()
        };
        let a = build(NodeType::Full);
        let b = build(NodeType::Validator);
        assert_eq!(a.consensus.keys(), b.consensus.keys());
        assert_eq!(a.app.keys(), b.app.keys());
    }

    #[test]
    fn test_unusable_genesis_degrades() {
        let set = ConfigTemplate::build(
            &options(NodeType::Full),
            &ChainProfile::builtin(),
            GenesisInput::supplied("https://example.com/genesis", "not json", ts()),
        )
        .unwrap();
        assert!(set.genesis.is_placeholder());
        assert!(set.genesis_warning.is_some());
        assert_eq!(set.genesis.chain_id(), Some("nodechain_9000-1"));
    }

    #[test]
    fn test_foreign_genesis_rejected() {
        let text = r#"{"chain_id":"other-1","genesis_time":"2024-01-01T00:00:00Z"}"#;
        let err = ConfigTemplate::build(
            &options(NodeType::Full),
            &ChainProfile::builtin(),
            GenesisInput::supplied("file", text, ts()),
        )
        .unwrap_err();
        assert!(matches!(err, GenesisError::ChainIdMismatch { .. }));
    }

    #[test]
    fn test_unavailable_reason_recorded() {
        let set = ConfigTemplate::build(
            &options(NodeType::Full),
            &ChainProfile::builtin(),
            GenesisInput::unavailable("connection refused", ts()),
        )
        .unwrap();
        assert_eq!(
            set.genesis.origin(),
            &crate::GenesisOrigin::Placeholder {
                reason: "connection refused".into()
            }
        );
        assert!(set.genesis_warning.is_none());
    }
}
