//! Answers-file and option-selection tests against real TOML input.

use ns_common::options::DEFAULT_MONIKER;
use ns_common::{
    EnvironmentCapabilities, Error, NodeType, OptionAnswers, OptionSetBuilder, SelectionError,
    ServiceManager, SyncMode,
};

const FULL_ANSWERS: &str = r#"
architecture = "arm64"
moniker = "  edge-01  "
external_address = "203.0.113.9:26656"
node_type = "validator"
sync_mode = "state-sync"
service_manager = "cosmovisor"
home = "/srv/noded"

[state_sync]
rpc_servers = ["https://rpc-a.example.com", "https://rpc-b.example.com"]
trust_height = 1200
trust_hash = "0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f"

[validator]
key_name = "operator"
bootstrap_genesis = true
"#;

fn builder(supervisor: bool) -> OptionSetBuilder {
    let env = if supervisor {
        EnvironmentCapabilities::with_supervisor()
    } else {
        EnvironmentCapabilities::without_supervisor()
    };
    OptionSetBuilder::new(env)
}

#[test]
fn test_full_answers_file() {
    let answers: OptionAnswers = toml::from_str(FULL_ANSWERS).expect("parse answers");
    let mut b = builder(true);
    b.apply_answers(answers).expect("apply");
    let options = b.build().expect("build");

    assert_eq!(options.moniker(), "edge-01");
    assert_eq!(options.node_type(), NodeType::Validator);
    assert_eq!(options.sync_mode(), SyncMode::StateSync);
    assert_eq!(options.service_manager(), ServiceManager::Cosmovisor);
    let ss = options.state_sync().expect("state sync params");
    assert_eq!(ss.rpc_servers.len(), 2);
    assert_eq!(ss.trust_period_hours, 168);
    assert!(ss.trust_hash.as_deref().is_some_and(|h| h.starts_with("0F0F")));
    let validator = options.validator().expect("validator setup");
    assert!(validator.bootstrap_genesis);
    assert_eq!(validator.account_amount, 100_000_000_000);
}

#[test]
fn test_answers_supervisor_guard() {
    let answers: OptionAnswers = toml::from_str(FULL_ANSWERS).expect("parse answers");
    let mut b = builder(false);
    let err = b.apply_answers(answers).expect_err("guard must reject");
    assert_eq!(
        err,
        SelectionError::SupervisorRequired {
            manager: ServiceManager::Cosmovisor
        }
    );
    assert_eq!(Error::from(err).code(), 12);
}

#[test]
fn test_minimal_answers_use_defaults() {
    let answers: OptionAnswers = toml::from_str(
        "node_type = \"full\"\nservice_manager = \"tmux\"\nhome = \"/srv/noded\"\narchitecture = \"amd64\"\n",
    )
    .expect("parse answers");
    let mut b = builder(false);
    b.apply_answers(answers).expect("apply");
    let options = b.build().expect("build");
    assert_eq!(options.moniker(), DEFAULT_MONIKER);
    assert_eq!(options.sync_mode(), SyncMode::Genesis);
    assert!(options.warnings().iter().any(|w| w.contains("tmux")));
}

#[test]
fn test_unknown_answer_field_rejected() {
    let result: Result<OptionAnswers, _> = toml::from_str("nodetype = \"full\"\n");
    assert!(result.is_err());
}

#[test]
fn test_bad_enum_value_rejected() {
    let result: Result<OptionAnswers, _> = toml::from_str("node_type = \"light\"\n");
    assert!(result.is_err());
}

#[test]
fn test_option_set_serializes() {
    let answers: OptionAnswers = toml::from_str(FULL_ANSWERS).expect("parse answers");
    let mut b = builder(true);
    b.apply_answers(answers).expect("apply");
    let json = serde_json::to_value(b.build().expect("build")).expect("serialize");
    assert_eq!(json["node_type"], "validator");
    assert_eq!(json["sync_mode"], "state-sync");
    assert_eq!(json["environment"]["has_service_supervisor"], true);
}
