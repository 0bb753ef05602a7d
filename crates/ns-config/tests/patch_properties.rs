//! Property-based tests for template and patch invariants.

use chrono::{TimeZone, Utc};
use ns_common::{
    Architecture, EnvironmentCapabilities, NodeType, OptionSet, OptionSetBuilder,
    ServiceManager, StateSyncParams, SyncMode,
};
use ns_config::{ChainProfile, ConfigPatcher, ConfigTemplate, GenesisInput, SyncPlan, TemplateSet};
use proptest::prelude::*;

fn arch_strategy() -> impl Strategy<Value = Architecture> {
    prop::sample::select(Architecture::ALL.to_vec())
}

fn node_type_strategy() -> impl Strategy<Value = NodeType> {
    prop::sample::select(NodeType::ALL.to_vec())
}

fn manager_strategy() -> impl Strategy<Value = ServiceManager> {
    prop::sample::select(ServiceManager::ALL.to_vec())
}

fn sync_strategy() -> impl Strategy<Value = (SyncMode, Option<StateSyncParams>)> {
    prop_oneof![
        Just((SyncMode::Genesis, None)),
        Just((SyncMode::Snapshot, None)),
        (1u64..10_000_000, "[0-9A-F]{64}", 1u64..1000).prop_map(|(height, hash, period)| {
            let mut params =
                StateSyncParams::from_rpc("https://rpc.example.com:443").with_trust(height, hash);
            params.trust_period_hours = period;
            (SyncMode::StateSync, Some(params))
        }),
    ]
}

fn options_strategy() -> impl Strategy<Value = OptionSet> {
    (
        arch_strategy(),
        "[a-z0-9-]{0,24}",
        prop_oneof![
            Just(String::new()),
            (1u16..=65535).prop_map(|p| format!("198.51.100.4:{}", p)),
        ],
        node_type_strategy(),
        sync_strategy(),
        manager_strategy(),
    )
        .prop_map(|(arch, moniker, addr, node_type, (mode, params), manager)| {
            let mut b = OptionSetBuilder::new(EnvironmentCapabilities::with_supervisor());
            b.architecture(arch);
            b.moniker(&moniker).expect("moniker");
            b.external_address(&addr).expect("address");
            b.node_type(node_type);
            b.sync_mode(mode, params).expect("sync mode");
            b.service_manager(manager).expect("manager");
            b.home("/srv/noded").expect("home");
            b.build().expect("options")
        })
}

fn template(options: &OptionSet) -> TemplateSet {
    let timestamp = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    ConfigTemplate::build(options, &ChainProfile::builtin(), GenesisInput::none(timestamp))
        .expect("template")
}

fn render_all(options: &OptionSet) -> (String, String, String) {
    let set = template(options);
    let plan = SyncPlan::from_options(options);
    let out = ConfigPatcher::patch(set.consensus, set.app, options.node_type(), Some(&plan))
        .expect("patch");
    (out.consensus.render(), out.app.render(), set.genesis.render())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Equal options always give byte-identical documents.
    #[test]
    fn build_and_patch_is_deterministic(options in options_strategy()) {
        prop_assert_eq!(render_all(&options), render_all(&options));
    }

    /// Patching never adds or removes keys.
    #[test]
    fn patch_preserves_key_set(options in options_strategy()) {
        let set = template(&options);
        let consensus_keys = set.consensus.keys();
        let app_keys = set.app.keys();
        let plan = SyncPlan::from_options(&options);
        let out = ConfigPatcher::patch(set.consensus, set.app, options.node_type(), Some(&plan))
            .expect("patch");
        prop_assert_eq!(out.consensus.keys(), consensus_keys);
        prop_assert_eq!(out.app.keys(), app_keys);
    }

    /// Applying the same patch twice equals applying it once.
    #[test]
    fn patch_is_idempotent(options in options_strategy()) {
        let set = template(&options);
        let plan = SyncPlan::from_options(&options);
        let once = ConfigPatcher::patch(set.consensus, set.app, options.node_type(), Some(&plan))
            .expect("first patch");
        let twice = ConfigPatcher::patch(
            once.consensus.clone(),
            once.app.clone(),
            options.node_type(),
            Some(&plan),
        )
        .expect("second patch");
        prop_assert_eq!(once.consensus.render(), twice.consensus.render());
        prop_assert_eq!(once.app.render(), twice.app.render());
    }

    /// Moniker and external address land in exactly their keys.
    #[test]
    fn options_interpolated(options in options_strategy()) {
        let (consensus, _, _) = render_all(&options);
        let moniker_line = format!("moniker = \"{}\"", options.moniker());
        let address_line = format!("external_address = \"{}\"", options.external_address());
        prop_assert!(consensus.contains(&moniker_line));
        prop_assert!(consensus.contains(&address_line));
    }
}
