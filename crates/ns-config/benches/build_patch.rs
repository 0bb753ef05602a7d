//! Criterion benchmarks for template construction and patching.

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ns_common::{
    Architecture, EnvironmentCapabilities, NodeType, OptionSetBuilder, ServiceManager,
};
use ns_config::{
    ChainProfile, ConfigDocument, ConfigPatcher, ConfigTemplate, DocumentKind, GenesisInput,
};

fn bench_build_and_patch(c: &mut Criterion) {
    let profile = ChainProfile::builtin();
    let timestamp = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let mut group = c.benchmark_group("build_patch");

    for node_type in NodeType::ALL {
        let mut builder = OptionSetBuilder::new(EnvironmentCapabilities::with_supervisor());
        builder.architecture(Architecture::Amd64);
        builder.node_type(*node_type);
        builder.service_manager(ServiceManager::Systemd).unwrap();
        builder.home("/srv/noded").unwrap();
        let options = builder.build().unwrap();

        group.bench_with_input(
            BenchmarkId::new("build_patch_render", node_type.as_str()),
            &options,
            |b, options| {
                b.iter(|| {
                    let set = ConfigTemplate::build(
                        black_box(options),
                        &profile,
                        GenesisInput::none(timestamp),
                    )
                    .expect("template builds");
                    let out = ConfigPatcher::patch(set.consensus, set.app, *node_type, None)
                        .expect("patch applies");
                    black_box((out.consensus.render(), out.app.render()));
                });
            },
        );
    }

    group.finish();
}

fn bench_parse_consensus(c: &mut Criterion) {
    let text =
        ConfigTemplate::consensus("bench", "203.0.113.7:26656", &ChainProfile::builtin()).render();

    c.bench_function("build_patch/parse_config_toml", |b| {
        b.iter(|| {
            let doc = ConfigDocument::parse(DocumentKind::Consensus, black_box(&text))
                .expect("config.toml parses");
            black_box(doc);
        })
    });
}

criterion_group!(benches, bench_build_and_patch, bench_parse_consensus);
criterion_main!(benches);
