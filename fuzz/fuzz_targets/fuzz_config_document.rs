//! Fuzz target for config.toml / app.toml parsing.
//!
//! Tests that `ConfigDocument::parse` and `render` handle arbitrary input
//! without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ns_config::{ConfigDocument, DocumentKind};

fuzz_target!(|data: &str| {
    for kind in [DocumentKind::Consensus, DocumentKind::App] {
        if let Ok(doc) = ConfigDocument::parse(kind, data) {
            let _ = doc.render();
        }
    }
});
