//! Fuzz target for genesis acceptance.
//!
//! Tests that `GenesisDocument::from_source` rejects arbitrary input with an
//! error instead of panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ns_config::GenesisDocument;

fuzz_target!(|data: &str| {
    if let Ok(doc) = GenesisDocument::from_source(data, "fuzz", "nodechain_9000-1") {
        let _ = doc.render();
    }
});
