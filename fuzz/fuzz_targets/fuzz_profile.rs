//! Fuzz target for chain profile parsing and validation.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ns_config::ChainProfile;

fuzz_target!(|data: &str| {
    let _ = ChainProfile::from_toml_str(data);
});
