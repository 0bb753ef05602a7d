//! Fuzz target for answers file parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ns_core::commands::parse_answers;

fuzz_target!(|data: &str| {
    // Malformed answers are an Error::Answers, never a panic
    let _ = parse_answers(data);
});
