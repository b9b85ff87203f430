//! Fuzz target for replay corpus loading.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sodium_core::replay::ReplayCorpus;

fuzz_target!(|data: &[u8]| {
    // Should never panic, only return an error
    let _ = serde_json::from_slice::<ReplayCorpus>(data);
});
