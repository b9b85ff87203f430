//! Fuzz target for the built-in property strategies.
//!
//! Every strategy of the standard table is fed the same arbitrary output.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sodium_core::PropertyTable;

fuzz_target!(|data: &str| {
    let table = PropertyTable::standard();
    for (_, pattern) in table.patterns() {
        let _ = pattern.extract(data);
    }
    for strategy in table.max_volume_level.strategies() {
        let _ = strategy.extract(data);
    }
    for strategy in table.current_ssid.strategies() {
        let _ = strategy.extract(data);
    }
});
