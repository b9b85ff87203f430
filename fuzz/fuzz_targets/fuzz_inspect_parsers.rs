//! Fuzz target for the adb structured accessor parsers.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sodium_core::adb::inspect;

fuzz_target!(|data: &str| {
    let _ = inspect::parse_screen_on(data);
    let _ = inspect::parse_rotation(data);
    let _ = inspect::parse_wm_size(data);
    let _ = inspect::parse_physical_size(data);
    let _ = inspect::parse_ipv4(data);
    let _ = inspect::parse_package_list(data);
    let _ = inspect::parse_package_path(data);
    let _ = inspect::parse_package_dump("com.example", data, None);
    let _ = inspect::parse_activity_top(data);
    let _ = inspect::parse_focused_window(data);
});
