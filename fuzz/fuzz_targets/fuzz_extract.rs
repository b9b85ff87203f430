//! Fuzz target for narrowing plus pattern extraction.
//!
//! Arbitrary patterns, needles and text must never panic; bad patterns
//! simply never match.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sodium_core::extract::{ExtractionPattern, Narrowing};

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    pattern: &'a str,
    group: u8,
    needle: &'a str,
    after: u8,
    text: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let pattern = ExtractionPattern::with_group(input.pattern, usize::from(input.group % 4));
    let narrowed = Narrowing::lines_containing(input.needle)
        .with_after(usize::from(input.after))
        .apply(input.text);
    if let Some(value) = pattern.extract(&narrowed) {
        assert!(narrowed.contains(value));
    }
});
