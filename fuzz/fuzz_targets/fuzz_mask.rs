#![no_main]
//! Fuzz target for error_reporting expressions.
//!
//! The mask parser must either produce a value inside E_ALL or return an error.
//!
//! Run: cargo +nightly fuzz run fuzz_mask

use faultline::{parse_mask, ErrorLevel};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(mask) = parse_mask(input) {
            assert_eq!(mask & !ErrorLevel::ALL, 0);
        }
    }
});
