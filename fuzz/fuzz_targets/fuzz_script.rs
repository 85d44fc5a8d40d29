#![no_main]
//! Fuzz target for fault scripts.
//!
//! Parses arbitrary input and runs whatever parses with a registrar installed.
//! Scripts containing `panic` statements are only parsed: libfuzzer's panic
//! hook aborts the process before the runtime can settle the panic.
//!
//! Run: cargo +nightly fuzz run fuzz_script

use faultline::{parse_script, run_with_registrar, ErrorLevel, IniSystem};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(script) = parse_script(input) {
            if script.has_panic() {
                return;
            }
            let mut ini = IniSystem::new();
            ini.define("display_errors", "0");
            let _ = run_with_registrar(&script, ErrorLevel::ALL, ini);
        }
    }
});
