//! Fuzz target for config file parsing.
//!
//! The same text is parsed as TOML and as JSON, then validated.

#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use mrp_common::config::resolve::parse_config;

fuzz_target!(|data: &str| {
    for name in ["config.toml", "config.json"] {
        if let Ok(config) = parse_config(Path::new(name), data) {
            let _ = config.validate();
        }
    }
});
