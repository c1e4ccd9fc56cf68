//! Fuzz target for factor label and ownership parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mrp_common::{AgeGroup, Province, Sex};
use mrp_core::data::parse_ownership;

fuzz_target!(|data: &str| {
    let _ = data.parse::<Sex>();
    let _ = data.parse::<AgeGroup>();
    let _ = data.parse::<Province>();
    let _ = parse_ownership(data);
    if let Ok(age) = data.trim().parse::<f64>() {
        let _ = AgeGroup::from_age(age);
    }
});
