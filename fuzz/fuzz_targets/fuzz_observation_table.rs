//! Fuzz target for survey table loading.
//!
//! Arbitrary bytes go through both the CSV and the JSON reader.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mrp_core::data::ObservationTable;

fuzz_target!(|data: &[u8]| {
    let _ = ObservationTable::from_csv_reader(data);
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = ObservationTable::from_json_str(text);
    }
});
