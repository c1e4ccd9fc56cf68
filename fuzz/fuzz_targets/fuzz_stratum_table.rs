//! Fuzz target for census strata loading.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mrp_core::data::StratumTable;

fuzz_target!(|data: &[u8]| {
    if let Ok(table) = StratumTable::from_csv_reader(data) {
        // A loaded table never holds a duplicate key.
        assert!(table.len() <= mrp_common::categories::N_CELLS);
    }
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = StratumTable::from_json_str(text);
    }
});
