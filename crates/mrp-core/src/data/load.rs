//! CSV and JSON readers for observation and stratum tables.
//!
//! CSV files need a header row; columns are matched by name, so their
//! order does not matter and extra columns are ignored. JSON files hold an
//! array of row objects whose values may be strings, numbers or booleans.

use std::fs;
use std::io::Read;
use std::path::Path;

use mrp_common::{Error, Result};
use sha2::{Digest, Sha256};

use super::{ObservationTable, RawObservation, RawStratum, StratumTable};

const OBSERVATION_COLUMNS: [&str; 5] = ["dwelling_owned", "sex", "age", "age_group", "province"];
const STRATUM_COLUMNS: [&str; 4] = ["province", "age_group", "sex", "population_count"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableFormat {
    Csv,
    Json,
}

impl TableFormat {
    fn from_path(path: &Path) -> Self {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            TableFormat::Json
        } else {
            TableFormat::Csv
        }
    }
}

/// Rows as column-name -> value maps, in file order.
type Records = Vec<Vec<(String, String)>>;

fn read_csv_records<R: Read>(reader: R, wanted: &[&str]) -> Result<Records> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(false)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| Error::InvalidInput(format!("failed to read CSV header: {}", e)))?
        .clone();
    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (i, h.trim().to_lowercase()))
        .filter(|(_, h)| wanted.contains(&h.as_str()))
        .collect();

    let mut records = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            Error::InvalidInput(format!("CSV row {} could not be read: {}", line + 2, e))
        })?;
        let row = columns
            .iter()
            .map(|(i, name)| (name.clone(), record.get(*i).unwrap_or_default().to_string()))
            .collect();
        records.push(row);
    }
    Ok(records)
}

fn read_json_records(content: &str, wanted: &[&str]) -> Result<Records> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let rows = value
        .as_array()
        .ok_or_else(|| Error::InvalidInput("JSON table must be an array of rows".to_string()))?;

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let object = row.as_object().ok_or_else(|| {
            Error::InvalidInput(format!("JSON row {} is not an object", i + 1))
        })?;
        let mut fields = Vec::new();
        for (key, value) in object {
            let key = key.to_lowercase();
            if !wanted.contains(&key.as_str()) {
                continue;
            }
            let text = match value {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                other => {
                    return Err(Error::InvalidInput(format!(
                        "JSON row {} field '{}' has unsupported value {}",
                        i + 1,
                        key,
                        other
                    )))
                }
            };
            fields.push((key, text));
        }
        records.push(fields);
    }
    Ok(records)
}

fn field(row: &[(String, String)], name: &str) -> Option<String> {
    row.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
}

fn required(row: &[(String, String)], name: &str, index: usize) -> Result<String> {
    field(row, name).ok_or_else(|| {
        Error::InvalidInput(format!("row {} is missing column '{}'", index + 1, name))
    })
}

fn to_raw_observations(records: Records) -> Result<Vec<RawObservation>> {
    records
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Ok(RawObservation {
                dwelling_owned: required(row, "dwelling_owned", i)?,
                sex: required(row, "sex", i)?,
                age: field(row, "age"),
                age_group: field(row, "age_group"),
                province: required(row, "province", i)?,
            })
        })
        .collect()
}

fn to_raw_strata(records: Records) -> Result<Vec<RawStratum>> {
    records
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Ok(RawStratum {
                province: required(row, "province", i)?,
                age_group: required(row, "age_group", i)?,
                sex: required(row, "sex", i)?,
                population_count: required(row, "population_count", i)?,
            })
        })
        .collect()
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

impl ObservationTable {
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let records = read_csv_records(reader, &OBSERVATION_COLUMNS)?;
        ObservationTable::from_raw(to_raw_observations(records)?)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let content = read_file(path)?;
        ObservationTable::from_csv_reader(content.as_bytes())
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let records = read_json_records(content, &OBSERVATION_COLUMNS)?;
        ObservationTable::from_raw(to_raw_observations(records)?)
    }

    pub fn from_json_path(path: &Path) -> Result<Self> {
        ObservationTable::from_json_str(&read_file(path)?)
    }

    /// Load by extension: `.json` is JSON, anything else CSV.
    pub fn from_path(path: &Path) -> Result<Self> {
        match TableFormat::from_path(path) {
            TableFormat::Json => ObservationTable::from_json_path(path),
            TableFormat::Csv => ObservationTable::from_csv_path(path),
        }
    }
}

impl StratumTable {
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let records = read_csv_records(reader, &STRATUM_COLUMNS)?;
        StratumTable::from_raw(to_raw_strata(records)?)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let content = read_file(path)?;
        StratumTable::from_csv_reader(content.as_bytes())
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let records = read_json_records(content, &STRATUM_COLUMNS)?;
        StratumTable::from_raw(to_raw_strata(records)?)
    }

    pub fn from_json_path(path: &Path) -> Result<Self> {
        StratumTable::from_json_str(&read_file(path)?)
    }

    /// Load by extension: `.json` is JSON, anything else CSV.
    pub fn from_path(path: &Path) -> Result<Self> {
        match TableFormat::from_path(path) {
            TableFormat::Json => StratumTable::from_json_path(path),
            TableFormat::Csv => StratumTable::from_csv_path(path),
        }
    }
}

/// Short content hash identifying the input files of a run.
pub fn dataset_id(paths: &[&Path]) -> Result<String> {
    let mut hasher = Sha256::new();
    for path in paths {
        let bytes = fs::read(path)?;
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    let digest = hex::encode(hasher.finalize());
    Ok(format!("ds-{}", &digest[..12]))
}
