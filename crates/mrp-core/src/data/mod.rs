//! Typed survey observations and census strata.
//!
//! Raw rows arrive as strings (from CSV or JSON) and are mapped onto the
//! closed factor enums of `mrp_common::categories`. Mapping is total: every
//! value resolves to one level or the whole load fails. The only rows that
//! are dropped are respondents with an unknown ownership answer, and those
//! are counted in [`ObservationTable::skipped_unknown`].

mod check;
mod load;

pub use check::{InputCheck, ObservationCheck, StratumCheck};
pub use load::dataset_id;

use std::collections::{BTreeSet, HashSet};

use mrp_common::categories::{Cell, N_CELLS};
use mrp_common::{AgeGroup, Error, Province, Result, Sex};
use serde::{Deserialize, Serialize};

use crate::model::CategoryLevels;

/// One survey respondent with a known ownership answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub dwelling_owned: bool,
    pub sex: Sex,
    pub age_group: AgeGroup,
    pub province: Province,
}

impl Observation {
    pub fn new(dwelling_owned: bool, sex: Sex, age_group: AgeGroup, province: Province) -> Self {
        Observation {
            dwelling_owned,
            sex,
            age_group,
            province,
        }
    }

    pub fn cell(&self) -> Cell {
        Cell::new(self.sex, self.age_group, self.province)
    }
}

/// One census post-stratification cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stratum {
    pub province: Province,
    pub age_group: AgeGroup,
    pub sex: Sex,
    pub population_count: u64,
}

impl Stratum {
    pub fn new(province: Province, age_group: AgeGroup, sex: Sex, population_count: u64) -> Self {
        Stratum {
            province,
            age_group,
            sex,
            population_count,
        }
    }

    pub fn cell(&self) -> Cell {
        Cell::new(self.sex, self.age_group, self.province)
    }
}

/// Parse an ownership answer. `Ok(None)` means the respondent did not give
/// a usable answer.
pub fn parse_ownership(raw: &str) -> Result<Option<bool>> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "1.0" | "true" | "yes" | "y" | "own" | "owned" | "owner" => Ok(Some(true)),
        "0" | "0.0" | "false" | "no" | "n" | "rent" | "rented" | "renter" => Ok(Some(false)),
        "" | "na" | "n/a" | "nan" | "unknown" | "dk" | "don't know" | "dont know" | "refused"
        | "not stated" | "?" => Ok(None),
        other => Err(Error::invalid_level("dwelling_owned", other)),
    }
}

/// A survey row before category mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub dwelling_owned: String,
    pub sex: String,
    /// Numeric age in years. Takes precedence over `age_group` when present.
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub age_group: Option<String>,
    pub province: String,
}

impl RawObservation {
    /// Map onto typed factors. Returns `Ok(None)` for an unknown ownership answer.
    pub fn resolve(&self) -> Result<Option<Observation>> {
        let Some(owned) = parse_ownership(&self.dwelling_owned)? else {
            return Ok(None);
        };
        let sex: Sex = self.sex.parse()?;
        let province: Province = self.province.parse()?;
        let age_group = match (non_empty(&self.age), non_empty(&self.age_group)) {
            (Some(age), _) => {
                let years: f64 = age
                    .parse()
                    .map_err(|_| Error::invalid_level("age", age))?;
                AgeGroup::from_age(years)?
            }
            (None, Some(label)) => label.parse()?,
            (None, None) => {
                return Err(Error::InvalidInput(
                    "observation row has neither age nor age_group".to_string(),
                ))
            }
        };
        Ok(Some(Observation::new(owned, sex, age_group, province)))
    }
}

/// A census row before category mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStratum {
    pub province: String,
    pub age_group: String,
    pub sex: String,
    pub population_count: String,
}

impl RawStratum {
    pub fn resolve(&self) -> Result<Stratum> {
        let count = parse_count(&self.population_count)?;
        Ok(Stratum::new(
            self.province.parse()?,
            self.age_group.parse()?,
            self.sex.parse()?,
            count,
        ))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_count(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        return Ok(n);
    }
    match raw.parse::<f64>() {
        Ok(x) if x.is_finite() && x >= 0.0 && x.fract() == 0.0 && x <= u64::MAX as f64 => {
            Ok(x as u64)
        }
        _ => Err(Error::InvalidInput(format!(
            "population_count '{}' is not a non-negative integer",
            raw
        ))),
    }
}

/// Survey observations, read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationTable {
    rows: Vec<Observation>,
    skipped_unknown: usize,
}

impl ObservationTable {
    pub fn new(rows: Vec<Observation>) -> Self {
        ObservationTable {
            rows,
            skipped_unknown: 0,
        }
    }

    /// Resolve raw rows, skipping and counting unknown ownership answers.
    pub fn from_raw<I>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = RawObservation>,
    {
        let mut rows = Vec::new();
        let mut skipped_unknown = 0;
        for (i, row) in raw.into_iter().enumerate() {
            match row.resolve() {
                Ok(Some(obs)) => rows.push(obs),
                Ok(None) => skipped_unknown += 1,
                Err(e) => {
                    tracing::debug!(row = i + 1, error = %e, "rejected observation row");
                    return Err(e);
                }
            }
        }
        Ok(ObservationTable {
            rows,
            skipped_unknown,
        })
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows dropped because the ownership answer was unknown.
    pub fn skipped_unknown(&self) -> usize {
        self.skipped_unknown
    }

    pub fn owned_count(&self) -> usize {
        self.rows.iter().filter(|o| o.dwelling_owned).count()
    }

    /// Factor levels present in the table.
    pub fn levels(&self) -> CategoryLevels {
        CategoryLevels::from_observations(self)
    }
}

/// Census strata keyed by (province, age group, sex).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StratumTable {
    rows: Vec<Stratum>,
}

impl StratumTable {
    /// Build a table, rejecting duplicate keys.
    /// Rejects duplicate cells and tables whose population total does not
    /// fit in a `u64`, so [`StratumTable::total_population`] cannot overflow.
    pub fn new(rows: Vec<Stratum>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(rows.len());
        let mut total: u64 = 0;
        for row in &rows {
            if !seen.insert(row.cell()) {
                return Err(Error::InvalidInput(format!(
                    "duplicate stratum {}",
                    row.cell()
                )));
            }
            total = total.checked_add(row.population_count).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "population counts overflow at stratum {}",
                    row.cell()
                ))
            })?;
        }
        Ok(StratumTable { rows })
    }

    pub fn from_raw<I>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = RawStratum>,
    {
        let rows = raw
            .into_iter()
            .map(|r| r.resolve())
            .collect::<Result<Vec<_>>>()?;
        StratumTable::new(rows)
    }

    pub fn rows(&self) -> &[Stratum] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stratum> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_population(&self) -> u64 {
        self.rows.iter().map(|s| s.population_count).sum()
    }

    /// Cells with no row in the table, in cell index order.
    pub fn missing_cells(&self) -> Vec<Cell> {
        let present: BTreeSet<Cell> = self.rows.iter().map(Stratum::cell).collect();
        Cell::all().filter(|c| !present.contains(c)).collect()
    }

    /// True when all 100 province x age group x sex cells are present.
    pub fn is_complete(&self) -> bool {
        self.rows.len() == N_CELLS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(owned: &str, sex: &str, age: Option<&str>, group: Option<&str>, prov: &str) -> RawObservation {
        RawObservation {
            dwelling_owned: owned.to_string(),
            sex: sex.to_string(),
            age: age.map(String::from),
            age_group: group.map(String::from),
            province: prov.to_string(),
        }
    }

    #[test]
    fn ownership_answers() {
        assert_eq!(parse_ownership("1").unwrap(), Some(true));
        assert_eq!(parse_ownership(" No ").unwrap(), Some(false));
        assert_eq!(parse_ownership("").unwrap(), None);
        assert_eq!(parse_ownership("Don't know").unwrap(), None);
        assert!(matches!(
            parse_ownership("maybe"),
            Err(Error::InvalidFactorLevel { .. })
        ));
    }

    #[test]
    fn numeric_age_wins_over_label() {
        let obs = raw("yes", "F", Some("67"), Some("21-29"), "ON")
            .resolve()
            .unwrap()
            .unwrap();
        assert_eq!(obs.age_group, AgeGroup::Over65);
        assert_eq!(obs.province, Province::Ontario);
        assert_eq!(obs.sex, Sex::Female);
    }

    #[test]
    fn missing_age_is_invalid_input() {
        let err = raw("1", "M", None, Some("  "), "QC").resolve().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn territory_rejects_whole_table() {
        let rows = vec![
            raw("1", "M", Some("30"), None, "Alberta"),
            raw("0", "F", Some("45"), None, "Yukon"),
        ];
        let err = ObservationTable::from_raw(rows).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidFactorLevel { ref factor, .. } if factor == "province"
        ));
    }

    #[test]
    fn unknown_answers_are_counted() {
        let rows = vec![
            raw("1", "M", Some("30"), None, "Alberta"),
            raw("unknown", "F", Some("45"), None, "Quebec"),
            raw("", "F", Some("45"), None, "Quebec"),
        ];
        let table = ObservationTable::from_raw(rows).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.skipped_unknown(), 2);
        assert_eq!(table.owned_count(), 1);
    }

    #[test]
    fn duplicate_strata_rejected() {
        let s = Stratum::new(Province::Manitoba, AgeGroup::Age30To39, Sex::Male, 10);
        let err = StratumTable::new(vec![s, s]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn overflowing_population_total_rejected() {
        let half = u64::MAX / 2 + 1;
        let rows = vec![
            Stratum::new(Province::Alberta, AgeGroup::Under20, Sex::Female, half),
            Stratum::new(Province::Ontario, AgeGroup::Over65, Sex::Male, half),
        ];
        let err = StratumTable::new(rows).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("overflow")));

        let rows = vec![
            Stratum::new(Province::Alberta, AgeGroup::Under20, Sex::Female, half),
            Stratum::new(Province::Ontario, AgeGroup::Over65, Sex::Male, half - 1),
        ];
        let table = StratumTable::new(rows).unwrap();
        assert_eq!(table.total_population(), u64::MAX);
    }

    #[test]
    fn population_count_formats() {
        assert_eq!(parse_count("1200").unwrap(), 1200);
        assert_eq!(parse_count("1200.0").unwrap(), 1200);
        assert!(parse_count("-3").is_err());
        assert!(parse_count("12.5").is_err());
    }

    #[test]
    fn completeness() {
        let full: Vec<Stratum> = Cell::all()
            .map(|c| Stratum::new(c.province, c.age_group, c.sex, 1))
            .collect();
        let table = StratumTable::new(full).unwrap();
        assert!(table.is_complete());
        assert!(table.missing_cells().is_empty());
        assert_eq!(table.total_population(), N_CELLS as u64);

        let partial = StratumTable::new(table.rows()[1..].to_vec()).unwrap();
        assert!(!partial.is_complete());
        assert_eq!(partial.missing_cells().len(), 1);
    }
}
