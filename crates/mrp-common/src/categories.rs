//! Categorical factors of the dwelling-tenure model.
//!
//! Every factor is a closed enum. Raw labels are mapped with a total
//! function: a value either resolves to exactly one level or fails with
//! [`Error::InvalidFactorLevel`]. Nothing is coerced to a default level.
//!
//! Level order is fixed and is the order of the model's coefficients.
//! Reference levels are [`Sex::Female`] and [`Province::Alberta`]; age
//! groups are partially pooled and have no reference level.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Schema version for the category taxonomy.
pub const CATEGORIES_SCHEMA_VERSION: &str = "1.0.0";

/// Number of sex x age group x province cells.
pub const N_CELLS: usize = Sex::COUNT * AgeGroup::COUNT * Province::COUNT;

fn normalize(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace(['_', '.'], " ")
        .replace('é', "e")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Respondent sex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Sex {
    /// Reference level.
    Female,
    Male,
}

impl Sex {
    pub const COUNT: usize = 2;
    pub const REFERENCE: Sex = Sex::Female;

    pub fn all() -> &'static [Sex] {
        &[Sex::Female, Sex::Male]
    }

    pub fn index(&self) -> usize {
        match self {
            Sex::Female => 0,
            Sex::Male => 1,
        }
    }

    pub fn from_index(idx: usize) -> Option<Sex> {
        Self::all().get(idx).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sex::Female => "Female",
            Sex::Male => "Male",
        }
    }

    /// Value of the male indicator covariate.
    pub fn male_indicator(&self) -> f64 {
        match self {
            Sex::Female => 0.0,
            Sex::Male => 1.0,
        }
    }
}

impl FromStr for Sex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "female" | "f" | "woman" | "women" => Ok(Sex::Female),
            "male" | "m" | "man" | "men" => Ok(Sex::Male),
            _ => Err(Error::invalid_level("sex", s)),
        }
    }
}

/// Age group of a respondent or stratum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AgeGroup {
    Under20,
    Age21To29,
    Age30To39,
    Age40To65,
    Over65,
}

impl AgeGroup {
    pub const COUNT: usize = 5;

    pub fn all() -> &'static [AgeGroup] {
        &[
            AgeGroup::Under20,
            AgeGroup::Age21To29,
            AgeGroup::Age30To39,
            AgeGroup::Age40To65,
            AgeGroup::Over65,
        ]
    }

    pub fn index(&self) -> usize {
        match self {
            AgeGroup::Under20 => 0,
            AgeGroup::Age21To29 => 1,
            AgeGroup::Age30To39 => 2,
            AgeGroup::Age40To65 => 3,
            AgeGroup::Over65 => 4,
        }
    }

    pub fn from_index(idx: usize) -> Option<AgeGroup> {
        Self::all().get(idx).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgeGroup::Under20 => "Under 20",
            AgeGroup::Age21To29 => "21-29",
            AgeGroup::Age30To39 => "30-39",
            AgeGroup::Age40To65 => "40-65",
            AgeGroup::Over65 => "Over 65",
        }
    }

    /// Bin a numeric age (in years).
    ///
    /// Bins are half-open except the closed upper edge of 40-65:
    /// `[0, 20)`, `[20, 29)`, `[29, 39)`, `[39, 65]`, `(65, inf)`.
    /// The labels "21-29" and "30-39" are kept even though their lower
    /// edges are 20 and 29.
    pub fn from_age(age: f64) -> Result<AgeGroup> {
        if !age.is_finite() || age < 0.0 {
            return Err(Error::invalid_level("age", age.to_string()));
        }
        Ok(if age < 20.0 {
            AgeGroup::Under20
        } else if age < 29.0 {
            AgeGroup::Age21To29
        } else if age < 39.0 {
            AgeGroup::Age30To39
        } else if age <= 65.0 {
            AgeGroup::Age40To65
        } else {
            AgeGroup::Over65
        })
    }
}

impl FromStr for AgeGroup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize(s).as_str() {
            "under 20" | "under20" | "<20" => Ok(AgeGroup::Under20),
            "21-29" | "20-29" => Ok(AgeGroup::Age21To29),
            "30-39" => Ok(AgeGroup::Age30To39),
            "40-65" | "40-64" => Ok(AgeGroup::Age40To65),
            "over 65" | "over65" | ">65" => Ok(AgeGroup::Over65),
            _ => Err(Error::invalid_level("age_group", s)),
        }
    }
}

/// Canadian province. Territories are outside the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Province {
    /// Reference level.
    Alberta,
    BritishColumbia,
    Manitoba,
    NewBrunswick,
    NewfoundlandAndLabrador,
    NovaScotia,
    Ontario,
    PrinceEdwardIsland,
    Quebec,
    Saskatchewan,
}

impl Province {
    pub const COUNT: usize = 10;
    pub const REFERENCE: Province = Province::Alberta;

    pub fn all() -> &'static [Province] {
        &[
            Province::Alberta,
            Province::BritishColumbia,
            Province::Manitoba,
            Province::NewBrunswick,
            Province::NewfoundlandAndLabrador,
            Province::NovaScotia,
            Province::Ontario,
            Province::PrinceEdwardIsland,
            Province::Quebec,
            Province::Saskatchewan,
        ]
    }

    pub fn index(&self) -> usize {
        match self {
            Province::Alberta => 0,
            Province::BritishColumbia => 1,
            Province::Manitoba => 2,
            Province::NewBrunswick => 3,
            Province::NewfoundlandAndLabrador => 4,
            Province::NovaScotia => 5,
            Province::Ontario => 6,
            Province::PrinceEdwardIsland => 7,
            Province::Quebec => 8,
            Province::Saskatchewan => 9,
        }
    }

    pub fn from_index(idx: usize) -> Option<Province> {
        Self::all().get(idx).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Province::Alberta => "Alberta",
            Province::BritishColumbia => "British Columbia",
            Province::Manitoba => "Manitoba",
            Province::NewBrunswick => "New Brunswick",
            Province::NewfoundlandAndLabrador => "Newfoundland and Labrador",
            Province::NovaScotia => "Nova Scotia",
            Province::Ontario => "Ontario",
            Province::PrinceEdwardIsland => "Prince Edward Island",
            Province::Quebec => "Quebec",
            Province::Saskatchewan => "Saskatchewan",
        }
    }

    /// Two-letter postal abbreviation.
    pub fn code(&self) -> &'static str {
        match self {
            Province::Alberta => "AB",
            Province::BritishColumbia => "BC",
            Province::Manitoba => "MB",
            Province::NewBrunswick => "NB",
            Province::NewfoundlandAndLabrador => "NL",
            Province::NovaScotia => "NS",
            Province::Ontario => "ON",
            Province::PrinceEdwardIsland => "PE",
            Province::Quebec => "QC",
            Province::Saskatchewan => "SK",
        }
    }
}

impl FromStr for Province {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let norm = normalize(s);
        if let Some(p) = Province::all()
            .iter()
            .find(|p| normalize(p.name()) == norm || p.code().eq_ignore_ascii_case(&norm))
        {
            return Ok(*p);
        }
        match norm.as_str() {
            "newfoundland" | "newfoundland & labrador" | "nfld" => {
                Ok(Province::NewfoundlandAndLabrador)
            }
            "pei" | "p e i" => Ok(Province::PrinceEdwardIsland),
            "b c" => Ok(Province::BritishColumbia),
            _ => Err(Error::invalid_level("province", s)),
        }
    }
}

macro_rules! impl_label_conversions {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.name())
            }
        }

        impl TryFrom<String> for $ty {
            type Error = Error;

            fn try_from(value: String) -> Result<Self> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> String {
                value.name().to_string()
            }
        }
    };
}

impl_label_conversions!(Sex);
impl_label_conversions!(AgeGroup);
impl_label_conversions!(Province);

/// One sex x age group x province combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub sex: Sex,
    pub age_group: AgeGroup,
    pub province: Province,
}

impl Cell {
    pub fn new(sex: Sex, age_group: AgeGroup, province: Province) -> Self {
        Cell {
            sex,
            age_group,
            province,
        }
    }

    /// Dense index in `0..N_CELLS`.
    pub fn index(&self) -> usize {
        (self.sex.index() * AgeGroup::COUNT + self.age_group.index()) * Province::COUNT
            + self.province.index()
    }

    pub fn from_index(idx: usize) -> Option<Cell> {
        if idx >= N_CELLS {
            return None;
        }
        let province = Province::from_index(idx % Province::COUNT)?;
        let rest = idx / Province::COUNT;
        let age_group = AgeGroup::from_index(rest % AgeGroup::COUNT)?;
        let sex = Sex::from_index(rest / AgeGroup::COUNT)?;
        Some(Cell::new(sex, age_group, province))
    }

    /// All cells in index order.
    pub fn all() -> impl Iterator<Item = Cell> {
        (0..N_CELLS).filter_map(Cell::from_index)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {} / {}", self.province, self.age_group, self.sex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_binning_boundaries() {
        assert_eq!(AgeGroup::from_age(19.9).unwrap(), AgeGroup::Under20);
        assert_eq!(AgeGroup::from_age(20.0).unwrap(), AgeGroup::Age21To29);
        assert_eq!(AgeGroup::from_age(29.0).unwrap(), AgeGroup::Age30To39);
        assert_eq!(AgeGroup::from_age(65.0).unwrap(), AgeGroup::Age40To65);
        assert_eq!(AgeGroup::from_age(65.1).unwrap(), AgeGroup::Over65);
    }

    #[test]
    fn age_binning_rejects_invalid() {
        assert!(matches!(
            AgeGroup::from_age(-1.0),
            Err(Error::InvalidFactorLevel { .. })
        ));
        assert!(AgeGroup::from_age(f64::NAN).is_err());
    }

    #[test]
    fn age_labels_match_bins() {
        let labels: Vec<&str> = AgeGroup::all().iter().map(|a| a.name()).collect();
        assert_eq!(labels, ["Under 20", "21-29", "30-39", "40-65", "Over 65"]);
    }

    #[test]
    fn sex_parsing_is_total() {
        assert_eq!("Male".parse::<Sex>().unwrap(), Sex::Male);
        assert_eq!(" f ".parse::<Sex>().unwrap(), Sex::Female);
        let err = "unknown".parse::<Sex>().unwrap_err();
        assert!(matches!(err, Error::InvalidFactorLevel { ref factor, .. } if factor == "sex"));
    }

    #[test]
    fn province_parsing_accepts_names_and_codes() {
        assert_eq!("Ontario".parse::<Province>().unwrap(), Province::Ontario);
        assert_eq!("qc".parse::<Province>().unwrap(), Province::Quebec);
        assert_eq!("Québec".parse::<Province>().unwrap(), Province::Quebec);
        assert_eq!(
            "prince_edward_island".parse::<Province>().unwrap(),
            Province::PrinceEdwardIsland
        );
        assert_eq!(
            "Newfoundland".parse::<Province>().unwrap(),
            Province::NewfoundlandAndLabrador
        );
    }

    #[test]
    fn territories_are_rejected() {
        for t in ["Yukon", "Northwest Territories", "Nunavut", "NU"] {
            assert!(matches!(
                t.parse::<Province>(),
                Err(Error::InvalidFactorLevel { .. })
            ));
        }
    }

    #[test]
    fn reference_levels_come_first() {
        assert_eq!(Province::REFERENCE.index(), 0);
        assert_eq!(Sex::REFERENCE.index(), 0);
    }

    #[test]
    fn index_roundtrip() {
        for p in Province::all() {
            assert_eq!(Province::from_index(p.index()), Some(*p));
        }
        for a in AgeGroup::all() {
            assert_eq!(AgeGroup::from_index(a.index()), Some(*a));
        }
        assert_eq!(Province::from_index(10), None);
    }

    #[test]
    fn cell_index_is_dense_and_unique() {
        let cells: Vec<Cell> = Cell::all().collect();
        assert_eq!(cells.len(), N_CELLS);
        for (i, c) in cells.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }

    #[test]
    fn serde_uses_labels() {
        let json = serde_json::to_string(&AgeGroup::Over65).unwrap();
        assert_eq!(json, "\"Over 65\"");
        let parsed: Province = serde_json::from_str("\"British Columbia\"").unwrap();
        assert_eq!(parsed, Province::BritishColumbia);
        assert!(serde_json::from_str::<Province>("\"Yukon\"").is_err());
    }
}
