//! Input validation summary for `mrp check`.

use mrp_common::categories::Cell;
use mrp_common::{AgeGroup, Province, Sex};
use serde::Serialize;

use super::{ObservationTable, StratumTable};
use crate::model::CategoryLevels;

#[derive(Debug, Clone, Serialize)]
pub struct ObservationCheck {
    pub rows: usize,
    pub skipped_unknown: usize,
    pub owned: usize,
    pub ownership_rate: Option<f64>,
    pub levels: CategoryLevels,
    pub unobserved_sexes: Vec<Sex>,
    pub unobserved_age_groups: Vec<AgeGroup>,
    pub unobserved_provinces: Vec<Province>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StratumCheck {
    pub rows: usize,
    pub total_population: u64,
    pub complete: bool,
    pub missing_cells: Vec<String>,
    /// Strata whose categories never appear in the observations.
    pub unmatched_strata: Vec<String>,
}

/// Result of validating the input tables without fitting.
#[derive(Debug, Clone, Serialize)]
pub struct InputCheck {
    pub observations: ObservationCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strata: Option<StratumCheck>,
}

impl InputCheck {
    pub fn new(observations: &ObservationTable, strata: Option<&StratumTable>) -> Self {
        let levels = observations.levels();
        let rows = observations.len();
        let owned = observations.owned_count();

        let obs_check = ObservationCheck {
            rows,
            skipped_unknown: observations.skipped_unknown(),
            owned,
            ownership_rate: (rows > 0).then(|| owned as f64 / rows as f64),
            unobserved_sexes: Sex::all()
                .iter()
                .copied()
                .filter(|s| !levels.sexes.contains(s))
                .collect(),
            unobserved_age_groups: AgeGroup::all()
                .iter()
                .copied()
                .filter(|a| !levels.age_groups.contains(a))
                .collect(),
            unobserved_provinces: Province::all()
                .iter()
                .copied()
                .filter(|p| !levels.provinces.contains(p))
                .collect(),
            levels: levels.clone(),
        };

        let strata_check = strata.map(|table| StratumCheck {
            rows: table.len(),
            total_population: table.total_population(),
            complete: table.is_complete(),
            missing_cells: table.missing_cells().iter().map(Cell::to_string).collect(),
            unmatched_strata: table
                .iter()
                .filter(|s| levels.check(s.cell()).is_err())
                .map(|s| s.cell().to_string())
                .collect(),
        });

        InputCheck {
            observations: obs_check,
            strata: strata_check,
        }
    }

    /// True when the tables can be fitted and post-stratified as they are.
    pub fn is_usable(&self) -> bool {
        self.observations.rows > 0
            && self.strata.as_ref().is_none_or(|s| {
                s.unmatched_strata.is_empty() && s.total_population > 0
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Observation, Stratum};

    #[test]
    fn reports_unmatched_strata() {
        let obs = ObservationTable::new(vec![
            Observation::new(true, Sex::Male, AgeGroup::Age30To39, Province::Ontario),
            Observation::new(false, Sex::Female, AgeGroup::Age30To39, Province::Ontario),
        ]);
        let strata = StratumTable::new(vec![
            Stratum::new(Province::Ontario, AgeGroup::Age30To39, Sex::Male, 10),
            Stratum::new(Province::Quebec, AgeGroup::Age30To39, Sex::Male, 10),
        ])
        .unwrap();

        let check = InputCheck::new(&obs, Some(&strata));
        assert_eq!(check.observations.ownership_rate, Some(0.5));
        assert_eq!(check.observations.unobserved_provinces.len(), 9);
        let s = check.strata.as_ref().unwrap();
        assert_eq!(s.unmatched_strata.len(), 1);
        assert!(!s.complete);
        assert_eq!(s.missing_cells.len(), 98);
        assert!(!check.is_usable());
    }

    #[test]
    fn observations_only() {
        let obs = ObservationTable::new(vec![Observation::new(
            true,
            Sex::Male,
            AgeGroup::Under20,
            Province::Alberta,
        )]);
        let check = InputCheck::new(&obs, None);
        assert!(check.strata.is_none());
        assert!(check.is_usable());
    }
}
