//! Model specification for dwelling ownership.
//!
//! ```text
//! logit P(own) = b_Intercept + b_sex[Male] * male + a_age[age_group] + b_province[province]
//! ```
//!
//! Reference levels are Female and Alberta. The age effect is either
//! partially pooled (`a_age = sd_age_group * z`) or fixed; see
//! [`mrp_common::config::AgePooling`].

pub mod layout;
mod logistic;

pub use layout::{ParameterInfo, ParameterKind, ParameterLayout};
pub use logistic::{CellCount, LogisticMrpModel};

use std::collections::BTreeSet;

use mrp_common::categories::Cell;
use mrp_common::config::{AgePooling, ModelPriors};
use mrp_common::{AgeGroup, Error, Province, Result, Sex};
use serde::{Deserialize, Serialize};

use crate::data::{ObservationTable, StratumTable};

/// Factor levels seen in the training data.
///
/// Predictions and post-stratification are only defined for cells whose
/// every level is in this set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLevels {
    pub sexes: BTreeSet<Sex>,
    pub age_groups: BTreeSet<AgeGroup>,
    pub provinces: BTreeSet<Province>,
}

impl CategoryLevels {
    pub fn from_observations(table: &ObservationTable) -> Self {
        let mut levels = CategoryLevels::default();
        for obs in table.iter() {
            levels.sexes.insert(obs.sex);
            levels.age_groups.insert(obs.age_group);
            levels.provinces.insert(obs.province);
        }
        levels
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.sexes.contains(&cell.sex)
            && self.age_groups.contains(&cell.age_group)
            && self.provinces.contains(&cell.province)
    }

    /// Fail with [`Error::CategoryMismatch`] naming the first unseen level.
    pub fn check(&self, cell: Cell) -> Result<()> {
        if !self.provinces.contains(&cell.province) {
            return Err(Error::CategoryMismatch {
                factor: "province".to_string(),
                level: cell.province.to_string(),
            });
        }
        if !self.age_groups.contains(&cell.age_group) {
            return Err(Error::CategoryMismatch {
                factor: "age_group".to_string(),
                level: cell.age_group.to_string(),
            });
        }
        if !self.sexes.contains(&cell.sex) {
            return Err(Error::CategoryMismatch {
                factor: "sex".to_string(),
                level: cell.sex.to_string(),
            });
        }
        Ok(())
    }

    /// Check every stratum of a census table.
    pub fn check_strata(&self, strata: &StratumTable) -> Result<()> {
        strata.iter().try_for_each(|s| self.check(s.cell()))
    }
}

/// Formula and priors of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub formula: String,
    pub priors: ModelPriors,
}

impl ModelSpec {
    pub fn new(priors: &ModelPriors) -> Self {
        let formula = match priors.age_pooling {
            AgePooling::Pooled => "dwelling_owned ~ sex + (1 | age_group) + province",
            AgePooling::Fixed => "dwelling_owned ~ sex + age_group + province",
        };
        ModelSpec {
            formula: formula.to_string(),
            priors: priors.clone(),
        }
    }

    /// Build the log density for `observations` under `priors`.
    ///
    /// Category levels are already enforced by the typed rows, so the
    /// remaining failures are an empty table and invalid priors.
    pub fn build(observations: &ObservationTable, priors: &ModelPriors) -> Result<LogisticMrpModel> {
        if observations.is_empty() {
            return Err(Error::InvalidInput(
                "observation table is empty; nothing to fit".to_string(),
            ));
        }
        priors
            .validate()
            .map_err(|e| Error::InvalidInput(format!("invalid model priors: {}", e)))?;
        Ok(LogisticMrpModel::new(
            ModelSpec::new(priors),
            observations,
        ))
    }
}
