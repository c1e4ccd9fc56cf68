//! Post-stratification of model predictions to the census population.
//!
//! ```text
//! P_hat = sum_s N_s * p_s / sum_s N_s,   p_s = logit^-1(eta_s)
//! ```
//!
//! evaluated once per posterior draw, so the estimate carries the full
//! posterior uncertainty of the cell probabilities.

use std::collections::BTreeMap;

use mrp_common::{AgeGroup, Error, Province, Result, Sex};
use mrp_math::{sigmoid, DrawSummary};
use serde::Serialize;
use tracing::info;

use crate::data::StratumTable;
use crate::fit::FittedModel;
use crate::logging::event_names;
use crate::model::ParameterLayout;

#[derive(Debug, Clone, Serialize)]
pub struct ProvinceEstimate {
    pub province: Province,
    pub population: u64,
    pub estimate: DrawSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct StratumEstimate {
    pub province: Province,
    pub age_group: AgeGroup,
    pub sex: Sex,
    pub population_count: u64,
    /// Posterior mean ownership probability of the stratum.
    pub probability: f64,
}

/// Population ownership rate.
#[derive(Debug, Clone, Serialize)]
pub struct PostStratEstimate {
    pub estimate: DrawSummary,
    pub total_population: u64,
    pub n_strata: usize,
    pub n_draws: usize,
    pub by_province: Vec<ProvinceEstimate>,
    pub strata: Vec<StratumEstimate>,
}

/// Post-stratify `fitted` over `strata`.
///
/// Every stratum must use levels seen in training; otherwise the whole
/// estimate fails with [`Error::CategoryMismatch`] and nothing is dropped.
pub fn poststratify(fitted: &FittedModel, strata: &StratumTable) -> Result<PostStratEstimate> {
    if strata.is_empty() {
        return Err(Error::InvalidInput("stratum table is empty".to_string()));
    }
    let total_population = strata.total_population();
    if total_population == 0 {
        return Err(Error::InvalidInput(
            "stratum population counts sum to zero".to_string(),
        ));
    }
    fitted.levels.check_strata(strata)?;
    let n_draws = fitted.n_draws_total();
    if n_draws == 0 {
        return Err(Error::InvalidInput(
            "fitted model has no posterior draws".to_string(),
        ));
    }

    let mut province_population: BTreeMap<Province, u64> = BTreeMap::new();
    for s in strata.iter() {
        *province_population.entry(s.province).or_default() += s.population_count;
    }
    province_population.retain(|_, n| *n > 0);

    let total = total_population as f64;
    let mut overall = Vec::with_capacity(n_draws);
    let mut by_province: BTreeMap<Province, Vec<f64>> = province_population
        .keys()
        .map(|p| (*p, Vec::with_capacity(n_draws)))
        .collect();
    let mut probability_sums = vec![0.0; strata.len()];

    for draw in fitted.draws() {
        let mut weighted = 0.0;
        let mut province_weighted: BTreeMap<Province, f64> = BTreeMap::new();
        for (i, s) in strata.iter().enumerate() {
            let p = sigmoid(ParameterLayout::linear_predictor(draw, s.cell()));
            probability_sums[i] += p;
            let w = s.population_count as f64 * p;
            weighted += w;
            *province_weighted.entry(s.province).or_default() += w;
        }
        overall.push(weighted / total);
        for (province, values) in by_province.iter_mut() {
            let population = province_population[province] as f64;
            values.push(province_weighted.get(province).copied().unwrap_or(0.0) / population);
        }
    }

    let estimate = DrawSummary::from_draws(&overall);
    info!(
        target: event_names::POSTSTRAT_FINISHED,
        estimate = estimate.mean,
        lower = estimate.q2_5,
        upper = estimate.q97_5,
        strata = strata.len(),
        total_population,
        "post-stratified estimate"
    );

    Ok(PostStratEstimate {
        estimate,
        total_population,
        n_strata: strata.len(),
        n_draws,
        by_province: by_province
            .into_iter()
            .map(|(province, values)| ProvinceEstimate {
                province,
                population: province_population[&province],
                estimate: DrawSummary::from_draws(&values),
            })
            .collect(),
        strata: strata
            .iter()
            .zip(&probability_sums)
            .map(|(s, sum)| StratumEstimate {
                province: s.province,
                age_group: s.age_group,
                sex: s.sex,
                population_count: s.population_count,
                probability: sum / n_draws as f64,
            })
            .collect(),
    })
}
