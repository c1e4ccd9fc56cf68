//! Fitting: observations in, posterior draws out.

use mrp_common::categories::Cell;
use mrp_common::config::ModelPriors;
use mrp_common::Result;
use serde::Serialize;
use tracing::info;

use crate::data::ObservationTable;
use crate::logging::event_names;
use crate::model::{CategoryLevels, ModelSpec, ParameterLayout};
use crate::sampler::{self, CancellationToken, CancelledChain, ChainOutput, SamplerConfig};
use crate::warnings::Warning;

/// Posterior draws of the ownership model with the context needed to use them.
#[derive(Debug, Clone, Serialize)]
pub struct FittedModel {
    pub spec: ModelSpec,
    pub layout: ParameterLayout,
    pub levels: CategoryLevels,
    pub n_observations: usize,
    pub chains: Vec<ChainOutput>,
    pub cancelled: Vec<CancelledChain>,
    pub warnings: Vec<Warning>,
    pub seed: u64,
    pub max_treedepth: usize,
    pub elapsed_ms: u64,
}

impl FittedModel {
    pub fn n_chains(&self) -> usize {
        self.chains.len()
    }

    /// Draws per chain; chains always have equal length.
    pub fn n_draws_per_chain(&self) -> usize {
        self.chains.first().map_or(0, |c| c.draws.len())
    }

    pub fn n_draws_total(&self) -> usize {
        self.chains.iter().map(|c| c.draws.len()).sum()
    }

    /// Per-chain trace of parameter `index`.
    pub fn trace(&self, index: usize) -> Vec<Vec<f64>> {
        self.chains
            .iter()
            .map(|c| c.draws.iter().map(|d| d[index]).collect())
            .collect()
    }

    /// All draws of parameter `index`, chains concatenated.
    pub fn pooled(&self, index: usize) -> Vec<f64> {
        self.chains
            .iter()
            .flat_map(|c| c.draws.iter().map(move |d| d[index]))
            .collect()
    }

    /// Draw `i` of the pooled sample, counting through the chains in order.
    pub fn draw(&self, i: usize) -> Option<&[f64]> {
        let per_chain = self.n_draws_per_chain();
        if per_chain == 0 {
            return None;
        }
        self.chains
            .get(i / per_chain)
            .and_then(|c| c.draws.get(i % per_chain))
            .map(Vec::as_slice)
    }

    pub fn draws(&self) -> impl Iterator<Item = &[f64]> {
        self.chains
            .iter()
            .flat_map(|c| c.draws.iter().map(Vec::as_slice))
    }

    /// Linear predictor of `cell` under `draw`, or `None` for a cell with a
    /// level never seen in training.
    pub fn linear_predictor(&self, draw: &[f64], cell: Cell) -> Option<f64> {
        self.levels
            .contains(cell)
            .then(|| ParameterLayout::linear_predictor(draw, cell))
    }

    pub fn divergent_transitions(&self) -> usize {
        self.chains.iter().map(ChainOutput::divergent_count).sum()
    }
}

/// Fit the ownership model to `observations`.
pub fn fit(
    observations: &ObservationTable,
    priors: &ModelPriors,
    config: &SamplerConfig,
    cancel: &CancellationToken,
) -> Result<FittedModel> {
    let model = ModelSpec::build(observations, priors)?;
    info!(
        target: event_names::FIT_MODEL_BUILT,
        formula = %model.spec().formula,
        observations = model.n_observations(),
        cells = model.cells().len(),
        parameters = model.layout().dim(),
        "model built"
    );

    let output = sampler::sample(&model, config, cancel)?;
    Ok(FittedModel {
        spec: model.spec().clone(),
        layout: model.layout().clone(),
        levels: model.levels().clone(),
        n_observations: model.n_observations(),
        chains: output.chains,
        cancelled: output.cancelled,
        warnings: output.warnings,
        seed: config.seed,
        max_treedepth: config.max_treedepth,
        elapsed_ms: output.elapsed_ms,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures: a small simulated survey and a cheap sampler config.

    use super::*;
    use crate::data::Observation;
    use mrp_common::{AgeGroup, Province, Sex};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::sync::OnceLock;

    /// Simulate `n` respondents with `logit p = -0.2 + male_effect * male`.
    pub fn simulated_observations(n: usize, male_effect: f64, seed: u64) -> ObservationTable {
        let mut rng = StdRng::seed_from_u64(seed);
        let rows = (0..n)
            .map(|i| {
                let sex = if i % 2 == 0 { Sex::Male } else { Sex::Female };
                let age = AgeGroup::all()[rng.random_range(0..AgeGroup::COUNT)];
                let province = Province::all()[rng.random_range(0..Province::COUNT)];
                let eta = -0.2 + male_effect * sex.male_indicator();
                let owned = rng.random::<f64>() < mrp_math::sigmoid(eta);
                Observation::new(owned, sex, age, province)
            })
            .collect();
        ObservationTable::new(rows)
    }

    pub fn quick_sampler() -> SamplerConfig {
        SamplerConfig {
            chains: 2,
            warmup: 150,
            draws: 150,
            target_accept: 0.85,
            seed: 11,
            ..SamplerConfig::default()
        }
    }

    /// One shared fit for the whole test binary.
    pub fn quick_fit() -> &'static FittedModel {
        static FIT: OnceLock<FittedModel> = OnceLock::new();
        FIT.get_or_init(|| {
            fit(
                &simulated_observations(400, 1.0, 3),
                &ModelPriors::default(),
                &quick_sampler(),
                &CancellationToken::new(),
            )
            .unwrap()
        })
    }
}
