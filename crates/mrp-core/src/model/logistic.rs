//! Log posterior of the logistic ownership model on the unconstrained scale.

use std::collections::BTreeMap;

use mrp_common::categories::Cell;
use mrp_common::config::{AgePooling, ModelPriors};
use mrp_common::AgeGroup;
use mrp_math::{binomial_logit_log_lik_with_grad, half_student_t_log_pdf_with_grad, normal_log_pdf_with_grad};
use serde::Serialize;

use super::layout::{ParameterLayout, AGE_SCALE, AGE_START, INTERCEPT, MALE, PROVINCE_START};
use super::{CategoryLevels, ModelSpec};
use crate::data::ObservationTable;
use crate::sampler::LogDensity;

/// Binomial sufficient statistic of one cell: `k` owners out of `n` respondents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellCount {
    pub cell: Cell,
    pub n: u64,
    pub k: u64,
}

/// Bernoulli-logit likelihood with the configured priors.
///
/// Respondents in the same cell share a linear predictor, so the
/// likelihood is evaluated once per observed cell.
#[derive(Debug, Clone)]
pub struct LogisticMrpModel {
    spec: ModelSpec,
    layout: ParameterLayout,
    levels: CategoryLevels,
    cells: Vec<CellCount>,
    n_obs: usize,
}

impl LogisticMrpModel {
    pub(crate) fn new(spec: ModelSpec, observations: &ObservationTable) -> Self {
        let mut counts: BTreeMap<Cell, (u64, u64)> = BTreeMap::new();
        for obs in observations.iter() {
            let entry = counts.entry(obs.cell()).or_default();
            entry.0 += 1;
            entry.1 += u64::from(obs.dwelling_owned);
        }
        let cells = counts
            .into_iter()
            .map(|(cell, (n, k))| CellCount { cell, n, k })
            .collect();
        LogisticMrpModel {
            layout: ParameterLayout::new(spec.priors.age_pooling),
            levels: observations.levels(),
            spec,
            cells,
            n_obs: observations.len(),
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn priors(&self) -> &ModelPriors {
        &self.spec.priors
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    pub fn levels(&self) -> &CategoryLevels {
        &self.levels
    }

    pub fn cells(&self) -> &[CellCount] {
        &self.cells
    }

    pub fn n_observations(&self) -> usize {
        self.n_obs
    }

    fn pooled(&self) -> bool {
        self.layout.pooling() == AgePooling::Pooled
    }

    /// Natural-scale age effect of group `a`.
    fn age_effect(&self, q: &[f64], a: AgeGroup) -> f64 {
        let raw = q[ParameterLayout::age_index(a)];
        if self.pooled() {
            q[AGE_SCALE].exp() * raw
        } else {
            raw
        }
    }
}

impl LogDensity for LogisticMrpModel {
    fn dim(&self) -> usize {
        self.layout.dim()
    }

    fn log_density_and_gradient(&self, q: &[f64], grad: &mut [f64]) -> f64 {
        debug_assert_eq!(q.len(), self.dim());
        grad.iter_mut().for_each(|g| *g = 0.0);
        let priors = &self.spec.priors;
        let mut lp = 0.0;

        let (l, g) = normal_log_pdf_with_grad(q[INTERCEPT], priors.intercept.mean, priors.intercept.sd);
        lp += l;
        grad[INTERCEPT] += g;

        let coef = priors.coefficients;
        for i in std::iter::once(MALE).chain(PROVINCE_START..AGE_SCALE) {
            let (l, g) = normal_log_pdf_with_grad(q[i], coef.mean, coef.sd);
            lp += l;
            grad[i] += g;
        }

        let pooled = self.pooled();
        let sigma = if pooled { q[AGE_SCALE].exp() } else { 1.0 };
        for i in AGE_START..PROVINCE_START {
            let (l, g) = if pooled {
                normal_log_pdf_with_grad(q[i], 0.0, 1.0)
            } else {
                normal_log_pdf_with_grad(q[i], priors.age_effect.mean, priors.age_effect.sd)
            };
            lp += l;
            grad[i] += g;
        }
        if pooled {
            let scale = priors.age_scale;
            let (l, g) = half_student_t_log_pdf_with_grad(sigma, scale.df, scale.location, scale.scale);
            // log-Jacobian of sigma = exp(u)
            lp += l + q[AGE_SCALE];
            grad[AGE_SCALE] += g * sigma + 1.0;
        }

        for count in &self.cells {
            let cell = count.cell;
            let male = cell.sex.male_indicator();
            let age_idx = ParameterLayout::age_index(cell.age_group);
            let alpha = self.age_effect(q, cell.age_group);
            let prov_idx = ParameterLayout::province_index(cell.province);

            let mut eta = q[INTERCEPT] + q[MALE] * male + alpha;
            if let Some(p) = prov_idx {
                eta += q[p];
            }
            let (ll, d) = binomial_logit_log_lik_with_grad(count.k as f64, count.n as f64, eta);
            lp += ll;

            grad[INTERCEPT] += d;
            grad[MALE] += d * male;
            if pooled {
                grad[age_idx] += d * sigma;
                grad[AGE_SCALE] += d * alpha;
            } else {
                grad[age_idx] += d;
            }
            if let Some(p) = prov_idx {
                grad[p] += d;
            }
        }

        if !lp.is_finite() {
            return f64::NEG_INFINITY;
        }
        lp
    }

    fn constrain(&self, q: &[f64]) -> Vec<f64> {
        let mut out = q.to_vec();
        if self.pooled() {
            let sigma = q[AGE_SCALE].exp();
            for v in &mut out[AGE_START..PROVINCE_START] {
                *v *= sigma;
            }
            out[AGE_SCALE] = sigma;
        }
        out
    }
}
