//! Posterior predictive simulation.
//!
//! For each selected posterior draw and each target row, one Bernoulli
//! outcome is drawn at the row's linear predictor. Rows whose covariates
//! were never seen in training have no defined prediction; those entries
//! stay `None` until [`PredictionMatrix::impute_missing`] fills them.

use mrp_common::categories::Cell;
use mrp_common::{Error, Result};
use rand::distr::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use crate::data::{Observation, Stratum};
use crate::fit::FittedModel;

/// A row that can be predicted: anything with a covariate cell.
pub trait PredictionTarget {
    fn cell(&self) -> Cell;
}

impl PredictionTarget for Observation {
    fn cell(&self) -> Cell {
        Observation::cell(self)
    }
}

impl PredictionTarget for Stratum {
    fn cell(&self) -> Cell {
        Stratum::cell(self)
    }
}

impl PredictionTarget for Cell {
    fn cell(&self) -> Cell {
        *self
    }
}

/// Simulated outcomes: one row per posterior draw, one column per target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionMatrix {
    /// Pooled draw index used for each row.
    pub draw_indices: Vec<usize>,
    pub values: Vec<Vec<Option<u8>>>,
}

/// A prediction matrix with every undefined entry replaced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImputedPredictions {
    pub values: Vec<Vec<f64>>,
    pub n_imputed: usize,
    /// Value written into undefined entries; `None` when nothing was imputed.
    pub fill_value: Option<f64>,
}

impl PredictionMatrix {
    pub fn n_samples(&self) -> usize {
        self.values.len()
    }

    pub fn n_targets(&self) -> usize {
        self.values.first().map_or(0, Vec::len)
    }

    pub fn undefined_count(&self) -> usize {
        self.values.iter().flatten().filter(|v| v.is_none()).count()
    }

    /// Replace each undefined entry with the mean of all valid entries.
    ///
    /// Imputed entries carry no information about their row; they only keep
    /// downstream averages defined. A matrix with no valid entry fails with
    /// [`Error::UndefinedPrediction`].
    pub fn impute_missing(&self) -> Result<ImputedPredictions> {
        let (sum, valid) = self
            .values
            .iter()
            .flatten()
            .flatten()
            .fold((0u64, 0usize), |(s, n), v| (s + u64::from(*v), n + 1));
        let missing = self.undefined_count();

        if missing == 0 {
            return Ok(ImputedPredictions {
                values: self.to_f64(0.0),
                n_imputed: 0,
                fill_value: None,
            });
        }
        if valid == 0 {
            return Err(Error::UndefinedPrediction { count: missing });
        }
        let fill = sum as f64 / valid as f64;
        debug!(missing, fill, "imputing undefined predictions");
        Ok(ImputedPredictions {
            values: self.to_f64(fill),
            n_imputed: missing,
            fill_value: Some(fill),
        })
    }

    fn to_f64(&self, fill: f64) -> Vec<Vec<f64>> {
        self.values
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| v.map_or(fill, f64::from))
                    .collect()
            })
            .collect()
    }
}

impl ImputedPredictions {
    /// Mean simulated outcome of each target across draws.
    pub fn column_means(&self) -> Vec<f64> {
        let rows = self.values.len();
        let cols = self.values.first().map_or(0, Vec::len);
        (0..cols)
            .map(|j| self.values.iter().map(|row| row[j]).sum::<f64>() / rows as f64)
            .collect()
    }

    /// Mean simulated outcome of each draw across targets.
    pub fn row_means(&self) -> Vec<f64> {
        self.values.iter().map(|row| mrp_math::mean(row)).collect()
    }
}

/// Pooled draw indices for `n` evenly spaced rows out of `total` draws.
fn thinned_indices(total: usize, n: usize) -> Vec<usize> {
    (0..n).map(|i| i * total / n).collect()
}

/// Simulate `n_draws` replicate outcomes for every target.
pub fn posterior_predict<T: PredictionTarget>(
    fitted: &FittedModel,
    targets: &[T],
    n_draws: usize,
    seed: u64,
) -> Result<PredictionMatrix> {
    if n_draws == 0 {
        return Err(Error::InvalidInput(
            "posterior prediction needs at least one draw".to_string(),
        ));
    }
    let total = fitted.n_draws_total();
    if total == 0 {
        return Err(Error::InvalidInput(
            "fitted model has no posterior draws".to_string(),
        ));
    }

    let cells: Vec<Cell> = targets.iter().map(PredictionTarget::cell).collect();
    let draw_indices = thinned_indices(total, n_draws);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(n_draws);

    for &index in &draw_indices {
        let Some(draw) = fitted.draw(index) else {
            return Err(Error::InvalidInput(format!(
                "posterior draw {} out of range",
                index
            )));
        };
        let row = cells
            .iter()
            .map(|cell| {
                let eta = fitted.linear_predictor(draw, *cell)?;
                if !eta.is_finite() {
                    return None;
                }
                let outcome = Bernoulli::new(mrp_math::sigmoid(eta)).ok()?;
                Some(u8::from(outcome.sample(&mut rng)))
            })
            .collect();
        values.push(row);
    }

    Ok(PredictionMatrix {
        draw_indices,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::test_support::quick_fit;
    use mrp_common::{AgeGroup, Province, Sex};

    fn matrix(values: Vec<Vec<Option<u8>>>) -> PredictionMatrix {
        PredictionMatrix {
            draw_indices: (0..values.len()).collect(),
            values,
        }
    }

    #[test]
    fn impute_uses_mean_of_valid_entries() {
        let m = matrix(vec![
            vec![Some(1), None, Some(0)],
            vec![Some(1), None, Some(1)],
        ]);
        let imputed = m.impute_missing().unwrap();
        assert_eq!(imputed.n_imputed, 2);
        assert_eq!(imputed.fill_value, Some(0.75));
        assert_eq!(imputed.values[0], vec![1.0, 0.75, 0.0]);
        assert_eq!(imputed.column_means(), vec![1.0, 0.75, 0.5]);
    }

    #[test]
    fn complete_matrix_is_untouched() {
        let m = matrix(vec![vec![Some(1), Some(0)]]);
        let imputed = m.impute_missing().unwrap();
        assert_eq!(imputed.n_imputed, 0);
        assert!(imputed.fill_value.is_none());
        assert_eq!(imputed.row_means(), vec![0.5]);
    }

    #[test]
    fn all_undefined_fails() {
        let m = matrix(vec![vec![None, None]]);
        assert!(matches!(
            m.impute_missing(),
            Err(Error::UndefinedPrediction { count: 2 })
        ));
    }

    #[test]
    fn thinning_spreads_over_all_draws() {
        assert_eq!(thinned_indices(10, 5), vec![0, 2, 4, 6, 8]);
        assert_eq!(thinned_indices(3, 6), vec![0, 0, 1, 1, 2, 2]);
    }

    #[test]
    fn predicts_seen_cells_only() {
        let fitted = quick_fit();
        let mut targets: Vec<Cell> = Cell::all().collect();
        targets.truncate(5);
        let matrix = posterior_predict(fitted, &targets, 40, 9).unwrap();
        assert_eq!(matrix.n_samples(), 40);
        assert_eq!(matrix.n_targets(), 5);
        assert_eq!(matrix.undefined_count(), 0);
        assert!(matrix.values.iter().flatten().all(|v| matches!(v, Some(0 | 1))));
    }

    #[test]
    fn same_seed_same_outcomes() {
        let fitted = quick_fit();
        let targets = vec![Stratum::new(Province::Ontario, AgeGroup::Age40To65, Sex::Male, 10)];
        let a = posterior_predict(fitted, &targets, 30, 1).unwrap();
        let b = posterior_predict(fitted, &targets, 30, 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_draws_rejected() {
        let fitted = quick_fit();
        let targets: Vec<Cell> = Vec::new();
        assert!(matches!(
            posterior_predict(fitted, &targets, 0, 1),
            Err(Error::InvalidInput(_))
        ));
    }
}
