//! Sample summaries for posterior draws: moments, quantiles, autocorrelation.

use serde::{Deserialize, Serialize};

/// Arithmetic mean. NaN for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (divisor n - 1). NaN for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64
}

/// Empirical quantile with linear interpolation between order statistics
/// (Hyndman-Fan type 7). `values` need not be sorted.
pub fn quantile(values: &[f64], prob: f64) -> f64 {
    if values.is_empty() || prob.is_nan() {
        return f64::NAN;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, prob)
}

/// Type-7 quantile of already sorted values.
pub fn quantile_sorted(sorted: &[f64], prob: f64) -> f64 {
    if sorted.is_empty() || prob.is_nan() {
        return f64::NAN;
    }
    let p = prob.clamp(0.0, 1.0);
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Lag-k autocorrelation normalised by the lag-0 sum of squares.
///
/// Returns 0 for an empty series, a lag beyond the series, or a constant series.
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if series.is_empty() || lag >= series.len() {
        return 0.0;
    }
    let m = mean(series);
    let denominator: f64 = series.iter().map(|v| (v - m) * (v - m)).sum();
    if denominator <= 0.0 {
        return 0.0;
    }
    let numerator: f64 = (0..series.len() - lag)
        .map(|i| (series[i] - m) * (series[i + lag] - m))
        .sum();
    numerator / denominator
}

/// Autocorrelations for lags `0..=max_lag` (capped at the series length).
pub fn autocorrelation_function(series: &[f64], max_lag: usize) -> Vec<f64> {
    if series.is_empty() {
        return Vec::new();
    }
    let last = max_lag.min(series.len() - 1);
    (0..=last)
        .map(|lag| if lag == 0 { 1.0 } else { autocorrelation(series, lag) })
        .collect()
}

/// Posterior mean, standard deviation, and central 95% interval of a draw vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawSummary {
    pub mean: f64,
    pub sd: f64,
    pub q2_5: f64,
    pub q97_5: f64,
}

impl DrawSummary {
    /// Summarise draws; all fields are NaN when `draws` is empty.
    pub fn from_draws(draws: &[f64]) -> Self {
        let mut sorted: Vec<f64> = draws.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        DrawSummary {
            mean: mean(draws),
            sd: sample_variance(draws).sqrt(),
            q2_5: quantile_sorted(&sorted, 0.025),
            q97_5: quantile_sorted(&sorted, 0.975),
        }
    }

    /// Whether `value` lies inside the central 95% interval.
    pub fn covers(&self, value: f64) -> bool {
        self.q2_5 <= value && value <= self.q97_5
    }
}
