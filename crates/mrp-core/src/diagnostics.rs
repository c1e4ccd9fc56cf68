//! Convergence diagnostics over completed chains.
//!
//! - Potential scale reduction factor with the Brooks–Gelman degrees-of-freedom
//!   correction and its 97.5% upper bound.
//! - Split R-hat over half-chains.
//! - Multi-chain effective sample size with Geyer's initial positive
//!   monotone sequence.
//!
//! A parameter has converged when `max(psrf, split_rhat)` is at or below the
//! configured threshold. Any failure marks the whole run unreliable; the
//! report still carries every estimate.

use mrp_common::config::{DiagnosticsSettings, MIN_CHAINS};
use mrp_common::{Error, Result};
use mrp_math::{chi_squared_inv_cdf, f_inv_cdf, mean, sample_variance};
use serde::Serialize;
use tracing::warn;

use crate::fit::FittedModel;
use crate::logging::event_names;
use crate::warnings::Warning;

/// Point estimate and upper confidence bound of the potential scale reduction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Psrf {
    pub point: f64,
    pub upper: f64,
}

/// Largest F denominator df treated as finite; beyond it the chi-square limit is used.
const MAX_FINITE_DF: f64 = 1e7;

fn check_chains(chains: &[&[f64]], min_len: usize) -> Result<usize> {
    if chains.len() < MIN_CHAINS {
        return Err(Error::InvalidInput(format!(
            "convergence diagnostics need at least {} chains, got {}",
            MIN_CHAINS,
            chains.len()
        )));
    }
    let n = chains[0].len();
    if chains.iter().any(|c| c.len() != n) {
        return Err(Error::InvalidInput(
            "chains must have equal length".to_string(),
        ));
    }
    if n < min_len {
        return Err(Error::InvalidInput(format!(
            "convergence diagnostics need at least {} draws per chain, got {}",
            min_len, n
        )));
    }
    Ok(n)
}

fn covariance(x: &[f64], y: &[f64]) -> f64 {
    let mx = mean(x);
    let my = mean(y);
    x.iter()
        .zip(y)
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / (x.len() - 1) as f64
}

/// Gelman–Rubin potential scale reduction factor of one parameter.
pub fn potential_scale_reduction(chains: &[&[f64]]) -> Result<Psrf> {
    let n = check_chains(chains, 2)? as f64;
    let m = chains.len() as f64;

    let s2: Vec<f64> = chains.iter().map(|c| sample_variance(c)).collect();
    let xbar: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let w = mean(&s2);
    let b = n * sample_variance(&xbar);

    if w <= 0.0 {
        // Constant chains: identical constants agree, different ones never will.
        let value = if b <= 0.0 { 1.0 } else { f64::INFINITY };
        return Ok(Psrf {
            point: value,
            upper: value,
        });
    }

    let muhat = mean(&xbar);
    let xbar_sq: Vec<f64> = xbar.iter().map(|x| x * x).collect();
    let var_w = sample_variance(&s2) / m;
    let var_b = 2.0 * b * b / (m - 1.0);
    let cov_wb = (n / m) * (covariance(&s2, &xbar_sq) - 2.0 * muhat * covariance(&s2, &xbar));

    let v = (n - 1.0) / n * w + (1.0 + 1.0 / m) * b / n;
    let var_v = ((n - 1.0).powi(2) * var_w
        + (1.0 + 1.0 / m).powi(2) * var_b
        + 2.0 * (n - 1.0) * (1.0 + 1.0 / m) * cov_wb)
        / (n * n);
    let df_v = 2.0 * v * v / var_v;
    let df_adj = if df_v.is_finite() && df_v > 0.0 {
        (df_v + 3.0) / (df_v + 1.0)
    } else {
        1.0
    };

    let b_df = m - 1.0;
    let w_df = 2.0 * w * w / var_w;
    let r2_fixed = (n - 1.0) / n;
    let r2_random = (1.0 + 1.0 / m) * (1.0 / n) * (b / w);
    let quantile = if w_df.is_finite() && w_df < MAX_FINITE_DF {
        f_inv_cdf(0.975, b_df, w_df)
    } else {
        chi_squared_inv_cdf(0.975, b_df) / b_df
    };

    Ok(Psrf {
        point: (df_adj * (r2_fixed + r2_random)).sqrt(),
        upper: (df_adj * (r2_fixed + quantile * r2_random)).sqrt(),
    })
}

fn rhat(chains: &[&[f64]]) -> f64 {
    let n = chains[0].len() as f64;
    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let within = mean(&chains.iter().map(|c| sample_variance(c)).collect::<Vec<_>>());
    let between = n * sample_variance(&means);
    if !(within.is_finite() && within > 0.0 && between.is_finite()) {
        return if between > 0.0 { f64::INFINITY } else { 1.0 };
    }
    let var_plus = (n - 1.0) / n * within + between / n;
    (var_plus / within).sqrt().max(1.0)
}

/// R-hat over chains split in half; an odd middle draw is dropped.
pub fn split_potential_scale_reduction(chains: &[&[f64]]) -> Result<f64> {
    let n = check_chains(chains, 4)?;
    let half = n / 2;
    let halves: Vec<&[f64]> = chains
        .iter()
        .flat_map(|c| [&c[..half], &c[n - half..]])
        .collect();
    Ok(rhat(&halves))
}

fn autocovariance(series: &[f64], mean: f64, lag: usize) -> f64 {
    let n = series.len();
    (0..n - lag)
        .map(|i| (series[i] - mean) * (series[i + lag] - mean))
        .sum::<f64>()
        / n as f64
}

/// Multi-chain effective sample size.
///
/// Capped at `mn * log10(mn)`; a parameter with no variance counts as
/// fully independent.
pub fn effective_sample_size(chains: &[&[f64]]) -> Result<f64> {
    let n = check_chains(chains, 4)?;
    let m = chains.len();
    let nf = n as f64;
    let total = (m * n) as f64;

    let means: Vec<f64> = chains.iter().map(|c| mean(c)).collect();
    let mean_acov = |lag: usize| -> f64 {
        chains
            .iter()
            .zip(&means)
            .map(|(c, mu)| autocovariance(c, *mu, lag))
            .sum::<f64>()
            / m as f64
    };

    let chain_var: Vec<f64> = chains
        .iter()
        .zip(&means)
        .map(|(c, mu)| autocovariance(c, *mu, 0) * nf / (nf - 1.0))
        .collect();
    let mean_var = mean(&chain_var);
    let var_plus = mean_var * (nf - 1.0) / nf + sample_variance(&means);
    if !(var_plus.is_finite() && var_plus > 0.0) {
        return Ok(total);
    }

    let rho = |lag: usize| 1.0 - (mean_var - mean_acov(lag)) / var_plus;
    let mut rho_hat = vec![0.0; n + 1];
    rho_hat[0] = 1.0;
    let mut even = 1.0;
    let mut odd = rho(1);
    rho_hat[1] = odd;

    let mut t = 1;
    while t + 4 < n && even + odd > 0.0 {
        even = rho(t + 1);
        odd = rho(t + 2);
        if even + odd >= 0.0 {
            rho_hat[t + 1] = even;
            rho_hat[t + 2] = odd;
        }
        t += 2;
    }
    let max_t = t;
    if even > 0.0 {
        rho_hat[max_t + 1] = even;
    }

    // Monotone sequence.
    let mut t = 1;
    while t + 2 <= max_t {
        let previous = rho_hat[t - 1] + rho_hat[t];
        if rho_hat[t + 1] + rho_hat[t + 2] > previous {
            rho_hat[t + 1] = previous / 2.0;
            rho_hat[t + 2] = rho_hat[t + 1];
        }
        t += 2;
    }

    let tau = -1.0 + 2.0 * rho_hat[..max_t].iter().sum::<f64>() + rho_hat[max_t + 1];
    let tau = tau.max(1.0 / total.log10());
    Ok(total / tau)
}

/// Diagnostics of one parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterDiagnostic {
    pub parameter: String,
    pub psrf: f64,
    pub psrf_upper: f64,
    pub split_rhat: f64,
    pub ess: f64,
    pub converged: bool,
    /// Autocorrelation by lag, averaged over chains.
    pub acf: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub parameters: Vec<ParameterDiagnostic>,
    pub reliable: bool,
    pub max_psrf: f64,
    pub min_ess: f64,
    pub n_chains: usize,
    pub n_draws: usize,
    pub divergent_transitions: usize,
    pub rhat_threshold: f64,
    pub warnings: Vec<Warning>,
}

impl DiagnosticReport {
    pub fn parameter(&self, name: &str) -> Option<&ParameterDiagnostic> {
        self.parameters.iter().find(|p| p.parameter == name)
    }

    pub fn non_converged(&self) -> impl Iterator<Item = &ParameterDiagnostic> {
        self.parameters.iter().filter(|p| !p.converged)
    }
}

fn mean_acf(traces: &[Vec<f64>], max_lag: usize) -> Vec<f64> {
    let per_chain: Vec<Vec<f64>> = traces
        .iter()
        .map(|t| mrp_math::autocorrelation_function(t, max_lag))
        .collect();
    let lags = per_chain.iter().map(Vec::len).min().unwrap_or(0);
    (0..lags)
        .map(|lag| mean(&per_chain.iter().map(|acf| acf[lag]).collect::<Vec<_>>()))
        .collect()
}

/// Diagnose every parameter of a fitted model.
pub fn diagnose(fitted: &FittedModel, settings: &DiagnosticsSettings) -> Result<DiagnosticReport> {
    settings.validate()?;
    let min_ess = settings.min_ess_per_chain * fitted.n_chains() as f64;
    let mut warnings = fitted.warnings.clone();
    let mut parameters = Vec::with_capacity(fitted.layout.dim());

    for (index, info) in fitted.layout.params().iter().enumerate() {
        let traces = fitted.trace(index);
        let views: Vec<&[f64]> = traces.iter().map(Vec::as_slice).collect();
        let psrf = potential_scale_reduction(&views)?;
        let split_rhat = split_potential_scale_reduction(&views)?;
        let ess = effective_sample_size(&views)?;
        let worst = psrf.point.max(split_rhat);
        let converged = worst <= settings.rhat_threshold;

        if !converged {
            warn!(
                target: event_names::DIAGNOSE_NON_CONVERGENCE,
                parameter = %info.name,
                psrf = psrf.point,
                split_rhat,
                "parameter has not converged"
            );
            warnings.push(Warning::NonConvergence {
                parameter: info.name.clone(),
                psrf: psrf.point,
                split_rhat,
            });
        }
        if ess < min_ess {
            warn!(
                target: event_names::DIAGNOSE_LOW_ESS,
                parameter = %info.name,
                ess,
                threshold = min_ess,
                "low effective sample size"
            );
            warnings.push(Warning::LowEffectiveSampleSize {
                parameter: info.name.clone(),
                ess,
                threshold: min_ess,
            });
        }

        parameters.push(ParameterDiagnostic {
            parameter: info.name.clone(),
            psrf: psrf.point,
            psrf_upper: psrf.upper,
            split_rhat,
            ess,
            converged,
            acf: mean_acf(&traces, settings.max_lag),
        });
    }

    let max_psrf = parameters
        .iter()
        .map(|p| p.psrf)
        .fold(f64::NEG_INFINITY, f64::max);
    let min_ess = parameters.iter().map(|p| p.ess).fold(f64::INFINITY, f64::min);

    Ok(DiagnosticReport {
        reliable: !warnings.iter().any(Warning::affects_reliability),
        max_psrf,
        min_ess,
        n_chains: fitted.n_chains(),
        n_draws: fitted.n_draws_per_chain(),
        divergent_transitions: fitted.divergent_transitions(),
        rhat_threshold: settings.rhat_threshold,
        parameters,
        warnings,
    })
}
