//! Sampler, diagnostics, and prediction settings.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minimum number of chains the convergence diagnostics can work with.
pub const MIN_CHAINS: usize = 2;

/// NUTS run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    /// Number of independent chains (at least 2).
    pub chains: usize,
    /// Warmup iterations per chain (step size and mass matrix adaptation).
    pub warmup: usize,
    /// Retained draws per chain.
    pub draws: usize,
    /// Target mean acceptance statistic for step-size adaptation.
    pub target_accept: f64,
    /// Maximum trajectory tree depth.
    pub max_treedepth: usize,
    /// Initial values are drawn uniformly from (-init_radius, init_radius).
    pub init_radius: f64,
    /// Initialisation attempts per chain before giving up.
    pub max_init_attempts: usize,
    /// Top-level seed; per-chain seeds are derived from it.
    pub seed: u64,
    /// Wall-clock budget for the whole sampling stage.
    pub timeout_secs: Option<u64>,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        SamplerSettings {
            chains: 4,
            warmup: 1000,
            draws: 1000,
            target_accept: 0.99,
            max_treedepth: 10,
            init_radius: 2.0,
            max_init_attempts: 100,
            seed: 20_240_917,
            timeout_secs: None,
        }
    }
}

impl SamplerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.chains < MIN_CHAINS {
            return Err(Error::InvalidConfig(format!(
                "sampler.chains must be at least {}, got {}",
                MIN_CHAINS, self.chains
            )));
        }
        if self.warmup < 20 {
            return Err(Error::InvalidConfig(format!(
                "sampler.warmup must be at least 20, got {}",
                self.warmup
            )));
        }
        if self.draws < 10 {
            return Err(Error::InvalidConfig(format!(
                "sampler.draws must be at least 10, got {}",
                self.draws
            )));
        }
        if !(self.target_accept > 0.0 && self.target_accept < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "sampler.target_accept must be in (0, 1), got {}",
                self.target_accept
            )));
        }
        if !(1..=15).contains(&self.max_treedepth) {
            return Err(Error::InvalidConfig(format!(
                "sampler.max_treedepth must be in 1..=15, got {}",
                self.max_treedepth
            )));
        }
        if !(self.init_radius.is_finite() && self.init_radius > 0.0) {
            return Err(Error::InvalidConfig(
                "sampler.init_radius must be positive".to_string(),
            ));
        }
        if self.max_init_attempts == 0 {
            return Err(Error::InvalidConfig(
                "sampler.max_init_attempts must be at least 1".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::InvalidConfig(
                "sampler.timeout_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Convergence thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSettings {
    /// A parameter is flagged when its potential scale reduction exceeds this.
    pub rhat_threshold: f64,
    /// Effective sample size below `min_ess_per_chain * chains` is flagged.
    pub min_ess_per_chain: f64,
    /// Largest lag reported in autocorrelation summaries.
    pub max_lag: usize,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        DiagnosticsSettings {
            rhat_threshold: 1.05,
            min_ess_per_chain: 100.0,
            max_lag: 20,
        }
    }
}

impl DiagnosticsSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.rhat_threshold.is_finite() && self.rhat_threshold > 1.0) {
            return Err(Error::InvalidConfig(format!(
                "diagnostics.rhat_threshold must be greater than 1, got {}",
                self.rhat_threshold
            )));
        }
        if !(self.min_ess_per_chain.is_finite() && self.min_ess_per_chain >= 0.0) {
            return Err(Error::InvalidConfig(
                "diagnostics.min_ess_per_chain must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Posterior prediction and predictive-check settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictiveSettings {
    /// Posterior samples used per predictive matrix (rows).
    pub draws: usize,
    /// Two-sided p-value below which a predictive check fails.
    pub ppc_alpha: f64,
}

impl Default for PredictiveSettings {
    fn default() -> Self {
        PredictiveSettings {
            draws: 1000,
            ppc_alpha: 0.05,
        }
    }
}

impl PredictiveSettings {
    pub fn validate(&self) -> Result<()> {
        if self.draws == 0 {
            return Err(Error::InvalidConfig(
                "predictive.draws must be at least 1".to_string(),
            ));
        }
        if !(self.ppc_alpha > 0.0 && self.ppc_alpha < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "predictive.ppc_alpha must be in (0, 1), got {}",
                self.ppc_alpha
            )));
        }
        Ok(())
    }
}
