//! Posterior predictive checks for the ownership model.
//!
//! Observed ownership rates are compared with the same rates computed on
//! each simulated replicate of the training table:
//!
//! - overall rate;
//! - rate within each observed province, age group and sex.
//!
//! A check fails when its p-value falls below the configured threshold.
//! Failures are reported, not fatal: they say the model misses structure in
//! the survey, not that the fit is invalid.

use std::collections::BTreeMap;

use mrp_common::config::PredictiveSettings;
use mrp_common::{Error, Result};
use serde::Serialize;

use crate::data::ObservationTable;
use crate::predictive::ImputedPredictions;

/// Configuration for posterior predictive checks.
#[derive(Debug, Clone)]
pub struct PpcConfig {
    /// p-value threshold for declaring misspecification (default: 0.05).
    pub alpha_threshold: f64,
    /// Groups with fewer respondents are not checked.
    pub min_observations: usize,
    /// Whether to use two-sided p-values.
    pub two_sided: bool,
}

impl Default for PpcConfig {
    fn default() -> Self {
        Self {
            alpha_threshold: 0.05,
            min_observations: 10,
            two_sided: true,
        }
    }
}

impl From<&PredictiveSettings> for PpcConfig {
    fn from(settings: &PredictiveSettings) -> Self {
        Self {
            alpha_threshold: settings.ppc_alpha,
            ..Self::default()
        }
    }
}

/// Result of a single statistic check.
#[derive(Debug, Clone, Serialize)]
pub struct StatisticCheck {
    /// e.g. `ownership_rate` or `ownership_rate[province=Ontario]`.
    pub statistic: String,
    /// Respondents the statistic is computed over.
    pub n: usize,
    pub observed_value: f64,
    /// Mean of the statistic over replicates.
    pub expected_value: f64,
    pub p_value: f64,
    pub passed: bool,
}

/// Overall PPC result.
#[derive(Debug, Clone, Serialize)]
pub struct PpcResult {
    pub passed: bool,
    pub n_observations: usize,
    pub n_replicates: usize,
    pub checks: Vec<StatisticCheck>,
    pub failed_checks: Vec<StatisticCheck>,
    pub summary: String,
}

impl PpcResult {
    pub fn min_p_value(&self) -> f64 {
        self.checks.iter().map(|c| c.p_value).fold(1.0, f64::min)
    }
}

/// Posterior predictive checker.
pub struct PpcChecker {
    config: PpcConfig,
}

impl PpcChecker {
    pub fn new(config: PpcConfig) -> Self {
        Self { config }
    }

    /// Check `observations` against replicates simulated on the same rows.
    pub fn check(
        &self,
        observations: &ObservationTable,
        replicates: &ImputedPredictions,
    ) -> Result<PpcResult> {
        if replicates.values.is_empty() {
            return Err(Error::InvalidInput(
                "posterior predictive check needs at least one replicate".to_string(),
            ));
        }
        if replicates.values.iter().any(|row| row.len() != observations.len()) {
            return Err(Error::InvalidInput(format!(
                "replicates do not match the observation table ({} rows)",
                observations.len()
            )));
        }

        let mut checks = Vec::new();
        for (statistic, columns) in self.groups(observations) {
            if columns.len() < self.config.min_observations {
                continue;
            }
            let observed = columns
                .iter()
                .filter(|&&j| observations.rows()[j].dwelling_owned)
                .count() as f64
                / columns.len() as f64;
            let simulated: Vec<f64> = replicates
                .values
                .iter()
                .map(|row| columns.iter().map(|&j| row[j]).sum::<f64>() / columns.len() as f64)
                .collect();
            let p_value = self.compute_p_value(observed, &simulated);
            checks.push(StatisticCheck {
                statistic,
                n: columns.len(),
                observed_value: observed,
                expected_value: mrp_math::mean(&simulated),
                p_value,
                passed: p_value >= self.config.alpha_threshold,
            });
        }

        let failed_checks: Vec<StatisticCheck> =
            checks.iter().filter(|c| !c.passed).cloned().collect();
        let passed = failed_checks.is_empty();
        let summary = if passed {
            format!("All {} PPC checks passed", checks.len())
        } else {
            let names: Vec<&str> = failed_checks.iter().map(|c| c.statistic.as_str()).collect();
            format!("PPC failed on {}", names.join(", "))
        };

        Ok(PpcResult {
            passed,
            n_observations: observations.len(),
            n_replicates: replicates.values.len(),
            checks,
            failed_checks,
            summary,
        })
    }

    /// Column sets of every checked statistic, overall first.
    fn groups(&self, observations: &ObservationTable) -> Vec<(String, Vec<usize>)> {
        let mut by_province: BTreeMap<_, Vec<usize>> = BTreeMap::new();
        let mut by_age: BTreeMap<_, Vec<usize>> = BTreeMap::new();
        let mut by_sex: BTreeMap<_, Vec<usize>> = BTreeMap::new();
        for (j, obs) in observations.iter().enumerate() {
            by_province.entry(obs.province).or_default().push(j);
            by_age.entry(obs.age_group).or_default().push(j);
            by_sex.entry(obs.sex).or_default().push(j);
        }

        let mut groups = vec![("ownership_rate".to_string(), (0..observations.len()).collect())];
        groups.extend(
            by_province
                .into_iter()
                .map(|(p, cols)| (format!("ownership_rate[province={}]", p), cols)),
        );
        groups.extend(
            by_age
                .into_iter()
                .map(|(a, cols)| (format!("ownership_rate[age_group={}]", a), cols)),
        );
        groups.extend(
            by_sex
                .into_iter()
                .map(|(s, cols)| (format!("ownership_rate[sex={}]", s), cols)),
        );
        groups
    }

    /// Compute p-value: P(T(sim) >= T(obs)) or two-sided.
    fn compute_p_value(&self, observed: f64, simulated: &[f64]) -> f64 {
        if simulated.is_empty() {
            return 1.0;
        }
        let n = simulated.len() as f64;
        if self.config.two_sided {
            let sim_mean = simulated.iter().sum::<f64>() / n;
            let obs_dist = (observed - sim_mean).abs();
            let count = simulated
                .iter()
                .filter(|&&x| (x - sim_mean).abs() >= obs_dist)
                .count();
            (count as f64 + 1.0) / (n + 1.0)
        } else {
            let count = simulated.iter().filter(|&&x| x >= observed).count();
            (count as f64 + 1.0) / (n + 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Observation;
    use mrp_common::{AgeGroup, Province, Sex};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Exactly `rate` of every ten consecutive respondents own.
    fn observations(n: usize, rate: f64) -> ObservationTable {
        let owners = (rate * 10.0).round() as usize;
        ObservationTable::new(
            (0..n)
                .map(|i| {
                    let province = if i % 2 == 0 { Province::Ontario } else { Province::Quebec };
                    let sex = if i % 3 == 0 { Sex::Male } else { Sex::Female };
                    Observation::new(i % 10 < owners, sex, AgeGroup::Age40To65, province)
                })
                .collect(),
        )
    }

    fn replicates(n_rows: usize, n_cols: usize, rate: f64, seed: u64) -> ImputedPredictions {
        let mut rng = StdRng::seed_from_u64(seed);
        ImputedPredictions {
            values: (0..n_rows)
                .map(|_| {
                    (0..n_cols)
                        .map(|_| f64::from(u8::from(rng.random::<f64>() < rate)))
                        .collect()
                })
                .collect(),
            n_imputed: 0,
            fill_value: None,
        }
    }

    #[test]
    fn well_specified_passes_overall() {
        let obs = observations(200, 0.6);
        let checker = PpcChecker::new(PpcConfig::default());
        let result = checker.check(&obs, &replicates(400, 200, 0.6, 2)).unwrap();
        let overall = &result.checks[0];
        assert_eq!(overall.statistic, "ownership_rate");
        assert!(overall.passed, "p = {}", overall.p_value);
        assert!((overall.expected_value - 0.6).abs() < 0.03);
        // overall + 2 provinces + 1 age group + 2 sexes
        assert_eq!(result.checks.len(), 6);
    }

    #[test]
    fn misspecified_rate_fails() {
        let obs = observations(200, 0.9);
        let checker = PpcChecker::new(PpcConfig::default());
        let result = checker.check(&obs, &replicates(400, 200, 0.3, 4)).unwrap();
        assert!(!result.passed);
        assert!(result
            .failed_checks
            .iter()
            .any(|c| c.statistic == "ownership_rate"));
        assert!(result.min_p_value() < 0.01);
        assert!(result.summary.starts_with("PPC failed on"));
    }

    #[test]
    fn small_groups_are_skipped() {
        let obs = observations(12, 0.5);
        let checker = PpcChecker::new(PpcConfig {
            min_observations: 7,
            ..PpcConfig::default()
        });
        let result = checker.check(&obs, &replicates(50, 12, 0.5, 6)).unwrap();
        assert!(result.checks.iter().all(|c| c.n >= 7));
        assert!(result.checks.iter().any(|c| c.statistic == "ownership_rate"));
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let obs = observations(20, 0.5);
        let checker = PpcChecker::new(PpcConfig::default());
        assert!(checker.check(&obs, &replicates(10, 19, 0.5, 8)).is_err());
        assert!(checker.check(&obs, &replicates(0, 20, 0.5, 8)).is_err());
    }

    #[test]
    fn p_value_two_sided() {
        let checker = PpcChecker::new(PpcConfig::default());
        let sims = vec![0.4, 0.5, 0.6];
        // |0.5 - 0.5| = 0: every simulated value is at least as extreme.
        assert_eq!(checker.compute_p_value(0.5, &sims), 1.0);
        assert_eq!(checker.compute_p_value(0.9, &sims), 0.25);
    }

    #[test]
    fn config_from_settings() {
        let settings = PredictiveSettings {
            ppc_alpha: 0.01,
            ..PredictiveSettings::default()
        };
        assert_eq!(PpcConfig::from(&settings).alpha_threshold, 0.01);
    }
}
