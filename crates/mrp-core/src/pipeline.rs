//! End-to-end estimation run.
//!
//! ```text
//! fit -> diagnose -> coefficients -> predictive check
//!     -> in-sample and population predictions -> post-stratification
//! ```
//!
//! Fatal errors stop the run; everything else becomes a [`Warning`] on the
//! returned [`MrpReport`].

use chrono::{DateTime, Utc};
use mrp_common::config::CONFIG_SCHEMA_VERSION;
use mrp_common::{ConfigSnapshot, MrpConfig, Result};
use serde::Serialize;

use crate::coefficients::{coefficient_table, CoefficientRow};
use crate::data::{ObservationTable, StratumTable};
use crate::diagnostics::{diagnose, DiagnosticReport};
use crate::fit::{fit, FittedModel};
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::poststrat::{poststratify, PostStratEstimate};
use crate::ppc::{PpcChecker, PpcConfig, PpcResult};
use crate::predictive::{posterior_predict, ImputedPredictions, PredictionTarget};
use crate::sampler::{chain_seed, CancellationToken};
use crate::warnings::Warning;

/// What was fitted and how.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub formula: String,
    pub age_pooling: String,
    pub n_observations: usize,
    pub n_chains: usize,
    pub n_draws_per_chain: usize,
    pub seed: u64,
    pub sampling_ms: u64,
}

/// Shape and imputation record of one predictive matrix.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionSummary {
    pub n_samples: usize,
    pub n_targets: usize,
    pub n_imputed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<f64>,
    /// Mean simulated ownership across all entries.
    pub mean_outcome: f64,
    /// The matrix itself; written only on request.
    #[serde(skip)]
    pub matrix: ImputedPredictions,
}

impl PredictionSummary {
    fn new(matrix: ImputedPredictions) -> Self {
        let n_samples = matrix.values.len();
        let n_targets = matrix.values.first().map_or(0, Vec::len);
        PredictionSummary {
            n_samples,
            n_targets,
            n_imputed: matrix.n_imputed,
            fill_value: matrix.fill_value,
            mean_outcome: mrp_math::mean(&matrix.row_means()),
            matrix,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Predictions {
    pub in_sample: PredictionSummary,
    pub population: PredictionSummary,
}

/// Complete result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct MrpReport {
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigSnapshot>,
    pub model: ModelSummary,
    pub coefficients: Vec<CoefficientRow>,
    pub diagnostics: DiagnosticReport,
    pub ppc: PpcResult,
    pub predictions: Predictions,
    pub estimate: PostStratEstimate,
    pub reliable: bool,
    pub warnings: Vec<Warning>,
    pub elapsed_ms: u64,
    #[serde(skip)]
    pub fitted: FittedModel,
}

/// Configured estimation run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: MrpConfig,
    ctx: LogContext,
    snapshot: Option<ConfigSnapshot>,
}

impl Pipeline {
    pub fn new(config: MrpConfig) -> Self {
        Pipeline {
            config,
            ctx: LogContext::new("run-local", "host-local"),
            snapshot: None,
        }
    }

    pub fn with_log_context(mut self, ctx: LogContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Embed the record of where the config came from.
    pub fn with_snapshot(mut self, snapshot: ConfigSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn config(&self) -> &MrpConfig {
        &self.config
    }

    pub fn run(
        &self,
        observations: &ObservationTable,
        strata: &StratumTable,
        cancel: &CancellationToken,
    ) -> Result<MrpReport> {
        let started = std::time::Instant::now();
        let ctx = &self.ctx;
        let config = &self.config;
        config.validate()?;

        // Fail on unmatched strata before paying for sampling.
        observations.levels().check_strata(strata)?;

        log_event!(
            ctx,
            INFO,
            event_names::FIT_STARTED,
            Stage::Fit,
            "fitting ownership model",
            observations = observations.len(),
            strata = strata.len(),
            chains = config.sampler.chains
        );
        let fitted = fit(observations, &config.model, &config.sampler, cancel)?;
        let mut warnings = Vec::new();
        log_event!(
            ctx,
            INFO,
            event_names::FIT_FINISHED,
            Stage::Fit,
            "fit finished",
            chains = fitted.n_chains(),
            divergent = fitted.divergent_transitions(),
            elapsed_ms = fitted.elapsed_ms
        );

        let diagnostics = diagnose(&fitted, &config.diagnostics)?;
        warnings.extend(diagnostics.warnings.iter().cloned());
        log_event!(
            ctx,
            INFO,
            event_names::DIAGNOSE_FINISHED,
            Stage::Diagnose,
            "diagnostics finished",
            reliable = diagnostics.reliable,
            max_psrf = diagnostics.max_psrf,
            min_ess = diagnostics.min_ess
        );

        let coefficients = coefficient_table(&fitted);

        let n_draws = config.predictive.draws;
        let base_seed = config.sampler.seed;
        let in_sample = self.predict(
            &fitted,
            observations.rows(),
            n_draws,
            chain_seed(base_seed, config.sampler.chains),
            "in_sample",
            &mut warnings,
        )?;
        let population = self.predict(
            &fitted,
            strata.rows(),
            n_draws,
            chain_seed(base_seed, config.sampler.chains + 1),
            "population",
            &mut warnings,
        )?;

        let ppc = PpcChecker::new(PpcConfig::from(&config.predictive))
            .check(observations, &in_sample.matrix)?;
        for failed in &ppc.failed_checks {
            warnings.push(Warning::PosteriorPredictiveCheckFailed {
                statistic: failed.statistic.clone(),
                p_value: failed.p_value,
            });
        }
        log_event!(
            ctx,
            INFO,
            event_names::PPC_FINISHED,
            Stage::Predict,
            ppc.summary.as_str(),
            passed = ppc.passed,
            min_p_value = ppc.min_p_value()
        );

        let estimate = poststratify(&fitted, strata)?;

        let reliable = !warnings.iter().any(Warning::affects_reliability);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        log_event!(
            ctx,
            INFO,
            event_names::RUN_FINISHED,
            Stage::Report,
            "estimation finished",
            estimate = estimate.estimate.mean,
            reliable = reliable,
            warnings = warnings.len(),
            elapsed_ms = elapsed_ms
        );

        Ok(MrpReport {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            run_id: Some(ctx.run_id.clone()),
            dataset_id: ctx.dataset_id.clone(),
            generated_at: Utc::now(),
            config: self.snapshot.clone(),
            model: ModelSummary {
                formula: fitted.spec.formula.clone(),
                age_pooling: config.model.age_pooling.to_string(),
                n_observations: fitted.n_observations,
                n_chains: fitted.n_chains(),
                n_draws_per_chain: fitted.n_draws_per_chain(),
                seed: fitted.seed,
                sampling_ms: fitted.elapsed_ms,
            },
            coefficients,
            diagnostics,
            ppc,
            predictions: Predictions {
                in_sample,
                population,
            },
            estimate,
            reliable,
            warnings,
            elapsed_ms,
            fitted,
        })
    }

    fn predict<T: PredictionTarget>(
        &self,
        fitted: &FittedModel,
        targets: &[T],
        n_draws: usize,
        seed: u64,
        name: &str,
        warnings: &mut Vec<Warning>,
    ) -> Result<PredictionSummary> {
        let matrix = posterior_predict(fitted, targets, n_draws, seed)?;
        let imputed = matrix.impute_missing()?;
        if imputed.n_imputed > 0 {
            log_event!(
                self.ctx,
                WARN,
                event_names::PREDICT_IMPUTED,
                Stage::Predict,
                "undefined predictions imputed",
                matrix = name,
                count = imputed.n_imputed
            );
            warnings.push(Warning::UndefinedPredictionsImputed {
                matrix: name.to_string(),
                count: imputed.n_imputed,
            });
        }
        log_event!(
            self.ctx,
            DEBUG,
            event_names::PREDICT_FINISHED,
            Stage::Predict,
            "predictive matrix drawn",
            matrix = name,
            samples = imputed.values.len(),
            targets = targets.len()
        );
        Ok(PredictionSummary::new(imputed))
    }
}

/// Run the whole estimation with `config`.
pub fn run_pipeline(
    observations: &ObservationTable,
    strata: &StratumTable,
    config: &MrpConfig,
    cancel: &CancellationToken,
) -> Result<MrpReport> {
    Pipeline::new(config.clone()).run(observations, strata, cancel)
}
