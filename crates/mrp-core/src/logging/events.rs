//! Structured event definitions for logging.
//!
//! Every event carries the run correlation IDs and the pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Stages of an estimation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Reading and typing the input tables.
    Load,
    /// Model construction and sampling.
    Fit,
    /// Convergence diagnostics.
    Diagnose,
    /// Posterior predictive simulation and checks.
    Predict,
    /// Post-stratified estimation.
    Poststrat,
    /// Report rendering.
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Fit => "fit",
            Stage::Diagnose => "diagnose",
            Stage::Predict => "predict",
            Stage::Poststrat => "poststrat",
            Stage::Report => "report",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Load stage
    pub const LOAD_OBSERVATIONS: &str = "load.observations";
    pub const LOAD_STRATA: &str = "load.strata";

    // Fit stage
    pub const FIT_STARTED: &str = "fit.started";
    pub const FIT_MODEL_BUILT: &str = "fit.model_built";
    pub const FIT_SAMPLING_STARTED: &str = "fit.sampling_started";
    pub const FIT_SAMPLING_CANCELLED: &str = "fit.sampling_cancelled";
    pub const FIT_SAMPLING_FINISHED: &str = "fit.sampling_finished";
    pub const FIT_CHAIN_STARTED: &str = "fit.chain_started";
    pub const FIT_CHAIN_FINISHED: &str = "fit.chain_finished";
    pub const FIT_CHAIN_CANCELLED: &str = "fit.chain_cancelled";
    pub const FIT_DIVERGENCES: &str = "fit.divergences";
    pub const FIT_FINISHED: &str = "fit.finished";

    // Diagnose stage
    pub const DIAGNOSE_FINISHED: &str = "diagnose.finished";
    pub const DIAGNOSE_NON_CONVERGENCE: &str = "diagnose.non_convergence";
    pub const DIAGNOSE_LOW_ESS: &str = "diagnose.low_ess";

    // Predict stage
    pub const PREDICT_FINISHED: &str = "predict.finished";
    pub const PREDICT_IMPUTED: &str = "predict.imputed";
    pub const PPC_FINISHED: &str = "ppc.finished";

    // Poststrat stage
    pub const POSTSTRAT_FINISHED: &str = "poststrat.finished";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// One JSONL log line.
///
/// Correlation fields are optional: events emitted through `log_event!`
/// carry all of them, sampler-internal events only what their span gives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub level: Level,
    /// Event name (e.g. "run.started", "fit.chain_finished").
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    /// SHA-256 prefix of the input tables, once they are loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogEvent {
    pub fn new(level: Level, event: impl Into<String>) -> Self {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: None,
            host_id: None,
            dataset_id: None,
            stage: None,
            message: None,
            fields: BTreeMap::new(),
        }
    }

    /// Serialize to a single JSON line.
    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Correlation IDs shared by every event of one run.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
    pub dataset_id: Option<String>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
            dataset_id: None,
        }
    }

    pub fn with_dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }
}
