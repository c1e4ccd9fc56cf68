//! Error types for dwelling-tenure MRP estimation.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! Only conditions that stop a run are errors. Divergent transitions,
//! low effective sample size and non-convergence are collected as warnings
//! by mrp-core and never surface through this type.
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Category Mismatch
//!   Reason: stratum uses province level 'Prince Edward Island' that the fitted model never saw
//!   Fix: Refit with observations covering every stratum level, or drop the offending strata.
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for MRP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration file errors.
    Config,
    /// Observation or stratum table errors.
    Input,
    /// Posterior sampling errors.
    Sampling,
    /// Posterior prediction errors.
    Prediction,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Sampling => write!(f, "sampling"),
            ErrorCategory::Prediction => write!(f, "prediction"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested follow-up for automation reacting to an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation.
    Retry,
    /// Reset configuration to defaults.
    ResetConfig,
    /// Run `mrp check` on the inputs.
    RunCheck,
    /// Correct the input tables.
    FixInput,
    /// Rerun with a new seed or a different initialisation radius.
    Reinitialize,
    /// Rerun with a longer timeout.
    IncreaseTimeout,
    /// Abort the operation.
    Abort,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::ResetConfig => write!(f, "reset_config"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::FixInput => write!(f, "fix_input"),
            SuggestedAction::Reinitialize => write!(f, "reinitialize"),
            SuggestedAction::IncreaseTimeout => write!(f, "increase_timeout"),
            SuggestedAction::Abort => write!(f, "abort"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for MRP estimation.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Input errors (20-29)
    #[error("invalid {factor} level '{value}'")]
    InvalidFactorLevel { factor: String, value: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("stratum uses {factor} level '{level}' that the fitted model never saw")]
    CategoryMismatch { factor: String, level: String },

    // Sampling errors (30-39)
    #[error("chain {chain} failed to find a finite starting point after {attempts} attempts")]
    SamplerInitializationFailure { chain: usize, attempts: usize },

    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    #[error("sampling cancelled: {completed} of {required} required chains completed")]
    Cancelled { completed: usize, required: usize },

    // Prediction errors (40-49)
    #[error("all {count} predictive draws are undefined; nothing to impute from")]
    UndefinedPrediction { count: usize },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for an [`Error::InvalidFactorLevel`].
    pub fn invalid_level(factor: impl Into<String>, value: impl Into<String>) -> Self {
        Error::InvalidFactorLevel {
            factor: factor.into(),
            value: value.into(),
        }
    }

    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Input errors
    /// - 30-39: Sampling errors
    /// - 40-49: Prediction errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidConfig(_) => 11,
            Error::InvalidFactorLevel { .. } => 20,
            Error::InvalidInput(_) => 21,
            Error::CategoryMismatch { .. } => 22,
            Error::SamplerInitializationFailure { .. } => 30,
            Error::NumericalInstability(_) => 31,
            Error::Cancelled { .. } => 32,
            Error::UndefinedPrediction { .. } => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::Toml(_) => 62,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => ErrorCategory::Config,

            Error::InvalidFactorLevel { .. }
            | Error::InvalidInput(_)
            | Error::CategoryMismatch { .. } => ErrorCategory::Input,

            Error::SamplerInitializationFailure { .. }
            | Error::NumericalInstability(_)
            | Error::Cancelled { .. } => ErrorCategory::Sampling,

            Error::UndefinedPrediction { .. } => ErrorCategory::Prediction,

            Error::Io(_) | Error::Json(_) | Error::Toml(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether rerunning with different inputs or settings can succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) | Error::InvalidConfig(_) => true,

            // The tables themselves must change.
            Error::InvalidFactorLevel { .. } => false,
            Error::InvalidInput(_) => false,
            Error::CategoryMismatch { .. } => false,

            Error::SamplerInitializationFailure { .. } => true,
            Error::NumericalInstability(_) => true,
            Error::Cancelled { .. } => true,

            Error::UndefinedPrediction { .. } => false,

            Error::Io(_) => true,
            Error::Json(_) | Error::Toml(_) => true,
        }
    }

    /// Returns the suggested action for automation.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) => SuggestedAction::RunCheck,
            Error::InvalidConfig(_) => SuggestedAction::ResetConfig,

            Error::InvalidFactorLevel { .. } => SuggestedAction::FixInput,
            Error::InvalidInput(_) => SuggestedAction::FixInput,
            Error::CategoryMismatch { .. } => SuggestedAction::FixInput,

            Error::SamplerInitializationFailure { .. } => SuggestedAction::Reinitialize,
            Error::NumericalInstability(_) => SuggestedAction::Reinitialize,
            Error::Cancelled { .. } => SuggestedAction::IncreaseTimeout,

            Error::UndefinedPrediction { .. } => SuggestedAction::Abort,

            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) | Error::Toml(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'mrp config validate' to check the configuration file syntax."
            }
            Error::InvalidConfig(_) => {
                "Fix the reported setting, or remove the config file to fall back to built-in defaults."
            }
            Error::InvalidFactorLevel { .. } => {
                "Map the value to one of the documented levels before loading. Territories are not modelled."
            }
            Error::InvalidInput(_) => {
                "Run 'mrp check' on the input tables and correct the reported rows."
            }
            Error::CategoryMismatch { .. } => {
                "Refit with observations covering every stratum level, or drop the offending strata."
            }
            Error::SamplerInitializationFailure { .. } => {
                "Retry with a different '--seed' or a smaller init radius in the sampler config."
            }
            Error::NumericalInstability(_) => {
                "Check for separated cells (all owners or all renters) and consider tighter priors."
            }
            Error::Cancelled { .. } => {
                "Sampling was interrupted. Rerun with a longer '--timeout' or fewer draws."
            }
            Error::UndefinedPrediction { .. } => {
                "No target row could be predicted. Check that targets share categories with the fitted data."
            }
            Error::Io(_) => "Check that the input files exist and are readable.",
            Error::Json(_) => "Invalid JSON. Check syntax with 'jq . <file>'.",
            Error::Toml(_) => "Invalid TOML. Check the reported line in the config file.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidConfig(_) => "Invalid Configuration",
            Error::InvalidFactorLevel { .. } => "Invalid Factor Level",
            Error::InvalidInput(_) => "Invalid Input",
            Error::CategoryMismatch { .. } => "Category Mismatch",
            Error::SamplerInitializationFailure { .. } => "Sampler Initialization Failure",
            Error::NumericalInstability(_) => "Numerical Instability",
            Error::Cancelled { .. } => "Sampling Cancelled",
            Error::UndefinedPrediction { .. } => "Undefined Prediction",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
            Error::Toml(_) => "TOML Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Suggested action for automation.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (factor, level, chain).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InvalidFactorLevel { factor, value } => {
                context.insert("factor".to_string(), serde_json::json!(factor));
                context.insert("value".to_string(), serde_json::json!(value));
            }
            Error::CategoryMismatch { factor, level } => {
                context.insert("factor".to_string(), serde_json::json!(factor));
                context.insert("level".to_string(), serde_json::json!(level));
            }
            Error::SamplerInitializationFailure { chain, attempts } => {
                context.insert("chain".to_string(), serde_json::json!(chain));
                context.insert("attempts".to_string(), serde_json::json!(attempts));
            }
            Error::Cancelled {
                completed,
                required,
            } => {
                context.insert("completed_chains".to_string(), serde_json::json!(completed));
                context.insert("required_chains".to_string(), serde_json::json!(required));
            }
            Error::UndefinedPrediction { count } => {
                context.insert("undefined_count".to_string(), serde_json::json!(count));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
