//! Non-fatal findings collected across a run.
//!
//! Warnings never stop the pipeline; they are carried on the report and
//! each one is logged once when it is raised.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    DivergentTransitions {
        chain: usize,
        count: usize,
    },
    MaxTreedepthSaturated {
        chain: usize,
        count: usize,
    },
    ChainCancelled {
        chain: usize,
        completed_iterations: usize,
    },
    NonConvergence {
        parameter: String,
        psrf: f64,
        split_rhat: f64,
    },
    LowEffectiveSampleSize {
        parameter: String,
        ess: f64,
        threshold: f64,
    },
    UndefinedPredictionsImputed {
        matrix: String,
        count: usize,
    },
    PosteriorPredictiveCheckFailed {
        statistic: String,
        p_value: f64,
    },
}

impl Warning {
    /// Whether the warning casts doubt on the posterior itself.
    pub fn affects_reliability(&self) -> bool {
        matches!(
            self,
            Warning::DivergentTransitions { .. }
                | Warning::ChainCancelled { .. }
                | Warning::NonConvergence { .. }
                | Warning::LowEffectiveSampleSize { .. }
        )
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::DivergentTransitions { chain, count } => {
                write!(f, "chain {}: {} divergent transitions after warmup", chain, count)
            }
            Warning::MaxTreedepthSaturated { chain, count } => {
                write!(f, "chain {}: {} draws hit the maximum tree depth", chain, count)
            }
            Warning::ChainCancelled {
                chain,
                completed_iterations,
            } => write!(
                f,
                "chain {} cancelled after {} iterations",
                chain, completed_iterations
            ),
            Warning::NonConvergence {
                parameter,
                psrf,
                split_rhat,
            } => write!(
                f,
                "{} has not converged (psrf {:.3}, split R-hat {:.3})",
                parameter, psrf, split_rhat
            ),
            Warning::LowEffectiveSampleSize {
                parameter,
                ess,
                threshold,
            } => write!(
                f,
                "{} has effective sample size {:.0} (below {:.0})",
                parameter, ess, threshold
            ),
            Warning::UndefinedPredictionsImputed { matrix, count } => {
                write!(f, "{}: {} undefined predictions imputed", matrix, count)
            }
            Warning::PosteriorPredictiveCheckFailed { statistic, p_value } => write!(
                f,
                "posterior predictive check failed for {} (p = {:.4})",
                statistic, p_value
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let w = Warning::DivergentTransitions { chain: 1, count: 3 };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "divergent_transitions");
        assert_eq!(json["count"], 3);
    }

    #[test]
    fn reliability_classification() {
        assert!(Warning::NonConvergence {
            parameter: "b_Intercept".into(),
            psrf: 1.2,
            split_rhat: 1.3
        }
        .affects_reliability());
        assert!(Warning::ChainCancelled {
            chain: 0,
            completed_iterations: 10
        }
        .affects_reliability());
        assert!(!Warning::MaxTreedepthSaturated { chain: 0, count: 2 }.affects_reliability());
        assert!(!Warning::UndefinedPredictionsImputed {
            matrix: "population".into(),
            count: 1
        }
        .affects_reliability());
    }

    #[test]
    fn display_is_readable() {
        let w = Warning::UndefinedPredictionsImputed {
            matrix: "population".into(),
            count: 4,
        };
        assert_eq!(w.to_string(), "population: 4 undefined predictions imputed");
    }
}
