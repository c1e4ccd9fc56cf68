//! Dwelling-tenure MRP core library.
//!
//! Estimates the share of Canadians who own their dwelling from a
//! non-representative survey:
//! - typed survey and census tables ([`data`])
//! - a Bayesian logistic model with a partially pooled age effect ([`model`])
//! - a multi-chain NUTS sampler ([`sampler`]) and convergence diagnostics
//! - posterior prediction, predictive checks and post-stratification
//!
//! The binary entry point is in `main.rs`.

pub mod coefficients;
pub mod data;
pub mod diagnostics;
pub mod exit_codes;
pub mod fit;
pub mod logging;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod poststrat;
pub mod ppc;
pub mod predictive;
pub mod sampler;
pub mod warnings;

pub use fit::{fit, FittedModel};
pub use pipeline::{run_pipeline, MrpReport, Pipeline};
pub use sampler::CancellationToken;
pub use warnings::Warning;
