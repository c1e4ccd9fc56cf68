//! Multi-chain NUTS sampling.
//!
//! Chains run on scoped threads, one per chain, each with its own RNG
//! seeded from the top-level seed. Every chain adapts its own step size
//! and diagonal metric during warmup and then records `draws` samples.

mod adapt;
mod cancel;
mod nuts;

pub use adapt::{DualAveraging, MetricAdaptation};
pub use cancel::CancellationToken;
pub use mrp_common::config::SamplerSettings as SamplerConfig;
pub use nuts::DIVERGENCE_THRESHOLD;

use std::thread;
use std::time::{Duration, Instant};

use mrp_common::config::MIN_CHAINS;
use mrp_common::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::logging::event_names;
use crate::warnings::Warning;
use nuts::{find_reasonable_step_size, Integrator, Point};

/// Unnormalised log posterior on an unconstrained space.
pub trait LogDensity: Sync {
    fn dim(&self) -> usize;

    /// Log density at `q`, writing its gradient into `grad`.
    ///
    /// Returns `-inf` where the density is zero or cannot be evaluated.
    fn log_density_and_gradient(&self, q: &[f64], grad: &mut [f64]) -> f64;

    /// Map an unconstrained position to the reported parameter values.
    fn constrain(&self, q: &[f64]) -> Vec<f64>;
}

/// Per-draw sampler statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrawStats {
    pub accept_stat: f64,
    pub tree_depth: usize,
    pub n_leapfrog: usize,
    pub divergent: bool,
    pub energy: f64,
}

/// A chain that finished all of its iterations.
#[derive(Debug, Clone, Serialize)]
pub struct ChainOutput {
    pub chain: usize,
    pub seed: u64,
    /// Constrained draws, one row per retained iteration.
    #[serde(skip)]
    pub draws: Vec<Vec<f64>>,
    #[serde(skip)]
    pub stats: Vec<DrawStats>,
    pub step_size: f64,
    pub inv_mass: Vec<f64>,
}

impl ChainOutput {
    pub fn divergent_count(&self) -> usize {
        self.stats.iter().filter(|s| s.divergent).count()
    }

    pub fn saturated_count(&self, max_treedepth: usize) -> usize {
        self.stats
            .iter()
            .filter(|s| s.tree_depth >= max_treedepth)
            .count()
    }

    pub fn mean_accept_stat(&self) -> f64 {
        mrp_math::mean(&self.stats.iter().map(|s| s.accept_stat).collect::<Vec<_>>())
    }
}

/// A chain stopped by cancellation before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CancelledChain {
    pub chain: usize,
    pub completed_iterations: usize,
}

/// Completed chains plus everything that went wrong along the way.
#[derive(Debug, Clone, Serialize)]
pub struct SamplerOutput {
    pub chains: Vec<ChainOutput>,
    pub cancelled: Vec<CancelledChain>,
    pub warnings: Vec<Warning>,
    pub elapsed_ms: u64,
}

enum ChainResult {
    Completed(ChainOutput),
    Cancelled(CancelledChain),
}

/// Seed of chain `chain` derived from the run seed (SplitMix64 finaliser).
pub fn chain_seed(seed: u64, chain: usize) -> u64 {
    let mut z = seed.wrapping_add((chain as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Run `config.chains` chains on `model`.
///
/// Chains stopped by `cancel` (or the configured timeout), whether all at
/// once or one at a time through [`CancellationToken::cancel_chain`], are
/// reported in [`SamplerOutput::cancelled`] and their draws are dropped.
/// Fewer than two completed chains is an error.
pub fn sample<M: LogDensity>(
    model: &M,
    config: &SamplerConfig,
    cancel: &CancellationToken,
) -> Result<SamplerOutput> {
    config.validate()?;
    let started = Instant::now();
    let cancel = match config.timeout_secs {
        Some(secs) => cancel.with_timeout(Duration::from_secs(secs)),
        None => cancel.clone(),
    };

    info!(
        target: event_names::FIT_SAMPLING_STARTED,
        chains = config.chains,
        warmup = config.warmup,
        draws = config.draws,
        dim = model.dim(),
        seed = config.seed,
        "sampling started"
    );

    let results: Vec<Result<ChainResult>> = thread::scope(|s| {
        let handles: Vec<_> = (0..config.chains)
            .map(|chain| {
                let cancel = &cancel;
                s.spawn(move || run_chain(model, config, chain, cancel))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join().unwrap_or_else(|_| {
                    error!("sampler chain thread panicked");
                    Err(Error::NumericalInstability(
                        "sampler chain thread panicked".to_string(),
                    ))
                })
            })
            .collect()
    });

    let mut chains = Vec::new();
    let mut cancelled = Vec::new();
    for result in results {
        match result? {
            ChainResult::Completed(output) => chains.push(output),
            ChainResult::Cancelled(c) => cancelled.push(c),
        }
    }

    let mut warnings = Vec::new();
    for c in &cancelled {
        warnings.push(Warning::ChainCancelled {
            chain: c.chain,
            completed_iterations: c.completed_iterations,
        });
    }
    for output in &chains {
        let divergent = output.divergent_count();
        if divergent > 0 {
            warn!(
                target: event_names::FIT_DIVERGENCES,
                chain = output.chain,
                count = divergent,
                "divergent transitions after warmup"
            );
            warnings.push(Warning::DivergentTransitions {
                chain: output.chain,
                count: divergent,
            });
        }
        let saturated = output.saturated_count(config.max_treedepth);
        if saturated > 0 {
            warnings.push(Warning::MaxTreedepthSaturated {
                chain: output.chain,
                count: saturated,
            });
        }
    }

    if chains.len() < MIN_CHAINS {
        warn!(
            target: event_names::FIT_SAMPLING_CANCELLED,
            completed = chains.len(),
            required = MIN_CHAINS,
            "too few chains completed"
        );
        return Err(Error::Cancelled {
            completed: chains.len(),
            required: MIN_CHAINS,
        });
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        target: event_names::FIT_SAMPLING_FINISHED,
        completed = chains.len(),
        cancelled = cancelled.len(),
        elapsed_ms,
        "sampling finished"
    );
    Ok(SamplerOutput {
        chains,
        cancelled,
        warnings,
        elapsed_ms,
    })
}

/// Draw initial values uniformly in `(-init_radius, init_radius)` until the
/// density and gradient are finite.
fn initialize<M: LogDensity>(
    model: &M,
    config: &SamplerConfig,
    chain: usize,
    rng: &mut StdRng,
) -> Result<Point> {
    let r = config.init_radius;
    for attempt in 1..=config.max_init_attempts {
        let q: Vec<f64> = (0..model.dim()).map(|_| rng.random_range(-r..r)).collect();
        let point = Point::new(model, q);
        if point.is_valid() {
            debug!(chain, attempt, logp = point.logp, "chain initialised");
            return Ok(point);
        }
    }
    Err(Error::SamplerInitializationFailure {
        chain,
        attempts: config.max_init_attempts,
    })
}

fn run_chain<M: LogDensity>(
    model: &M,
    config: &SamplerConfig,
    chain: usize,
    cancel: &CancellationToken,
) -> Result<ChainResult> {
    let seed = chain_seed(config.seed, chain);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut point = initialize(model, config, chain, &mut rng)?;
    info!(target: event_names::FIT_CHAIN_STARTED, chain, seed, "chain started");

    let mut metric = MetricAdaptation::new(model.dim(), config.warmup);
    let mut step_size =
        find_reasonable_step_size(model, &point, metric.inv_mass(), 1.0, &mut rng);
    let mut dual = DualAveraging::new(step_size, config.target_accept);

    for iteration in 0..config.warmup {
        if cancel.is_chain_cancelled(chain) {
            return Ok(cancelled(chain, iteration));
        }
        let transition = Integrator::new(model, metric.inv_mass(), step_size).transition(
            &point,
            config.max_treedepth,
            &mut rng,
        );
        point = transition.point;
        step_size = dual.update(transition.accept_stat);
        if metric.observe(&point.q) {
            step_size = find_reasonable_step_size(
                model,
                &point,
                metric.inv_mass(),
                step_size,
                &mut rng,
            );
            dual.restart(step_size);
            debug!(chain, iteration, step_size, "metric window closed");
        }
    }
    let step_size = dual.final_step_size();
    let inv_mass = metric.inv_mass().to_vec();
    debug!(chain, step_size, "warmup finished");

    let integrator = Integrator::new(model, &inv_mass, step_size);
    let mut draws = Vec::with_capacity(config.draws);
    let mut stats = Vec::with_capacity(config.draws);
    for iteration in 0..config.draws {
        if cancel.is_chain_cancelled(chain) {
            return Ok(cancelled(chain, config.warmup + iteration));
        }
        let transition = integrator.transition(&point, config.max_treedepth, &mut rng);
        stats.push(DrawStats {
            accept_stat: transition.accept_stat,
            tree_depth: transition.tree_depth,
            n_leapfrog: transition.n_leapfrog,
            divergent: transition.divergent,
            energy: transition.energy,
        });
        point = transition.point;
        draws.push(model.constrain(&point.q));
    }

    let output = ChainOutput {
        chain,
        seed,
        draws,
        stats,
        step_size,
        inv_mass,
    };
    info!(
        target: event_names::FIT_CHAIN_FINISHED,
        chain,
        step_size,
        divergent = output.divergent_count(),
        mean_accept = output.mean_accept_stat(),
        "chain finished"
    );
    Ok(ChainResult::Completed(output))
}

fn cancelled(chain: usize, completed_iterations: usize) -> ChainResult {
    warn!(
        target: event_names::FIT_CHAIN_CANCELLED,
        chain,
        completed_iterations,
        "chain cancelled"
    );
    ChainResult::Cancelled(CancelledChain {
        chain,
        completed_iterations,
    })
}
