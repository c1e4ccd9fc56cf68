//! Parameter recovery on simulated surveys with known coefficients.
//!
//! Truth: male +1.0 on the logit scale, the 30-39 age group +0.5 above
//! the others, and no province differences.
//!
//! The slow coverage check is ignored by default:
//! `cargo test -p mrp-core --test calibration -- --ignored`

use mrp_common::categories::Cell;
use mrp_common::{AgeGroup, MrpConfig, Province, Sex};
use mrp_core::data::{Observation, ObservationTable, Stratum, StratumTable};
use mrp_core::model::layout::{INTERCEPT, MALE};
use mrp_core::model::ParameterLayout;
use mrp_core::{fit, run_pipeline, CancellationToken, FittedModel};
use mrp_math::{sigmoid, DrawSummary};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const BASELINE: f64 = -0.3;
const MALE_EFFECT: f64 = 1.0;
const ELEVATED_AGE: AgeGroup = AgeGroup::Age30To39;
const AGE_EFFECT: f64 = 0.5;

fn age_effect(age_group: AgeGroup) -> f64 {
    if age_group == ELEVATED_AGE {
        AGE_EFFECT
    } else {
        0.0
    }
}

fn true_probability(cell: Cell) -> f64 {
    sigmoid(BASELINE + MALE_EFFECT * cell.sex.male_indicator() + age_effect(cell.age_group))
}

fn simulate(n: usize, seed: u64) -> ObservationTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let cells: Vec<Cell> = Cell::all().collect();
    let rows = (0..n)
        .map(|i| {
            // Cycle through every cell first so no level goes unobserved.
            let cell = if i < cells.len() {
                cells[i]
            } else {
                cells[rng.random_range(0..cells.len())]
            };
            let owned = rng.random::<f64>() < true_probability(cell);
            Observation::new(owned, cell.sex, cell.age_group, cell.province)
        })
        .collect();
    ObservationTable::new(rows)
}

fn census() -> StratumTable {
    StratumTable::new(
        Cell::all()
            .map(|c| {
                let count = 500 + 250 * c.province.index() as u64 + 100 * c.age_group.index() as u64;
                Stratum::new(c.province, c.age_group, c.sex, count)
            })
            .collect(),
    )
    .unwrap()
}

fn population_truth(strata: &StratumTable) -> f64 {
    strata
        .iter()
        .map(|s| s.population_count as f64 * true_probability(s.cell()))
        .sum::<f64>()
        / strata.total_population() as f64
}

fn config(seed: u64) -> MrpConfig {
    let mut config = MrpConfig::default();
    config.sampler.chains = 2;
    config.sampler.warmup = 300;
    config.sampler.draws = 300;
    config.sampler.target_accept = 0.9;
    config.sampler.seed = seed;
    config.diagnostics.min_ess_per_chain = 0.0;
    config.predictive.draws = 50;
    config
}

fn covers(draws: &[f64], truth: f64) -> bool {
    let summary = DrawSummary::from_draws(draws);
    summary.q2_5 <= truth && truth <= summary.q97_5
}

/// Draws of the elevated age group's effect over the mean of the others.
///
/// Age effects share the intercept, so only contrasts are identified.
fn elevated_age_contrast(fitted: &FittedModel) -> Vec<f64> {
    let others: Vec<usize> = AgeGroup::all()
        .iter()
        .filter(|g| **g != ELEVATED_AGE)
        .map(|g| ParameterLayout::age_index(*g))
        .collect();
    fitted
        .draws()
        .map(|d| {
            let rest = others.iter().map(|&i| d[i]).sum::<f64>() / others.len() as f64;
            d[ParameterLayout::age_index(ELEVATED_AGE)] - rest
        })
        .collect()
}

#[test]
fn truth_matches_the_model_linear_predictor() {
    let layout = ParameterLayout::new(mrp_common::config::AgePooling::Fixed);
    let mut coefficients = vec![0.0; layout.dim()];
    coefficients[INTERCEPT] = BASELINE;
    coefficients[MALE] = MALE_EFFECT;
    coefficients[ParameterLayout::age_index(ELEVATED_AGE)] = AGE_EFFECT;
    for cell in Cell::all() {
        let eta = ParameterLayout::linear_predictor(&coefficients, cell);
        assert!((sigmoid(eta) - true_probability(cell)).abs() < 1e-12, "{}", cell);
    }
    let reference = Cell::new(Sex::Female, AgeGroup::Age21To29, Province::Alberta);
    assert_eq!(ParameterLayout::linear_predictor(&coefficients, reference), BASELINE);
}

#[test]
fn recovers_population_rate_and_sex_effect() {
    let strata = census();
    let truth = population_truth(&strata);
    let report = run_pipeline(
        &simulate(1000, 5),
        &strata,
        &config(5),
        &CancellationToken::new(),
    )
    .unwrap();

    let estimate = &report.estimate.estimate;
    assert!(
        (estimate.mean - truth).abs() < 0.06,
        "estimate {} vs truth {}",
        estimate.mean,
        truth
    );

    let male = report
        .coefficients
        .iter()
        .find(|row| row.parameter == "b_sex[Male]")
        .unwrap();
    assert!(
        (male.logit_mean - MALE_EFFECT).abs() < 0.4,
        "male effect {}",
        male.logit_mean
    );
    let age = mrp_math::mean(&elevated_age_contrast(&report.fitted));
    assert!((age - AGE_EFFECT).abs() < 0.5, "age contrast {}", age);
    assert!(report.diagnostics.max_psrf < 1.2);
}

#[test]
#[ignore = "slow: twenty full fits"]
fn intervals_cover_true_coefficients() {
    let trials = 20;
    let provinces: Vec<(Province, usize)> = Province::all()
        .iter()
        .filter_map(|p| ParameterLayout::province_index(*p).map(|i| (*p, i)))
        .collect();

    let mut effects_covered = 0;
    let mut provinces_covered = 0;
    for trial in 0..trials {
        let config = config(200 + trial);
        let fitted = fit(
            &simulate(1000, 100 + trial),
            &config.model,
            &config.sampler,
            &CancellationToken::new(),
        )
        .unwrap();

        if covers(&fitted.pooled(MALE), MALE_EFFECT) {
            effects_covered += 1;
        }
        if covers(&elevated_age_contrast(&fitted), AGE_EFFECT) {
            effects_covered += 1;
        }
        provinces_covered += provinces
            .iter()
            .filter(|(_, index)| covers(&fitted.pooled(*index), 0.0))
            .count();
    }

    let effect_checks = 2 * trials as usize;
    let province_checks = provinces.len() * trials as usize;
    assert!(
        effects_covered as f64 >= 0.9 * effect_checks as f64,
        "sex and age effects covered {} of {}",
        effects_covered,
        effect_checks
    );
    assert!(
        provinces_covered as f64 >= 0.9 * province_checks as f64,
        "province deltas covered {} of {}",
        provinces_covered,
        province_checks
    );
}
