//! Log densities and their derivatives for the model's priors and likelihood.
//!
//! Every `*_with_grad` function returns `(log_density, d/dx log_density)` so
//! gradient-based samplers can accumulate both in one pass.

use std::f64::consts::{LN_2, PI};

use super::stable::{log_gamma, sigmoid, softplus};

const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Log density of Normal(mu, sd) at x.
pub fn normal_log_pdf(x: f64, mu: f64, sd: f64) -> f64 {
    normal_log_pdf_with_grad(x, mu, sd).0
}

/// Normal log density and its derivative with respect to x.
pub fn normal_log_pdf_with_grad(x: f64, mu: f64, sd: f64) -> (f64, f64) {
    if x.is_nan() || mu.is_nan() || sd.is_nan() || sd <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let z = (x - mu) / sd;
    (-0.5 * z * z - sd.ln() - LOG_SQRT_2PI, -z / sd)
}

/// Log density of the location-scale Student-t(df, mu, scale) at x.
pub fn student_t_log_pdf(x: f64, df: f64, mu: f64, scale: f64) -> f64 {
    student_t_log_pdf_with_grad(x, df, mu, scale).0
}

/// Student-t log density and its derivative with respect to x.
pub fn student_t_log_pdf_with_grad(x: f64, df: f64, mu: f64, scale: f64) -> (f64, f64) {
    if x.is_nan() || df.is_nan() || mu.is_nan() || scale.is_nan() || df <= 0.0 || scale <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let z = (x - mu) / scale;
    let log_norm = log_gamma(0.5 * (df + 1.0))
        - log_gamma(0.5 * df)
        - 0.5 * (df * PI).ln()
        - scale.ln();
    let lp = log_norm - 0.5 * (df + 1.0) * (z * z / df).ln_1p();
    let grad = -(df + 1.0) * z / (scale * (df + z * z));
    (lp, grad)
}

/// Half-Student-t density folded at `mu`; zero below `mu`.
pub fn half_student_t_log_pdf_with_grad(x: f64, df: f64, mu: f64, scale: f64) -> (f64, f64) {
    if x < mu {
        return (f64::NEG_INFINITY, 0.0);
    }
    let (lp, grad) = student_t_log_pdf_with_grad(x, df, mu, scale);
    (lp + LN_2, grad)
}

/// Binomial log-likelihood (without the combinatorial constant) of `k`
/// successes in `n` trials at logit `eta`, with its derivative in `eta`.
///
/// `k * eta - n * log(1 + e^eta)` is exact for any finite `eta`.
pub fn binomial_logit_log_lik_with_grad(k: f64, n: f64, eta: f64) -> (f64, f64) {
    if eta.is_nan() {
        return (f64::NAN, f64::NAN);
    }
    (k * eta - n * softplus(eta), k - n * sigmoid(eta))
}
