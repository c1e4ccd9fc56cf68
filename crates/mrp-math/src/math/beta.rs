//! Regularized incomplete beta function and the quantiles built on it.
//!
//! The CDF uses a continued-fraction approximation (Numerical Recipes).
//! The F-distribution quantile used by the Gelman-Rubin upper bound is
//! expressed through the beta quantile.

use super::stable::log_beta;

const BETACF_MAX_ITERS: usize = 10_000;
const BETACF_EPS: f64 = 1.0e-12;
const BETACF_FPMIN: f64 = 1.0e-30;
const BISECTION_ITERS: usize = 200;
const BISECTION_TOL: f64 = 1e-12;

/// Regularized incomplete beta function I_x(a,b).
pub fn beta_cdf(x: f64, alpha: f64, beta: f64) -> f64 {
    if x.is_nan() || alpha.is_nan() || beta.is_nan() {
        return f64::NAN;
    }
    if alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_beta = log_beta(alpha, beta);
    let bt = (alpha * x.ln() + beta * (-x).ln_1p() - ln_beta).exp();
    let threshold = (alpha + 1.0) / (alpha + beta + 2.0);
    if x < threshold {
        bt * betacf(alpha, beta, x) / alpha
    } else {
        1.0 - bt * betacf(beta, alpha, 1.0 - x) / beta
    }
}

/// Inverse CDF (quantile) for Beta(alpha, beta), by bisection.
pub fn beta_inv_cdf(p: f64, alpha: f64, beta: f64) -> f64 {
    if p.is_nan() || alpha.is_nan() || beta.is_nan() {
        return f64::NAN;
    }
    if alpha <= 0.0 || beta <= 0.0 {
        return f64::NAN;
    }
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return 1.0;
    }

    let mut low = 0.0;
    let mut high = 1.0;
    let mut mid = 0.5;
    for _ in 0..BISECTION_ITERS {
        mid = 0.5 * (low + high);
        let cdf = beta_cdf(mid, alpha, beta);
        if cdf.is_nan() {
            return f64::NAN;
        }
        let delta = cdf - p;
        if delta.abs() < BISECTION_TOL || (high - low) < f64::EPSILON {
            return mid;
        }
        if delta < 0.0 {
            low = mid;
        } else {
            high = mid;
        }
    }
    mid
}

/// CDF of the F(d1, d2) distribution.
pub fn f_cdf(x: f64, d1: f64, d2: f64) -> f64 {
    if x.is_nan() || d1.is_nan() || d2.is_nan() || d1 <= 0.0 || d2 <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    if x.is_infinite() {
        return 1.0;
    }
    beta_cdf(d1 * x / (d1 * x + d2), d1 / 2.0, d2 / 2.0)
}

/// Quantile of the F(d1, d2) distribution.
///
/// If `X ~ Beta(d1/2, d2/2)` then `d2 X / (d1 (1 - X)) ~ F(d1, d2)`.
pub fn f_inv_cdf(p: f64, d1: f64, d2: f64) -> f64 {
    if p.is_nan() || d1.is_nan() || d2.is_nan() || d1 <= 0.0 || d2 <= 0.0 {
        return f64::NAN;
    }
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let x = beta_inv_cdf(p, d1 / 2.0, d2 / 2.0);
    if x >= 1.0 {
        return f64::INFINITY;
    }
    d2 * x / (d1 * (1.0 - x))
}

fn betacf(alpha: f64, beta: f64, x: f64) -> f64 {
    let qab = alpha + beta;
    let qap = alpha + 1.0;
    let qam = alpha - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < BETACF_FPMIN {
        d = BETACF_FPMIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=BETACF_MAX_ITERS {
        let m_f = m as f64;
        let m2 = 2.0 * m_f;
        let aa = m_f * (beta - m_f) * x / ((qam + m2) * (alpha + m2));
        d = 1.0 + aa * d;
        if d.abs() < BETACF_FPMIN {
            d = BETACF_FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < BETACF_FPMIN {
            c = BETACF_FPMIN;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(alpha + m_f) * (qab + m_f) * x / ((alpha + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < BETACF_FPMIN {
            d = BETACF_FPMIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < BETACF_FPMIN {
            c = BETACF_FPMIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < BETACF_EPS {
            break;
        }
    }

    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    #[test]
    fn cdf_uniform_matches_identity() {
        assert!(approx_eq(beta_cdf(0.42, 1.0, 1.0), 0.42, 1e-9));
    }

    #[test]
    fn cdf_monotone() {
        assert!(beta_cdf(0.2, 2.0, 5.0) < beta_cdf(0.7, 2.0, 5.0));
    }

    #[test]
    fn cdf_known_value_beta_2_5() {
        // I_0.2(2, 5) = 1 - 0.8^6 - 6 * 0.2 * 0.8^5
        let expected = 1.0 - 0.8f64.powi(6) - 6.0 * 0.2 * 0.8f64.powi(5);
        assert!(approx_eq(beta_cdf(0.2, 2.0, 5.0), expected, 1e-9));
    }

    #[test]
    fn inv_cdf_inverts_cdf() {
        let x = beta_inv_cdf(0.25, 2.0, 5.0);
        assert!(approx_eq(beta_cdf(x, 2.0, 5.0), 0.25, 1e-8));
    }

    #[test]
    fn f_quantile_known_values() {
        // qf(0.975, 1, 10) = 6.936728
        assert!(approx_eq(f_inv_cdf(0.975, 1.0, 10.0), 6.936_728, 1e-4));
        // qf(0.5, 4, 4) = 1
        assert!(approx_eq(f_inv_cdf(0.5, 4.0, 4.0), 1.0, 1e-6));
    }

    #[test]
    fn f_cdf_inverts_quantile() {
        let q = f_inv_cdf(0.9, 3.0, 17.0);
        assert!(approx_eq(f_cdf(q, 3.0, 17.0), 0.9, 1e-8));
    }

    #[test]
    fn f_inv_cdf_edges() {
        assert_eq!(f_inv_cdf(0.0, 2.0, 3.0), 0.0);
        assert_eq!(f_inv_cdf(1.0, 2.0, 3.0), f64::INFINITY);
        assert!(f_inv_cdf(0.5, -1.0, 3.0).is_nan());
    }
}
