//! Warmup adaptation: dual-averaging step size and windowed diagonal metric.
//!
//! Warmup is split into an initial fast buffer (step size only), a run of
//! doubling slow windows (metric estimated from draws) and a final fast
//! buffer. Each slow window ends with a fresh metric and a restarted step
//! size search.

const INIT_BUFFER: usize = 75;
const TERM_BUFFER: usize = 50;
const BASE_WINDOW: usize = 25;

/// Nesterov dual averaging of `log(step_size)` towards a target acceptance statistic.
#[derive(Debug, Clone)]
pub struct DualAveraging {
    target: f64,
    mu: f64,
    counter: f64,
    h_bar: f64,
    log_eps: f64,
    log_eps_bar: f64,
}

impl DualAveraging {
    const GAMMA: f64 = 0.05;
    const T0: f64 = 10.0;
    const KAPPA: f64 = 0.75;

    pub fn new(step_size: f64, target: f64) -> Self {
        let mut da = DualAveraging {
            target,
            mu: 0.0,
            counter: 0.0,
            h_bar: 0.0,
            log_eps: 0.0,
            log_eps_bar: 0.0,
        };
        da.restart(step_size);
        da
    }

    /// Reset the averages and shrink towards `10 * step_size`.
    pub fn restart(&mut self, step_size: f64) {
        self.mu = (10.0 * step_size).ln();
        self.counter = 0.0;
        self.h_bar = 0.0;
        self.log_eps = step_size.ln();
        self.log_eps_bar = 0.0;
    }

    /// Feed one acceptance statistic; returns the next step size.
    pub fn update(&mut self, accept_stat: f64) -> f64 {
        let accept = if accept_stat.is_finite() {
            accept_stat.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.counter += 1.0;
        let eta = 1.0 / (self.counter + Self::T0);
        self.h_bar = (1.0 - eta) * self.h_bar + eta * (self.target - accept);
        self.log_eps = self.mu - self.counter.sqrt() / Self::GAMMA * self.h_bar;
        let weight = self.counter.powf(-Self::KAPPA);
        self.log_eps_bar = weight * self.log_eps + (1.0 - weight) * self.log_eps_bar;
        self.log_eps.exp()
    }

    pub fn step_size(&self) -> f64 {
        self.log_eps.exp()
    }

    /// Averaged step size used after warmup.
    pub fn final_step_size(&self) -> f64 {
        if self.counter > 0.0 {
            self.log_eps_bar.exp()
        } else {
            self.step_size()
        }
    }
}

/// Streaming per-coordinate variance.
#[derive(Debug, Clone)]
struct Welford {
    n: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl Welford {
    fn new(dim: usize) -> Self {
        Welford {
            n: 0,
            mean: vec![0.0; dim],
            m2: vec![0.0; dim],
        }
    }

    fn add(&mut self, q: &[f64]) {
        self.n += 1;
        let n = self.n as f64;
        for i in 0..q.len() {
            let delta = q[i] - self.mean[i];
            self.mean[i] += delta / n;
            self.m2[i] += delta * (q[i] - self.mean[i]);
        }
    }

    /// Sample variance shrunk towards `1e-3`.
    fn regularized_variance(&self) -> Vec<f64> {
        let n = self.n as f64;
        self.m2
            .iter()
            .map(|m2| {
                let var = if self.n > 1 { m2 / (n - 1.0) } else { 0.0 };
                (n / (n + 5.0)) * var + 1e-3 * (5.0 / (n + 5.0))
            })
            .collect()
    }

    fn reset(&mut self) {
        self.n = 0;
        self.mean.iter_mut().for_each(|v| *v = 0.0);
        self.m2.iter_mut().for_each(|v| *v = 0.0);
    }
}

/// Diagonal inverse metric learned over doubling windows.
#[derive(Debug, Clone)]
pub struct MetricAdaptation {
    n_warmup: usize,
    init_buffer: usize,
    term_buffer: usize,
    window_size: usize,
    next_window_end: usize,
    counter: usize,
    enabled: bool,
    estimator: Welford,
    inv_mass: Vec<f64>,
}

impl MetricAdaptation {
    pub fn new(dim: usize, n_warmup: usize) -> Self {
        let (init_buffer, term_buffer, base_window) =
            if INIT_BUFFER + TERM_BUFFER + BASE_WINDOW > n_warmup {
                let init = (0.15 * n_warmup as f64) as usize;
                let term = (0.1 * n_warmup as f64) as usize;
                (init, term, n_warmup.saturating_sub(init + term))
            } else {
                (INIT_BUFFER, TERM_BUFFER, BASE_WINDOW)
            };
        MetricAdaptation {
            n_warmup,
            init_buffer,
            term_buffer,
            window_size: base_window,
            next_window_end: (init_buffer + base_window).saturating_sub(1),
            counter: 0,
            enabled: n_warmup >= 20 && base_window > 0,
            estimator: Welford::new(dim),
            inv_mass: vec![1.0; dim],
        }
    }

    pub fn inv_mass(&self) -> &[f64] {
        &self.inv_mass
    }

    fn last_window_end(&self) -> usize {
        self.n_warmup - self.term_buffer - 1
    }

    fn in_slow_window(&self) -> bool {
        self.counter >= self.init_buffer
            && self.counter < self.n_warmup - self.term_buffer
            && self.counter != self.n_warmup
    }

    fn at_window_end(&self) -> bool {
        self.counter == self.next_window_end && self.counter != self.n_warmup
    }

    fn advance_window(&mut self) {
        if self.next_window_end == self.last_window_end() {
            return;
        }
        self.window_size *= 2;
        self.next_window_end = self.counter + self.window_size;
        if self.next_window_end != self.last_window_end()
            && self.next_window_end + 2 * self.window_size >= self.last_window_end()
        {
            self.next_window_end = self.last_window_end();
        }
    }

    /// Record the warmup draw `q`. Returns true when a window closed and
    /// the metric changed.
    pub fn observe(&mut self, q: &[f64]) -> bool {
        if !self.enabled {
            return false;
        }
        if self.in_slow_window() {
            self.estimator.add(q);
        }
        if self.at_window_end() {
            self.advance_window();
            self.inv_mass = self.estimator.regularized_variance();
            self.estimator.reset();
            self.counter += 1;
            return true;
        }
        self.counter += 1;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dual_averaging_shrinks_on_low_acceptance() {
        let mut da = DualAveraging::new(1.0, 0.8);
        for _ in 0..50 {
            da.update(0.1);
        }
        assert!(da.final_step_size() < 1.0);

        let mut da = DualAveraging::new(0.01, 0.8);
        for _ in 0..50 {
            da.update(1.0);
        }
        assert!(da.final_step_size() > 0.01);
    }

    #[test]
    fn dual_averaging_ignores_nan() {
        let mut da = DualAveraging::new(0.5, 0.9);
        let eps = da.update(f64::NAN);
        assert!(eps.is_finite() && eps > 0.0);
    }

    #[test]
    fn welford_matches_two_pass() {
        let mut w = Welford::new(1);
        let xs = [1.0, 2.0, 4.0, 7.0];
        for x in xs {
            w.add(&[x]);
        }
        let n = xs.len() as f64;
        let var = mrp_math::sample_variance(&xs);
        let expected = (n / (n + 5.0)) * var + 1e-3 * (5.0 / (n + 5.0));
        assert!((w.regularized_variance()[0] - expected).abs() < 1e-12);
    }

    fn window_ends(n_warmup: usize) -> Vec<usize> {
        let mut metric = MetricAdaptation::new(1, n_warmup);
        (0..n_warmup)
            .filter(|&i| metric.observe(&[i as f64]))
            .collect()
    }

    #[test]
    fn standard_schedule_for_default_warmup() {
        assert_eq!(window_ends(1000), vec![99, 149, 249, 449, 949]);
    }

    #[test]
    fn short_warmup_uses_proportional_buffers() {
        // init 15, term 10, one window of 75
        assert_eq!(window_ends(100), vec![89]);
    }

    #[test]
    fn metric_tracks_draw_scale() {
        let mut metric = MetricAdaptation::new(2, 1000);
        let mut state = 0.0_f64;
        for i in 0..1000 {
            state = (state + 0.7).rem_euclid(10.0);
            let a = if i % 2 == 0 { state } else { -state };
            metric.observe(&[a * 3.0, a * 0.1]);
        }
        let inv = metric.inv_mass();
        assert!(inv[0] > inv[1] * 100.0);
    }
}
