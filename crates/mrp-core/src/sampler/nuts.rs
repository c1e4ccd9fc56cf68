//! No-U-Turn sampler with multinomial trajectory sampling.
//!
//! Trees double in a random direction until the trajectory turns back on
//! itself, a leapfrog step diverges, or the maximum depth is reached. The
//! next state is drawn from the trajectory with weights `exp(-H)`; the
//! top-level merge is biased towards the newest subtree.

use mrp_math::log_add_exp;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use super::LogDensity;

/// Energy error above which a trajectory is declared divergent.
pub const DIVERGENCE_THRESHOLD: f64 = 1000.0;

/// Position with its log density and gradient.
#[derive(Debug, Clone)]
pub(crate) struct Point {
    pub q: Vec<f64>,
    pub logp: f64,
    pub grad: Vec<f64>,
}

impl Point {
    pub fn new<M: LogDensity + ?Sized>(model: &M, q: Vec<f64>) -> Self {
        let mut grad = vec![0.0; q.len()];
        let logp = model.log_density_and_gradient(&q, &mut grad);
        Point { q, logp, grad }
    }

    pub fn is_valid(&self) -> bool {
        self.logp.is_finite() && self.grad.iter().all(|g| g.is_finite())
    }
}

/// Phase-space state.
#[derive(Debug, Clone)]
struct State {
    point: Point,
    p: Vec<f64>,
}

impl State {
    fn hamiltonian(&self, inv_mass: &[f64]) -> f64 {
        let kinetic: f64 = self
            .p
            .iter()
            .zip(inv_mass)
            .map(|(p, m)| p * p * m)
            .sum::<f64>()
            * 0.5;
        let h = -self.point.logp + kinetic;
        if h.is_nan() {
            f64::INFINITY
        } else {
            h
        }
    }
}

/// Euclidean-metric leapfrog integrator.
pub(crate) struct Integrator<'a, M: ?Sized> {
    model: &'a M,
    inv_mass: &'a [f64],
    step_size: f64,
}

impl<'a, M: LogDensity + ?Sized> Integrator<'a, M> {
    pub fn new(model: &'a M, inv_mass: &'a [f64], step_size: f64) -> Self {
        Integrator {
            model,
            inv_mass,
            step_size,
        }
    }

    fn leapfrog(&self, state: &State, direction: f64) -> State {
        let eps = direction * self.step_size;
        let mut p: Vec<f64> = state
            .p
            .iter()
            .zip(&state.point.grad)
            .map(|(p, g)| p + 0.5 * eps * g)
            .collect();
        let q: Vec<f64> = state
            .point
            .q
            .iter()
            .zip(p.iter().zip(self.inv_mass))
            .map(|(q, (p, m))| q + eps * m * p)
            .collect();
        let point = Point::new(self.model, q);
        for (p, g) in p.iter_mut().zip(&point.grad) {
            *p += 0.5 * eps * g;
        }
        State { point, p }
    }

    fn sample_momentum<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        self.inv_mass
            .iter()
            .map(|m| {
                let z: f64 = StandardNormal.sample(rng);
                z / m.sqrt()
            })
            .collect()
    }

    fn is_turning(&self, left: &State, right: &State) -> bool {
        let mut dot_left = 0.0;
        let mut dot_right = 0.0;
        for i in 0..left.p.len() {
            let dq = right.point.q[i] - left.point.q[i];
            dot_left += dq * self.inv_mass[i] * left.p[i];
            dot_right += dq * self.inv_mass[i] * right.p[i];
        }
        dot_left < 0.0 || dot_right < 0.0
    }
}

/// Outcome of one NUTS transition.
#[derive(Debug, Clone)]
pub(crate) struct Transition {
    pub point: Point,
    pub accept_stat: f64,
    pub tree_depth: usize,
    pub n_leapfrog: usize,
    pub divergent: bool,
    pub energy: f64,
}

struct Subtree {
    left: State,
    right: State,
    proposal: Point,
    log_sum_weight: f64,
    n_leapfrog: usize,
    sum_accept: f64,
    divergent: bool,
    turning: bool,
}

impl Subtree {
    fn is_valid(&self) -> bool {
        !(self.divergent || self.turning)
    }

    fn edge(&self, direction: f64) -> &State {
        if direction > 0.0 {
            &self.right
        } else {
            &self.left
        }
    }
}

impl<M: LogDensity + ?Sized> Integrator<'_, M> {
    fn build_leaf(&self, edge: &State, direction: f64, h0: f64) -> Subtree {
        let next = self.leapfrog(edge, direction);
        let h = next.hamiltonian(self.inv_mass);
        let energy_error = h - h0;
        let divergent = !h.is_finite() || energy_error > DIVERGENCE_THRESHOLD;
        let accept = if energy_error.is_nan() {
            0.0
        } else {
            (-energy_error).exp().min(1.0)
        };
        Subtree {
            proposal: next.point.clone(),
            left: next.clone(),
            right: next,
            log_sum_weight: -energy_error,
            n_leapfrog: 1,
            sum_accept: accept,
            divergent,
            turning: false,
        }
    }

    fn build_tree<R: Rng>(
        &self,
        edge: &State,
        depth: usize,
        direction: f64,
        h0: f64,
        rng: &mut R,
    ) -> Subtree {
        if depth == 0 {
            return self.build_leaf(edge, direction, h0);
        }

        let mut tree = self.build_tree(edge, depth - 1, direction, h0, rng);
        if !tree.is_valid() {
            return tree;
        }

        let outer = self.build_tree(tree.edge(direction), depth - 1, direction, h0, rng);
        tree.n_leapfrog += outer.n_leapfrog;
        tree.sum_accept += outer.sum_accept;
        if !outer.is_valid() {
            tree.divergent |= outer.divergent;
            tree.turning |= outer.turning;
            return tree;
        }

        let combined = log_add_exp(tree.log_sum_weight, outer.log_sum_weight);
        if rng.random::<f64>() < (outer.log_sum_weight - combined).exp() {
            tree.proposal = outer.proposal;
        }
        tree.log_sum_weight = combined;
        if direction > 0.0 {
            tree.right = outer.right;
        } else {
            tree.left = outer.left;
        }
        tree.turning = self.is_turning(&tree.left, &tree.right);
        tree
    }

    /// One transition from `current`.
    pub fn transition<R: Rng>(
        &self,
        current: &Point,
        max_treedepth: usize,
        rng: &mut R,
    ) -> Transition {
        let start = State {
            point: current.clone(),
            p: self.sample_momentum(rng),
        };
        let h0 = start.hamiltonian(self.inv_mass);

        let mut left = start.clone();
        let mut right = start;
        let mut sample = current.clone();
        let mut log_sum_weight = 0.0;
        let mut n_leapfrog = 0;
        let mut sum_accept = 0.0;
        let mut divergent = false;
        let mut depth = 0;

        while depth < max_treedepth {
            let direction = if rng.random::<bool>() { 1.0 } else { -1.0 };
            let edge = if direction > 0.0 { &right } else { &left };
            let subtree = self.build_tree(edge, depth, direction, h0, rng);
            depth += 1;
            n_leapfrog += subtree.n_leapfrog;
            sum_accept += subtree.sum_accept;

            if subtree.divergent {
                divergent = true;
                break;
            }
            if subtree.turning {
                break;
            }

            if subtree.log_sum_weight > log_sum_weight
                || rng.random::<f64>() < (subtree.log_sum_weight - log_sum_weight).exp()
            {
                sample = subtree.proposal;
            }
            log_sum_weight = log_add_exp(log_sum_weight, subtree.log_sum_weight);
            if direction > 0.0 {
                right = subtree.right;
            } else {
                left = subtree.left;
            }

            if self.is_turning(&left, &right) {
                break;
            }
        }

        Transition {
            point: sample,
            accept_stat: if n_leapfrog > 0 {
                sum_accept / n_leapfrog as f64
            } else {
                0.0
            },
            tree_depth: depth,
            n_leapfrog,
            divergent,
            energy: h0,
        }
    }
}

/// Heuristic initial step size: double or halve `step_size` until a single
/// leapfrog step from `point` crosses an acceptance probability of 0.8.
pub(crate) fn find_reasonable_step_size<M: LogDensity + ?Sized, R: Rng>(
    model: &M,
    point: &Point,
    inv_mass: &[f64],
    step_size: f64,
    rng: &mut R,
) -> f64 {
    const LOG_TARGET: f64 = -0.223_143_551_314_209_7; // ln(0.8)
    const MAX_ROUNDS: usize = 100;

    let mut eps = step_size;
    let mut direction = 0.0;
    for _ in 0..MAX_ROUNDS {
        let integrator = Integrator::new(model, inv_mass, eps);
        let start = State {
            point: point.clone(),
            p: integrator.sample_momentum(rng),
        };
        let h0 = start.hamiltonian(inv_mass);
        let h = integrator.leapfrog(&start, 1.0).hamiltonian(inv_mass);
        let delta = h0 - h;

        if direction == 0.0 {
            direction = if delta > LOG_TARGET { 1.0 } else { -1.0 };
        }
        if direction > 0.0 && delta <= LOG_TARGET {
            break;
        }
        if direction < 0.0 && delta >= LOG_TARGET {
            break;
        }
        eps = if direction > 0.0 { eps * 2.0 } else { eps * 0.5 };
        if !(1e-8..=1e7).contains(&eps) {
            break;
        }
    }
    eps.clamp(1e-8, 1e7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Independent normals with the given scales.
    struct Gaussian {
        scales: Vec<f64>,
    }

    impl LogDensity for Gaussian {
        fn dim(&self) -> usize {
            self.scales.len()
        }

        fn log_density_and_gradient(&self, q: &[f64], grad: &mut [f64]) -> f64 {
            let mut lp = 0.0;
            for i in 0..q.len() {
                let s2 = self.scales[i] * self.scales[i];
                lp -= 0.5 * q[i] * q[i] / s2;
                grad[i] = -q[i] / s2;
            }
            lp
        }

        fn constrain(&self, q: &[f64]) -> Vec<f64> {
            q.to_vec()
        }
    }

    #[test]
    fn leapfrog_nearly_conserves_energy() {
        let model = Gaussian { scales: vec![1.0, 2.0] };
        let inv_mass = [1.0, 1.0];
        let integrator = Integrator::new(&model, &inv_mass, 0.01);
        let state = State {
            point: Point::new(&model, vec![0.5, -1.0]),
            p: vec![0.3, 0.7],
        };
        let h0 = state.hamiltonian(&inv_mass);
        let mut s = state;
        for _ in 0..100 {
            s = integrator.leapfrog(&s, 1.0);
        }
        assert!((s.hamiltonian(&inv_mass) - h0).abs() < 1e-3);
    }

    #[test]
    fn leapfrog_reverses() {
        let model = Gaussian { scales: vec![1.0, 0.5] };
        let inv_mass = [1.0, 2.0];
        let integrator = Integrator::new(&model, &inv_mass, 0.1);
        let state = State {
            point: Point::new(&model, vec![0.2, 0.1]),
            p: vec![1.0, -0.5],
        };
        let forward = integrator.leapfrog(&state, 1.0);
        let back = integrator.leapfrog(&forward, -1.0);
        for (a, b) in back.point.q.iter().zip(&state.point.q) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn transition_is_deterministic_for_a_seed() {
        let model = Gaussian { scales: vec![1.0; 3] };
        let inv_mass = vec![1.0; 3];
        let integrator = Integrator::new(&model, &inv_mass, 0.5);
        let start = Point::new(&model, vec![0.1, -0.2, 0.3]);

        let a = integrator.transition(&start, 10, &mut StdRng::seed_from_u64(7));
        let b = integrator.transition(&start, 10, &mut StdRng::seed_from_u64(7));
        assert_eq!(a.point.q, b.point.q);
        assert_eq!(a.tree_depth, b.tree_depth);
        assert!(a.n_leapfrog >= 1);
        assert!((0.0..=1.0).contains(&a.accept_stat));
        assert!(!a.divergent);
    }

    #[test]
    fn huge_step_diverges() {
        let model = Gaussian { scales: vec![0.01] };
        let inv_mass = [1.0];
        let integrator = Integrator::new(&model, &inv_mass, 50.0);
        let start = Point::new(&model, vec![0.01]);
        let t = integrator.transition(&start, 10, &mut StdRng::seed_from_u64(1));
        assert!(t.divergent);
        // A divergent first step leaves the chain where it was.
        assert_eq!(t.point.q, start.q);
    }

    #[test]
    fn treedepth_is_capped() {
        let model = Gaussian { scales: vec![1.0] };
        let inv_mass = [1.0];
        let integrator = Integrator::new(&model, &inv_mass, 1e-4);
        let start = Point::new(&model, vec![1.0]);
        let t = integrator.transition(&start, 3, &mut StdRng::seed_from_u64(3));
        assert_eq!(t.tree_depth, 3);
        assert_eq!(t.n_leapfrog, 7);
    }

    #[test]
    fn step_size_search_scales_with_target() {
        let mut rng = StdRng::seed_from_u64(11);
        let wide = Gaussian { scales: vec![10.0; 2] };
        let narrow = Gaussian { scales: vec![0.1; 2] };
        let inv_mass = [1.0, 1.0];
        let eps_wide =
            find_reasonable_step_size(&wide, &Point::new(&wide, vec![0.0; 2]), &inv_mass, 1.0, &mut rng);
        let eps_narrow = find_reasonable_step_size(
            &narrow,
            &Point::new(&narrow, vec![0.0; 2]),
            &inv_mass,
            1.0,
            &mut rng,
        );
        assert!(eps_wide > eps_narrow);
        assert!(eps_narrow < 1.0);
    }
}
