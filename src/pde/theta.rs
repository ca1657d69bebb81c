//! The variable-implicitness (theta-method) time stepper.

use crate::linalg::gaussian::pack_tridiagonal;
use crate::linalg::{solve_gaussian, solve_tridiagonal, LinearSolveError};
use crate::math::linear_interpolate;
use crate::pde::{BoundaryCondition, BoundaryKind, PdeError};

type Coefficient = Box<dyn Fn(f64, f64) -> f64>;

/// Numerically solves `f_t = A(t,x)*f_xx + B(t,x)*f_x + C(t,x)*f` on the
/// interval between two boundary conditions, stepping forward in time with a
/// theta-blend of explicit and implicit integration.
///
/// The solution history is grown lazily: [`ThetaSolver::evaluate`] advances
/// the internal time as far as the query requires and bilinearly
/// interpolates between the stored grid levels. After `advance_to(t)` the
/// history always covers `[0, t + tau]`, which is what the read-out's
/// bracketing relies on.
pub struct ThetaSolver {
    theta: f64,
    explicit_weight: f64,
    lower: BoundaryCondition,
    upper: BoundaryCondition,
    space_step: f64,
    time_step: f64,
    nodes: Vec<f64>,
    levels: Vec<Vec<f64>>,
    times: Vec<f64>,
    current_time: f64,
    coeff_a: Coefficient,
    coeff_b: Coefficient,
    coeff_c: Coefficient,
}

impl ThetaSolver {
    /// Builds a solver whose initial state is `initial` sampled at every
    /// grid node.
    ///
    /// `theta` is the implicit ratio in `[0, 1]`; `max_space_step` bounds
    /// the grid spacing from above (the actual spacing divides the domain
    /// exactly); `time_step` is the fixed step `tau`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_initial_fn<F, A, B, C>(
        theta: f64,
        initial: F,
        a: A,
        b: B,
        c: C,
        lower: BoundaryCondition,
        upper: BoundaryCondition,
        max_space_step: f64,
        time_step: f64,
    ) -> Result<Self, PdeError>
    where
        F: Fn(f64) -> f64,
        A: Fn(f64, f64) -> f64 + 'static,
        B: Fn(f64, f64) -> f64 + 'static,
        C: Fn(f64, f64) -> f64 + 'static,
    {
        let (space_step, nodes) =
            build_grid(theta, &lower, &upper, max_space_step, time_step)?;
        let initial_values: Vec<f64> = nodes.iter().map(|&x| initial(x)).collect();
        Ok(Self::assemble(
            theta, lower, upper, space_step, time_step, nodes, initial_values, a, b, c,
        ))
    }

    /// Builds a solver whose initial state deposits weighted point samples
    /// into the grid: each node receives the summed weight of the samples
    /// within one grid spacing of its location, consumed in sorted order.
    #[allow(clippy::too_many_arguments)]
    pub fn from_weighted_samples<A, B, C>(
        theta: f64,
        samples_and_weights: &[(f64, f64)],
        a: A,
        b: B,
        c: C,
        lower: BoundaryCondition,
        upper: BoundaryCondition,
        max_space_step: f64,
        time_step: f64,
    ) -> Result<Self, PdeError>
    where
        A: Fn(f64, f64) -> f64 + 'static,
        B: Fn(f64, f64) -> f64 + 'static,
        C: Fn(f64, f64) -> f64 + 'static,
    {
        let (space_step, nodes) =
            build_grid(theta, &lower, &upper, max_space_step, time_step)?;

        let mut sorted = samples_and_weights.to_vec();
        sorted.sort_by(|left, right| left.0.total_cmp(&right.0));

        let mut initial_values = vec![0.0; nodes.len()];
        let mut pending = sorted.iter().peekable();
        for (i, &node) in nodes.iter().enumerate() {
            while let Some(&&(sample, weight)) = pending.peek() {
                if (sample - node).abs() <= space_step {
                    initial_values[i] += weight;
                    pending.next();
                } else if sample < node - space_step {
                    // Below every remaining node; never depositable.
                    pending.next();
                } else {
                    break;
                }
            }
        }

        Ok(Self::assemble(
            theta, lower, upper, space_step, time_step, nodes, initial_values, a, b, c,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble<A, B, C>(
        theta: f64,
        lower: BoundaryCondition,
        upper: BoundaryCondition,
        space_step: f64,
        time_step: f64,
        nodes: Vec<f64>,
        initial_values: Vec<f64>,
        a: A,
        b: B,
        c: C,
    ) -> Self
    where
        A: Fn(f64, f64) -> f64 + 'static,
        B: Fn(f64, f64) -> f64 + 'static,
        C: Fn(f64, f64) -> f64 + 'static,
    {
        Self {
            theta,
            explicit_weight: 1.0 - theta,
            lower,
            upper,
            space_step,
            time_step,
            nodes,
            levels: vec![initial_values],
            times: vec![0.0],
            current_time: 0.0,
            coeff_a: Box::new(a),
            coeff_b: Box::new(b),
            coeff_c: Box::new(c),
        }
    }

    /// The implicit ratio theta.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// The uniform grid spacing.
    pub fn space_step(&self) -> f64 {
        self.space_step
    }

    /// The fixed time step.
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// The spatial grid nodes.
    pub fn grid(&self) -> &[f64] {
        &self.nodes
    }

    /// The latest simulated time.
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// The per-node operator triple `(alpha, beta, gamma)` at `(t, x)`,
    /// chosen so that `(alpha, beta, gamma) . (u_{i-1}, u_i, u_{i+1})`
    /// equals `-(A*D2 + B*D1 + C) u_i` under central differences.
    fn operator(&self, t: f64, x: f64) -> (f64, f64, f64) {
        let inverse_h = 1.0 / self.space_step;
        let a_over_h = (self.coeff_a)(t, x) * inverse_h;
        let b_over_2 = (self.coeff_b)(t, x) / 2.0;
        (
            (b_over_2 - a_over_h) * inverse_h,
            2.0 * a_over_h * inverse_h - (self.coeff_c)(t, x),
            (-a_over_h - b_over_2) * inverse_h,
        )
    }

    /// Steps the solution forward until the internal time passes `time`.
    pub fn advance_to(&mut self, time: f64) -> Result<(), PdeError> {
        while self.current_time <= time {
            self.step()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), PdeError> {
        self.current_time += self.time_step;
        // Time-varying coefficients and boundary data are sampled at the
        // theta-weighted point inside the step.
        let t_op = self.current_time + self.time_step * self.theta;

        let theta = self.theta;
        let explicit = self.explicit_weight;
        let h = self.space_step;
        let inv_tau = 1.0 / self.time_step;
        let n_nodes = self.nodes.len();

        let initial_offset = usize::from(self.lower.kind() == BoundaryKind::Dirichlet);
        let final_offset = usize::from(self.upper.kind() == BoundaryKind::Dirichlet);
        let unknowns = n_nodes - initial_offset - final_offset;

        let mut sub = vec![0.0; unknowns - 1];
        let mut diag = vec![0.0; unknowns];
        let mut sup = vec![0.0; unknowns - 1];
        let mut rhs = vec![0.0; unknowns];
        let mut next = vec![0.0; n_nodes];

        let previous = &self.levels[self.levels.len() - 1];

        match self.lower.kind() {
            BoundaryKind::Dirichlet => {
                let pinned = self.lower.value(t_op);
                next[0] = pinned;

                let (ca, cb, cc) = self.operator(t_op, self.nodes[1]);
                diag[0] = inv_tau + theta * cb;
                sup[0] = theta * cc;
                rhs[0] = -explicit * ca * previous[0]
                    + (inv_tau - explicit * cb) * previous[1]
                    - explicit * cc * previous[2]
                    - theta * ca * pinned;
            }
            BoundaryKind::Neumann => {
                let (ca, cb, cc) = self.operator(t_op, self.nodes[0]);
                let fused = ca + cc;
                diag[0] = inv_tau + theta * cb;
                sup[0] = theta * fused;
                rhs[0] = (inv_tau - explicit * cb) * previous[0]
                    - explicit * fused * previous[1]
                    + 2.0 * ca * h * self.lower.value(t_op);
            }
            BoundaryKind::Robin => {
                let (ca, cb, cc) = self.operator(t_op, self.nodes[0]);
                // Ghost-node elimination: u_{-1} = u_1 - (2h/order1)*(v - order0*u_0).
                let gradient_scale = 2.0 * ca * h / self.lower.order1(t_op);
                let solution_shift = gradient_scale * self.lower.order0(t_op);
                let fused = ca + cc;
                diag[0] = inv_tau + theta * (cb + solution_shift);
                sup[0] = theta * fused;
                rhs[0] = (inv_tau - explicit * (cb + solution_shift)) * previous[0]
                    - explicit * fused * previous[1]
                    + gradient_scale * self.lower.value(t_op);
            }
        }

        for i in (1 + initial_offset)..(n_nodes - 1 - final_offset) {
            let (ca, cb, cc) = self.operator(t_op, self.nodes[i]);
            sub[i - initial_offset - 1] = theta * ca;
            diag[i - initial_offset] = inv_tau + theta * cb;
            sup[i - initial_offset] = theta * cc;
            rhs[i - initial_offset] = -explicit * ca * previous[i - 1]
                + (inv_tau - explicit * cb) * previous[i]
                - explicit * cc * previous[i + 1];
        }

        match self.upper.kind() {
            BoundaryKind::Dirichlet => {
                let i = n_nodes - 2;
                let pinned = self.upper.value(t_op);
                next[n_nodes - 1] = pinned;

                let (ca, cb, cc) = self.operator(t_op, self.nodes[i]);
                sub[i - initial_offset - 1] = theta * ca;
                diag[i - initial_offset] = inv_tau + theta * cb;
                rhs[i - initial_offset] = -explicit * ca * previous[i - 1]
                    + (inv_tau - explicit * cb) * previous[i]
                    - explicit * cc * previous[i + 1]
                    - theta * cc * pinned;
            }
            BoundaryKind::Neumann => {
                let i = n_nodes - 1;
                let (ca, cb, cc) = self.operator(t_op, self.nodes[i]);
                let fused = ca + cc;
                sub[i - initial_offset - 1] = theta * fused;
                diag[i - initial_offset] = inv_tau + theta * cb;
                rhs[i - initial_offset] = -explicit * fused * previous[i - 1]
                    + (inv_tau - explicit * cb) * previous[i]
                    - 2.0 * cc * h * self.upper.value(t_op);
            }
            BoundaryKind::Robin => {
                let i = n_nodes - 1;
                let (ca, cb, cc) = self.operator(t_op, self.nodes[i]);
                // Ghost-node elimination: u_{N+1} = u_{N-1} + (2h/order1)*(v - order0*u_N).
                let gradient_scale = 2.0 * cc * h / self.upper.order1(t_op);
                let solution_shift = gradient_scale * self.upper.order0(t_op);
                let fused = ca + cc;
                sub[i - initial_offset - 1] = theta * fused;
                diag[i - initial_offset] = inv_tau + theta * (cb - solution_shift);
                rhs[i - initial_offset] = -explicit * fused * previous[i - 1]
                    + (inv_tau - explicit * (cb - solution_shift)) * previous[i]
                    - gradient_scale * self.upper.value(t_op);
            }
        }

        let solution = match solve_tridiagonal(&sub, &diag, &sup, &rhs, true) {
            Ok(solution) => solution,
            Err(LinearSolveError::NotDiagonallyDominant { .. }) => {
                solve_gaussian(&pack_tridiagonal(&sub, &diag, &sup, &rhs))?
            }
            Err(other) => return Err(other.into()),
        };

        next[initial_offset..initial_offset + unknowns].copy_from_slice(&solution);
        self.levels.push(next);
        self.times.push(self.current_time);
        Ok(())
    }

    /// The numerical solution at `(t, x)`, advancing the internal history
    /// as far as the query requires.
    ///
    /// Queries are bilinearly interpolated between the two bracketing time
    /// levels and the two bracketing grid nodes, clamping at the edges of
    /// the stored history. Negative times fail with
    /// [`PdeError::ReverseTime`].
    pub fn evaluate(&mut self, t: f64, x: f64) -> Result<f64, PdeError> {
        if t < 0.0 {
            return Err(PdeError::ReverseTime);
        }
        if t >= self.current_time {
            self.advance_to(t)?;
        }

        let max_level = self.times.len() - 2;
        let level = (((t / self.time_step) as isize).max(0) as usize).min(max_level);

        let max_node = self.nodes.len() - 2;
        let node =
            ((((x - self.nodes[0]) / self.space_step).floor() as isize).max(0) as usize)
                .min(max_node);

        let before = &self.levels[level];
        let after = &self.levels[level + 1];
        let x0 = self.nodes[node];
        let x1 = self.nodes[node + 1];
        let below = linear_interpolate(x0, x1, before[node], before[node + 1], x);
        let above = linear_interpolate(x0, x1, after[node], after[node + 1], x);
        Ok(linear_interpolate(
            self.times[level],
            self.times[level + 1],
            below,
            above,
            t,
        ))
    }
}

impl std::fmt::Debug for ThetaSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThetaSolver")
            .field("theta", &self.theta)
            .field("space_step", &self.space_step)
            .field("time_step", &self.time_step)
            .field("nodes", &self.nodes.len())
            .field("current_time", &self.current_time)
            .finish_non_exhaustive()
    }
}

fn build_grid(
    theta: f64,
    lower: &BoundaryCondition,
    upper: &BoundaryCondition,
    max_space_step: f64,
    time_step: f64,
) -> Result<(f64, Vec<f64>), PdeError> {
    if !(0.0..=1.0).contains(&theta) {
        return Err(PdeError::InvalidInput(
            "implicit ratio must be between 0 and 1 inclusive".to_string(),
        ));
    }
    if lower.location() >= upper.location() {
        return Err(PdeError::InvalidInput(
            "lower bound must lie below upper bound".to_string(),
        ));
    }
    if !max_space_step.is_finite() || max_space_step <= 0.0 {
        return Err(PdeError::InvalidInput(
            "max space step must be finite and positive".to_string(),
        ));
    }
    if !time_step.is_finite() || time_step <= 0.0 {
        return Err(PdeError::InvalidInput(
            "time step must be finite and positive".to_string(),
        ));
    }

    let range = upper.location() - lower.location();
    let steps = (range / max_space_step).ceil() as usize;
    if steps < 3 {
        return Err(PdeError::InvalidInput(
            "max space step too coarse: the grid needs at least four nodes".to_string(),
        ));
    }
    let space_step = range / steps as f64;

    let mut nodes = Vec::with_capacity(steps + 1);
    nodes.push(lower.location());
    for i in 1..steps {
        nodes.push(lower.location() + i as f64 * space_step);
    }
    nodes.push(upper.location());
    Ok((space_step, nodes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn zero_coefficient(_t: f64, _x: f64) -> f64 {
        0.0
    }

    fn heat_solver(theta: f64) -> ThetaSolver {
        ThetaSolver::from_initial_fn(
            theta,
            |x: f64| (std::f64::consts::PI * x).sin(),
            |_t, _x| 1.0,
            zero_coefficient,
            zero_coefficient,
            BoundaryCondition::dirichlet(0.0, |_| 0.0),
            BoundaryCondition::dirichlet(1.0, |_| 0.0),
            0.05,
            1.0e-4,
        )
        .unwrap()
    }

    #[test]
    fn grid_divides_the_domain_exactly() {
        let solver = heat_solver(0.5);
        let grid = solver.grid();
        assert_eq!(grid.len(), 21);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[grid.len() - 1], 1.0);
        assert_abs_diff_eq!(solver.space_step(), 0.05, epsilon = 1.0e-15);
    }

    #[test]
    fn reversed_bounds_and_bad_theta_are_rejected() {
        let reversed = ThetaSolver::from_initial_fn(
            0.5,
            |_x: f64| 0.0,
            zero_coefficient,
            zero_coefficient,
            zero_coefficient,
            BoundaryCondition::dirichlet(1.0, |_| 0.0),
            BoundaryCondition::dirichlet(0.0, |_| 0.0),
            0.1,
            0.01,
        );
        assert!(matches!(reversed, Err(PdeError::InvalidInput(_))));

        let bad_theta = ThetaSolver::from_initial_fn(
            1.5,
            |_x: f64| 0.0,
            zero_coefficient,
            zero_coefficient,
            zero_coefficient,
            BoundaryCondition::dirichlet(0.0, |_| 0.0),
            BoundaryCondition::dirichlet(1.0, |_| 0.0),
            0.1,
            0.01,
        );
        assert!(matches!(bad_theta, Err(PdeError::InvalidInput(_))));
    }

    #[test]
    fn negative_time_is_reverse_time() {
        let mut solver = heat_solver(1.0);
        assert_eq!(solver.evaluate(-0.1, 0.5), Err(PdeError::ReverseTime));
    }

    #[test]
    fn initial_level_reproduces_the_initial_condition() {
        let mut solver = heat_solver(0.5);
        let value = solver.evaluate(0.0, 0.5).unwrap();
        assert_abs_diff_eq!(value, 1.0, epsilon = 1.0e-3);
    }

    #[test]
    fn advancing_covers_past_the_requested_time() {
        let mut solver = heat_solver(1.0);
        solver.advance_to(0.01).unwrap();
        assert!(solver.current_time() > 0.01);
        assert!(solver.current_time() <= 0.01 + 2.0 * solver.time_step());
    }

    #[test]
    fn heat_mode_decays_at_the_analytic_rate() {
        let mut solver = heat_solver(0.5);
        let t = 0.05;
        let rate = std::f64::consts::PI.powi(2);
        for x in [0.25, 0.5, 0.75] {
            let expected = (std::f64::consts::PI * x).sin() * (-rate * t).exp();
            let actual = solver.evaluate(t, x).unwrap();
            assert_abs_diff_eq!(actual, expected, epsilon = 2.0e-3);
        }
    }

    #[test]
    fn weighted_samples_deposit_into_nearby_nodes() {
        let mut solver = ThetaSolver::from_weighted_samples(
            1.0,
            &[(0.5, 2.0), (0.52, 1.0), (5.0, 3.0)],
            |_t, _x| 1.0,
            zero_coefficient,
            zero_coefficient,
            BoundaryCondition::dirichlet(0.0, |_| 0.0),
            BoundaryCondition::dirichlet(1.0, |_| 0.0),
            0.1,
            1.0e-3,
        )
        .unwrap();
        // Consumed in sorted order: 0.5 is claimed by the first node within
        // one spacing (0.4), then 0.52 by the node at 0.5. The sample at 5.0
        // sits outside the domain and is dropped.
        assert_abs_diff_eq!(solver.evaluate(0.0, 0.4).unwrap(), 2.0, epsilon = 1.0e-12);
        assert_abs_diff_eq!(solver.evaluate(0.0, 0.5).unwrap(), 1.0, epsilon = 1.0e-12);
        assert_abs_diff_eq!(solver.evaluate(0.0, 0.9).unwrap(), 0.0, epsilon = 1.0e-12);
    }
}
