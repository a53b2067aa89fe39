//! Plain Gauss-Newton: undamped normal equations.

use crate::{Error, ResidualFn, matrix::Matrix, vector::Vector};

use super::{Config, DampingPolicy, IterateHistory, NonlinearSolver, SolveReport, run};

/// Gauss-Newton nonlinear least squares.
///
/// Iterates `x <- x - α·Δx` with `(JᵀJ)·Δx = Jᵀ·f(x)` and a step-halving
/// line search for `α`. Counts a residuum change below
/// [`Config::min_residuum_change`] (after at least two accepted steps) as
/// converged.
#[derive(Debug, Clone, Default)]
pub struct GaussNewton {
    /// Convergence parameters.
    pub config: Config,
}

impl GaussNewton {
    /// A solver with the given parameters.
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl NonlinearSolver for GaussNewton {
    fn solve(
        &mut self,
        fns: &[Box<ResidualFn<'_>>],
        x0: Vector,
    ) -> Result<SolveReport, Error> {
        run(&mut Undamped, fns, x0, &self.config)
    }
}

/// The no-op policy: normal equations stay `JᵀJ`, stall is the small-delta
/// test.
struct Undamped;

impl DampingPolicy for Undamped {
    fn dampen(&mut self, _normal: &mut Matrix) {}

    fn adapt(&mut self, _step_size: f64) {}

    fn stalled(&self, history: &IterateHistory, config: &Config) -> bool {
        let records = history.records();
        let [.., previous, latest] = records else {
            return false;
        };
        (previous.residuum - latest.residuum).abs() < config.min_residuum_change
    }
}
