//! Levenberg-Marquardt: Gauss-Newton with adaptive scaled-diagonal damping.

use log::debug;

use crate::{Error, ResidualFn, matrix::Matrix, vector::Vector};

use super::{Config, DampingPolicy, IterateHistory, NonlinearSolver, SolveReport, run};

/// How many identical residuums in a row count as cycling.
const REPEAT_STALL_COUNT: usize = 5;

/// Levenberg-Marquardt nonlinear least squares.
///
/// Identical to [`super::GaussNewton`] except that the normal equations
/// become `(JᵀJ + λ²·diag(JᵀJ))·Δx = Jᵀ·f(x)` and λ adapts to the accepted
/// line-search step size of the previous iteration: a small step drives λ
/// up (toward gradient descent), a full step halves it (toward
/// Gauss-Newton). The stall test is also different: the solve counts as
/// converged when the exact same residuum repeats five times running.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    /// Convergence parameters.
    pub config: Config,
    /// Damping factor λ at the start of each solve.
    pub initial_damping: f64,
    final_damping: f64,
    damping_increases: u32,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl LevenbergMarquardt {
    /// A solver with the given parameters and a starting λ of 1.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            initial_damping: 1.0,
            final_damping: 1.0,
            damping_increases: 0,
        }
    }

    /// Start each solve from the given damping factor.
    pub fn with_initial_damping(mut self, damping: f64) -> Self {
        self.initial_damping = damping;
        self
    }

    /// The damping factor when the previous solve finished.
    pub fn final_damping(&self) -> f64 {
        self.final_damping
    }

    /// How often the previous solve raised the damping factor.
    pub fn damping_increases(&self) -> u32 {
        self.damping_increases
    }
}

impl NonlinearSolver for LevenbergMarquardt {
    fn solve(
        &mut self,
        fns: &[Box<ResidualFn<'_>>],
        x0: Vector,
    ) -> Result<SolveReport, Error> {
        let mut policy = ScaledDiagonal {
            lambda: self.initial_damping,
            increases: 0,
        };
        let report = run(&mut policy, fns, x0, &self.config);
        self.final_damping = policy.lambda;
        self.damping_increases = policy.increases;
        report
    }
}

/// λ²·diag(JᵀJ) damping with step-size-driven adaptation. The λ lifecycle
/// is tied to one solve call.
struct ScaledDiagonal {
    lambda: f64,
    increases: u32,
}

impl DampingPolicy for ScaledDiagonal {
    fn dampen(&mut self, normal: &mut Matrix) {
        let factor = self.lambda * self.lambda;
        for i in 0..normal.nrows().min(normal.ncols()) {
            let diagonal = normal.get(i, i);
            normal.set(i, i, diagonal + factor * diagonal);
        }
    }

    #[allow(clippy::float_cmp)]
    fn adapt(&mut self, step_size: f64) {
        let before = self.lambda;
        if step_size <= 0.1 {
            // Stubborn line searches mean the model radius is too big:
            // move toward gradient descent.
            self.lambda = if self.lambda > 1.0 {
                2.0 * self.lambda
            } else {
                2.0
            };
            self.increases += 1;
        } else if step_size == 1.0 {
            // Full steps mean the model is trustworthy: move toward
            // Gauss-Newton.
            self.lambda *= 0.5;
        }
        if self.lambda != before {
            debug!("damping factor {before} -> {} (step size {step_size})", self.lambda);
        }
    }

    #[allow(clippy::float_cmp)]
    fn stalled(&self, history: &IterateHistory, _config: &Config) -> bool {
        let residuums: Vec<f64> = history.residuums().collect();
        if residuums.len() < REPEAT_STALL_COUNT {
            return false;
        }
        let tail = &residuums[residuums.len() - REPEAT_STALL_COUNT..];
        tail.iter().all(|&r| r == tail[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(residuums: &[f64]) -> IterateHistory {
        let mut history = IterateHistory::default();
        for &r in residuums {
            history.push(Vector::new(vec![0.0]), Vector::new(vec![r]));
        }
        history
    }

    fn policy() -> ScaledDiagonal {
        ScaledDiagonal {
            lambda: 1.0,
            increases: 0,
        }
    }

    #[test]
    fn five_identical_residuums_count_as_cycling() {
        let config = Config::default();
        assert!(policy().stalled(&history_of(&[0.7; 5]), &config));
        // Only the tail matters; earlier progress does not reset the run.
        assert!(policy().stalled(&history_of(&[3.0, 0.7, 0.7, 0.7, 0.7, 0.7]), &config));
    }

    #[test]
    fn shorter_or_broken_runs_do_not_count() {
        let config = Config::default();
        assert!(!policy().stalled(&history_of(&[0.7; 4]), &config));
        assert!(!policy().stalled(&history_of(&[0.7, 0.7, 0.7, 0.7, 0.699]), &config));
        assert!(!policy().stalled(&history_of(&[0.699, 0.7, 0.7, 0.7, 0.7]), &config));
    }
}
