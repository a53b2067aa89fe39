//! Multivariate nonlinear least squares: Gauss-Newton and
//! Levenberg-Marquardt over the QR linear solver and the numerical
//! Jacobian.
//!
//! Both solvers run the same iteration driver; the damping policy (none vs
//! scaled-diagonal) and the stall test are the only differing pieces.

use log::{debug, trace, warn};

use crate::{
    Error, Evaluation, ResidualFn, jacobian,
    jacobian::JacobianCfg,
    linear,
    matrix::Matrix,
    vector::Vector,
};

pub mod gauss_newton;
pub mod levenberg_marquardt;

pub use gauss_newton::GaussNewton;
pub use levenberg_marquardt::LevenbergMarquardt;

/// Convergence parameters shared by both least-squares solvers.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Success when the residuum (Euclidean norm of the residual vector)
    /// drops below this.
    pub tolerance: f64,
    /// Outer iteration budget. Exhausting it is reported, never silently
    /// treated as success.
    pub max_iterations: u32,
    /// Step-halving budget per line search.
    pub max_line_search_iterations: u32,
    /// Gauss-Newton stall threshold: two consecutive accepted residuums
    /// closer than this count as converged. Keeps over-determined systems
    /// from burning the whole budget on noise-level improvements.
    pub min_residuum_change: f64,
    /// How the Jacobian is built each iteration.
    pub jacobian: JacobianCfg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_iterations: 50,
            max_line_search_iterations: 10,
            min_residuum_change: 1e-10,
            jacobian: JacobianCfg::default(),
        }
    }
}

impl Config {
    /// Use the given residuum tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Use the given outer iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Use the given line-search budget.
    pub fn with_max_line_search_iterations(mut self, budget: u32) -> Self {
        self.max_line_search_iterations = budget;
        self
    }

    /// Use the given stall threshold.
    pub fn with_min_residuum_change(mut self, change: f64) -> Self {
        self.min_residuum_change = change;
        self
    }

    /// Use the given Jacobian configuration.
    pub fn with_jacobian(mut self, jacobian: JacobianCfg) -> Self {
        self.jacobian = jacobian;
        self
    }
}

/// What a least-squares solve produced.
///
/// `x` is the best iterate even when `successful` is false, so batch
/// callers can decide whether a best-effort equilibrium is still usable.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// The best iterate found.
    pub x: Vector,
    /// Whether a success criterion was met.
    pub successful: bool,
    /// Accepted outer iterations.
    pub iterations: u32,
    /// Why the solve gave up, when it did.
    pub failure_reason: Option<String>,
}

/// One accepted iterate.
#[derive(Debug, Clone)]
pub struct IterateRecord {
    /// The variable vector.
    pub x: Vector,
    /// The residual vector at `x`.
    pub residuals: Vector,
    /// Euclidean norm of `residuals`.
    pub residuum: f64,
}

/// Append-only arena of accepted iterates. Queries that need a different
/// order (best first) are derived views; the backing records are never
/// re-sorted in place.
#[derive(Debug, Clone, Default)]
pub struct IterateHistory {
    records: Vec<IterateRecord>,
}

impl IterateHistory {
    fn push(&mut self, x: Vector, residuals: Vector) {
        let residuum = residuals.norm();
        self.records.push(IterateRecord {
            x,
            residuals,
            residuum,
        });
    }

    /// The records in iteration order.
    pub fn records(&self) -> &[IterateRecord] {
        &self.records
    }

    /// The latest accepted iterate.
    pub fn last(&self) -> Option<&IterateRecord> {
        self.records.last()
    }

    /// Derived view: the iterate with the smallest residuum.
    pub fn best(&self) -> Option<&IterateRecord> {
        self.records
            .iter()
            .min_by(|a, b| a.residuum.total_cmp(&b.residuum))
    }

    /// Derived view: references to all records, best residuum first.
    pub fn sorted_by_residuum(&self) -> Vec<&IterateRecord> {
        let mut sorted: Vec<&IterateRecord> = self.records.iter().collect();
        sorted.sort_by(|a, b| a.residuum.total_cmp(&b.residuum));
        sorted
    }

    /// The residuum of each accepted iterate, in iteration order.
    pub fn residuums(&self) -> impl Iterator<Item = f64> + '_ {
        self.records.iter().map(|r| r.residuum)
    }
}

/// The capability both least-squares solvers expose.
pub trait NonlinearSolver {
    /// Drive the iteration from `x0` until a success criterion or a budget
    /// is hit. Shape and singularity errors propagate; convergence trouble
    /// lands in the report.
    fn solve(
        &mut self,
        fns: &[Box<ResidualFn<'_>>],
        x0: Vector,
    ) -> Result<SolveReport, Error>;
}

/// The damping policy is the only piece that differs between Gauss-Newton
/// and Levenberg-Marquardt: how the normal matrix is modified, how the
/// policy reacts to the accepted step size, and when iteration counts as
/// stalled.
pub(crate) trait DampingPolicy {
    /// Modify the normal matrix `JᵀJ` in place before solving.
    fn dampen(&mut self, normal: &mut Matrix);

    /// React to the accepted line-search step size of the iteration that
    /// just finished.
    fn adapt(&mut self, step_size: f64);

    /// Whether the accepted-residuum history counts as stalled (which is
    /// reported as convergence).
    fn stalled(&self, history: &IterateHistory, config: &Config) -> bool;
}

/// Evaluate all residual functions, mapping [`Evaluation::Undefined`] to
/// `None` so the line search can treat it as "try a smaller step".
fn try_evaluate(fns: &[Box<ResidualFn<'_>>], x: &Vector) -> Option<Vector> {
    fns.iter()
        .map(|f| match f(x) {
            Evaluation::Value(value) => Some(value),
            Evaluation::Undefined => None,
        })
        .collect()
}

/// Shared iteration driver: Jacobian, damped normal equations, step-halving
/// line search, stall and budget accounting.
pub(crate) fn run(
    policy: &mut dyn DampingPolicy,
    fns: &[Box<ResidualFn<'_>>],
    x0: Vector,
    config: &Config,
) -> Result<SolveReport, Error> {
    // The zero-iteration budget short-circuits before any residual is
    // evaluated.
    if config.max_iterations == 0 {
        return Ok(SolveReport {
            x: x0,
            successful: false,
            iterations: 0,
            failure_reason: Some("maximum iterations (0) exhausted without convergence".into()),
        });
    }

    let mut history = IterateHistory::default();
    match jacobian::probe(fns, &x0) {
        Ok(residuals) => history.push(x0.clone(), residuals),
        Err(Error::UndefinedResidual { index }) => {
            return Ok(SolveReport {
                x: x0,
                successful: false,
                iterations: 0,
                failure_reason: Some(format!(
                    "residual function {index} is undefined at the starting point"
                )),
            });
        }
        Err(other) => return Err(other),
    }

    for iteration in 1..=config.max_iterations {
        let current = history.last().expect("history starts with x0");
        if current.residuum < config.tolerance {
            debug!(
                "converged after {} iterations, residuum {:.3e}",
                iteration - 1,
                current.residuum
            );
            return Ok(success(&history, iteration - 1));
        }

        let j = match jacobian::build(fns, &current.x, config.jacobian, Some(&current.residuals)) {
            Ok(j) => j,
            Err(Error::UndefinedResidual { index }) => {
                warn!("residual function {index} undefined while differencing, giving up");
                return Ok(give_up(
                    &history,
                    iteration - 1,
                    format!("residual function {index} is undefined next to the current iterate"),
                ));
            }
            Err(other) => return Err(other),
        };
        let jt = j.transpose();
        let mut normal = jt.mul_matrix(&j)?;
        policy.dampen(&mut normal);
        let gradient = jt.mul_vector(&current.residuals)?;
        let delta = linear::solve(&normal, &gradient)?;

        let Some((x_next, residuals_next, step_size)) =
            line_search(fns, current, &delta, config)?
        else {
            warn!(
                "line search exhausted after {} halvings at iteration {iteration}",
                config.max_line_search_iterations
            );
            return Ok(give_up(
                &history,
                iteration - 1,
                format!(
                    "line search exhausted after {} step halvings without improvement",
                    config.max_line_search_iterations
                ),
            ));
        };

        policy.adapt(step_size);
        history.push(x_next, residuals_next);
        let accepted = history.last().expect("just pushed");
        debug!(
            "iteration {iteration}: residuum {:.6e}, largest residual {:.3e}, step size {step_size}",
            accepted.residuum,
            accepted.residuals.max_abs()
        );

        if accepted.residuum < config.tolerance {
            return Ok(success(&history, iteration));
        }
        // Stall only counts after at least two accepted steps.
        if iteration >= 2 && policy.stalled(&history, config) {
            debug!("iteration {iteration}: progress stalled, treating as converged");
            return Ok(success(&history, iteration));
        }
    }

    Ok(give_up(
        &history,
        config.max_iterations,
        format!(
            "maximum iterations ({}) exhausted without convergence",
            config.max_iterations
        ),
    ))
}

/// Step-halving line search along `-delta`, starting at full step size.
/// A candidate where any residual is undefined, or whose residuum does not
/// strictly improve, halves the step. `None` when the budget runs out.
fn line_search(
    fns: &[Box<ResidualFn<'_>>],
    current: &IterateRecord,
    delta: &Vector,
    config: &Config,
) -> Result<Option<(Vector, Vector, f64)>, Error> {
    let mut step_size = 1.0;
    for _ in 0..config.max_line_search_iterations {
        let candidate = current.x.sub(&delta.scale(step_size))?;
        if let Some(residuals) = try_evaluate(fns, &candidate) {
            let residuum = residuals.norm();
            if residuum < current.residuum {
                return Ok(Some((candidate, residuals, step_size)));
            }
            trace!("step size {step_size}: residuum {residuum:.6e} did not improve");
        } else {
            trace!("step size {step_size}: residual undefined");
        }
        step_size *= 0.5;
    }
    Ok(None)
}

fn success(history: &IterateHistory, iterations: u32) -> SolveReport {
    let last = history.last().expect("success implies an iterate");
    SolveReport {
        x: last.x.clone(),
        successful: true,
        iterations,
        failure_reason: None,
    }
}

fn give_up(history: &IterateHistory, iterations: u32, reason: String) -> SolveReport {
    let best = history.best().expect("history starts with x0");
    SolveReport {
        x: best.x.clone(),
        successful: false,
        iterations,
        failure_reason: Some(reason),
    }
}
