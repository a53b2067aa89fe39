//! Nonlinear equilibrium kernel for moment-curvature (M-N-κ) cross-section
//! analysis.
//!
//! Higher-level calculations (stress integration over a layered section,
//! boundary-curvature searches, slip-distribution fitting) all reduce to
//! the same problem: find the variable(s) that zero a set of residual
//! functions. This crate is that kernel and nothing else: dense small-scale
//! vectors and matrices with QR decomposition, a QR back-substitution
//! linear solver, numerical Jacobians, a safeguarded 1-D Newton/bisection
//! proposer, and Gauss-Newton / Levenberg-Marquardt least squares with a
//! step-halving line search.
//!
//! Callers construct residual closures over their own state and pass them
//! in; every solve runs synchronously to completion inside one call and
//! owns its iterate history exclusively. Nothing here is shared mutable
//! state, so independent solves may run on independent threads without any
//! locking.
//!
//! ```
//! use mnkappa_solvers::{
//!     Config, Evaluation, GaussNewton, NonlinearSolver, ResidualFn, Vector,
//! };
//!
//! // Rosenbrock in residual form.
//! let fns: Vec<Box<ResidualFn<'_>>> = vec![
//!     Box::new(|x: &Vector| Evaluation::Value(2f64.sqrt() * (1.0 - x[0]))),
//!     Box::new(|x: &Vector| Evaluation::Value(200f64.sqrt() * (x[1] - x[0] * x[0]))),
//! ];
//! let mut solver = GaussNewton::new(Config::default().with_max_iterations(200));
//! let report = solver.solve(&fns, Vector::new(vec![0.0, -0.1])).unwrap();
//! assert!(report.successful);
//! assert!((report.x[0] - 1.0).abs() < 1e-6);
//! ```

/// Errors shared across the kernel.
mod error;
/// Numerical Jacobians via finite differences.
pub mod jacobian;
/// QR + back-substitution linear solver.
pub mod linear;
/// Dense matrices and QR decomposition.
mod matrix;
/// 1-D Newton/bisection root proposal.
pub mod root;
/// Gauss-Newton and Levenberg-Marquardt least squares.
pub mod least_squares;
/// Dense fixed-length vectors.
mod vector;
/// Unit tests.
#[cfg(test)]
mod tests;

pub use crate::error::Error;
pub use crate::jacobian::{JacobianCfg, Scheme};
pub use crate::least_squares::{
    Config, GaussNewton, IterateHistory, IterateRecord, LevenbergMarquardt, NonlinearSolver,
    SolveReport,
};
pub use crate::matrix::{Matrix, Qr, QrMethod};
pub use crate::root::{Observation, Observations};
pub use crate::vector::Vector;

/// What probing a residual function at a trial point produced.
///
/// Residual functions declare out-of-domain points explicitly instead of
/// panicking, so the line search can shrink the step with a normal branch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// The residual at the probed point.
    Value(f64),
    /// The function is not defined at the probed point.
    Undefined,
}

impl From<f64> for Evaluation {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

/// A residual function over a trial point, closing over caller state.
/// Must be pure with respect to the kernel: re-evaluation at the same point
/// has to give the same answer.
pub type ResidualFn<'a> = dyn Fn(&Vector) -> Evaluation + 'a;
