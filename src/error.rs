//! Errors shared by the linear-algebra layer and the solvers.

/// Errors that the kernel can surface to its callers.
///
/// Shape and singularity problems are programmer errors and propagate
/// immediately. Convergence trouble is *not* an error: the least-squares
/// solvers report it inside [`crate::SolveReport`] so that a batch of
/// cross-section solves can continue past one failed equilibrium.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Two operands had incompatible shapes. Never coerced, never broadcast.
    #[error("dimension mismatch in {operation}: left size {left}, right size {right}")]
    DimensionMismatch {
        /// Name of the operation that was attempted.
        operation: &'static str,
        /// Size of the mismatching dimension on the left operand.
        left: usize,
        /// Size of the mismatching dimension on the right operand.
        right: usize,
    },
    /// QR decomposition or back-substitution hit a zero pivot, i.e. the
    /// columns of the system are linearly dependent.
    #[error("singular system: zero pivot in column {column}")]
    SingularSystem {
        /// Column whose diagonal entry vanished.
        column: usize,
    },
    /// The 1-D root proposer found no pair of observations with residuals
    /// of opposing sign. The caller must widen its search range or abort.
    #[error("no bracket: all {observations} observed residuals share one sign")]
    NoBracket {
        /// How many observations were available.
        observations: usize,
    },
    /// Every weighted-bisection candidate inside the bracket was already
    /// observed, so no new trial value can be proposed.
    #[error("bisection exhausted: every candidate in [{lower}, {upper}] was already observed")]
    BisectionExhausted {
        /// Lower end of the bracket.
        lower: f64,
        /// Upper end of the bracket.
        upper: f64,
    },
    /// A residual function declared itself undefined at a probed point.
    #[error("residual function {index} is undefined at the probed point")]
    UndefinedResidual {
        /// Position of the function in the caller's residual list.
        index: usize,
    },
}
