//! Linear system solving via QR decomposition and back-substitution.

use log::trace;

use crate::{
    Error,
    matrix::{Matrix, QrMethod},
    vector::Vector,
};

/// Solve `a * x = b` with the default QR method (modified Gram-Schmidt).
pub fn solve(a: &Matrix, b: &Vector) -> Result<Vector, Error> {
    solve_with(a, b, QrMethod::default())
}

/// Solve `a * x = b` with the given QR method.
///
/// Decomposes `a = q * r`, forms `z = qT * b` and back-substitutes
/// `r * x = z` from the last row upward. A `0/0` entry (numerator and
/// denominator both exactly zero, which the Givens path can produce for a
/// skipped pivot column) resolves to `x_i = 0`; a zero pivot under a
/// nonzero numerator is a [`Error::SingularSystem`]. Single pass, no
/// iterative refinement.
pub fn solve_with(a: &Matrix, b: &Vector, method: QrMethod) -> Result<Vector, Error> {
    if a.nrows() != b.len() {
        return Err(Error::DimensionMismatch {
            operation: "linear solve",
            left: a.nrows(),
            right: b.len(),
        });
    }
    let qr = a.qr(method)?;
    let z = qr.q.transpose().mul_vector(b)?;
    trace!("back-substituting a {} unknown system", a.ncols());
    back_substitute(&qr.r, &z)
}

/// Solve the upper-triangular system `r * x = z` from the bottom row up:
/// `x_i = (z_i - sum_{k>i} r_ik * x_k) / r_ii`.
#[allow(clippy::float_cmp)]
fn back_substitute(r: &Matrix, z: &Vector) -> Result<Vector, Error> {
    let n = r.ncols();
    let mut x = Vector::zeros(n);
    for i in (0..n).rev() {
        let tail: f64 = ((i + 1)..n).map(|k| r.get(i, k) * x[k]).sum();
        let numerator = z[i] - tail;
        let pivot = r.get(i, i);
        let value = if pivot == 0.0 {
            if numerator == 0.0 {
                // An unconstrained unknown from a skipped pivot column.
                0.0
            } else {
                return Err(Error::SingularSystem { column: i });
            }
        } else {
            numerator / pivot
        };
        x.set(i, value);
    }
    Ok(x)
}
