//! Numerical Jacobians via finite differences.

use crate::{Error, Evaluation, ResidualFn, matrix::Matrix, vector::Vector};

/// Default perturbation step for finite differences.
pub const DEFAULT_STEP: f64 = 1e-8;

/// Which finite-difference scheme to perturb each coordinate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    /// `(f(x + h) - f(x)) / h`
    Forward,
    /// `(f(x) - f(x - h)) / h`
    Backward,
    /// `(f(x + h) - f(x - h)) / 2h`
    #[default]
    Center,
}

/// How a Jacobian is built: the difference scheme and the step width.
#[derive(Debug, Clone, Copy)]
pub struct JacobianCfg {
    /// The finite-difference scheme.
    pub scheme: Scheme,
    /// The perturbation step `h`.
    pub step: f64,
}

impl Default for JacobianCfg {
    fn default() -> Self {
        Self {
            scheme: Scheme::default(),
            step: DEFAULT_STEP,
        }
    }
}

impl JacobianCfg {
    /// Use the given scheme.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Use the given step width.
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }
}

/// Build the `N x M` Jacobian of `N` residual functions at an
/// `M`-dimensional point. Entry `(i, j)` is the partial derivative of
/// function `i` with respect to coordinate `j`; each column perturbs
/// exactly one coordinate and holds the others fixed.
///
/// `residual_at_point` may pass the already-known residual vector at
/// `point`, which saves one evaluation per function for the forward and
/// backward schemes. A function declaring itself [`Evaluation::Undefined`]
/// at any probed point fails with [`Error::UndefinedResidual`].
pub fn build(
    fns: &[Box<ResidualFn<'_>>],
    point: &Vector,
    cfg: JacobianCfg,
    residual_at_point: Option<&Vector>,
) -> Result<Matrix, Error> {
    let h = cfg.step;
    let mut columns: Vec<Vector> = Vec::with_capacity(point.len());

    match cfg.scheme {
        // The one-sided schemes reuse the residual at the unperturbed point
        // for every column; take the caller's copy when it has one.
        Scheme::Forward => {
            let base = at_point(fns, point, residual_at_point)?;
            for j in 0..point.len() {
                let ahead = probe(fns, &point.with_entry(j, point[j] + h))?;
                columns.push(difference(&ahead, &base, h)?);
            }
        }
        Scheme::Backward => {
            let base = at_point(fns, point, residual_at_point)?;
            for j in 0..point.len() {
                let behind = probe(fns, &point.with_entry(j, point[j] - h))?;
                columns.push(difference(&base, &behind, h)?);
            }
        }
        Scheme::Center => {
            for j in 0..point.len() {
                let ahead = probe(fns, &point.with_entry(j, point[j] + h))?;
                let behind = probe(fns, &point.with_entry(j, point[j] - h))?;
                columns.push(difference(&ahead, &behind, 2.0 * h)?);
            }
        }
    }

    Ok(Matrix::from_rows_unchecked(columns).transpose())
}

/// Evaluate every residual function at `x`, failing on the first
/// [`Evaluation::Undefined`].
pub(crate) fn probe(fns: &[Box<ResidualFn<'_>>], x: &Vector) -> Result<Vector, Error> {
    fns.iter()
        .enumerate()
        .map(|(index, f)| match f(x) {
            Evaluation::Value(value) => Ok(value),
            Evaluation::Undefined => Err(Error::UndefinedResidual { index }),
        })
        .collect()
}

fn at_point(
    fns: &[Box<ResidualFn<'_>>],
    point: &Vector,
    known: Option<&Vector>,
) -> Result<Vector, Error> {
    match known {
        Some(values) => Ok(values.clone()),
        None => probe(fns, point),
    }
}

fn difference(upper: &Vector, lower: &Vector, denominator: f64) -> Result<Vector, Error> {
    Ok(upper.sub(lower)?.scale(1.0 / denominator))
}
