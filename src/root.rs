//! Safeguarded 1-D root proposal: Newton steps off a fitted local model,
//! falling back to weighted bisection inside the nearest sign-change
//! bracket.
//!
//! Equilibrium searches (strain-balancing, boundary-curvature scans) call
//! [`solve`] once per iteration: they append their latest
//! `(variable, residual)` pair to an [`Observations`] arena and get the
//! next trial variable back.

use log::{debug, trace};

use crate::{Error, linear, matrix::Matrix, vector::Vector};

/// Bisection weights tried in order until a candidate is not already an
/// observed variable value. The skewed weights break out of cycles where
/// the midpoint keeps landing on known points.
const BISECTION_WEIGHTS: [f64; 9] = [0.5, 0.01, 0.99, 0.25, 0.75, 0.1, 0.9, 0.4, 0.6];

/// One observed `(variable, residual)` pair from an equilibrium iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// The trial value of the free variable.
    pub variable: f64,
    /// The equilibrium residual at that value.
    pub residual: f64,
}

/// Append-only record of what an equilibrium search has seen so far.
/// Records are never reordered in place; the sorted and bracket views are
/// derived on demand.
#[derive(Debug, Clone, Default)]
pub struct Observations {
    records: Vec<Observation>,
}

impl Observations {
    /// An empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an arena from `(variable, residual)` pairs in iteration order.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        let records = pairs
            .iter()
            .map(|&(variable, residual)| Observation { variable, residual })
            .collect();
        Self { records }
    }

    /// Append the latest iterate.
    pub fn push(&mut self, variable: f64, residual: f64) {
        self.records.push(Observation { variable, residual });
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if nothing has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The records in iteration order.
    pub fn records(&self) -> &[Observation] {
        &self.records
    }

    /// Derived view: records sorted by absolute residual, nearest zero
    /// first. Ties keep iteration order.
    pub fn sorted_by_residual(&self) -> Vec<Observation> {
        let mut sorted = self.records.clone();
        sorted.sort_by(|a, b| a.residual.abs().total_cmp(&b.residual.abs()));
        sorted
    }

    /// Derived view: the observation whose residual is nearest zero.
    pub fn nearest_zero(&self) -> Option<Observation> {
        self.records
            .iter()
            .copied()
            .min_by(|a, b| a.residual.abs().total_cmp(&b.residual.abs()))
    }

    /// Derived view: the bracketing pair, i.e. the nonnegative-residual
    /// observation nearest zero and the negative-residual observation
    /// nearest zero. `None` when all residuals share one sign.
    pub fn bracket(&self) -> Option<(Observation, Observation)> {
        let above = self
            .records
            .iter()
            .copied()
            .filter(|o| o.residual >= 0.0)
            .min_by(|a, b| a.residual.total_cmp(&b.residual))?;
        let below = self
            .records
            .iter()
            .copied()
            .filter(|o| o.residual < 0.0)
            .max_by(|a, b| a.residual.total_cmp(&b.residual))?;
        Some((above, below))
    }

    /// True if this exact variable value was already tried.
    #[allow(clippy::float_cmp)]
    pub fn contains_variable(&self, variable: f64) -> bool {
        self.records.iter().any(|o| o.variable == variable)
    }
}

/// Propose the next trial variable from the observations so far.
///
/// Fits a local model (a line through 2 observations, a least-squares
/// quadratic through 3 or more) with the variable as the independent axis,
/// takes a Newton step off the model, and accepts it only if it lies
/// strictly inside the nearest sign-change bracket. Otherwise, or when
/// `use_fallback` is set, the bracket is split by weighted bisection.
///
/// Fails with [`Error::NoBracket`] when all residuals share one sign: the
/// caller must widen its own search range, extrapolating here would leave
/// the region the observations vouch for.
#[allow(clippy::float_cmp)]
pub fn solve(observations: &Observations, use_fallback: bool) -> Result<f64, Error> {
    let Some((above, below)) = observations.bracket() else {
        return Err(Error::NoBracket {
            observations: observations.len(),
        });
    };
    let lower = above.variable.min(below.variable);
    let upper = above.variable.max(below.variable);

    // Anchor at the observation nearest equilibrium. An exact root needs no
    // further iteration at all.
    let anchor = observations
        .nearest_zero()
        .expect("bracket implies at least one observation");
    if anchor.residual == 0.0 {
        return Ok(anchor.variable);
    }

    if !use_fallback {
        if let Some(step) = newton_step(observations, anchor) {
            if step > lower && step < upper {
                trace!("newton step {step} accepted inside bracket [{lower}, {upper}]");
                return Ok(step);
            }
            debug!("newton step {step} outside bracket [{lower}, {upper}], bisecting");
        }
    }

    bisect(observations, lower, upper)
}

/// The Newton step `x - f(x)/f'(x)` off a model fitted through the
/// observations. `None` when the fit is degenerate (repeated variable
/// values, vanishing derivative), which sends the caller to bisection.
fn newton_step(observations: &Observations, anchor: Observation) -> Option<f64> {
    let (value, derivative) = if observations.len() == 2 {
        let [a, b] = observations.records() else {
            return None;
        };
        let slope = (b.residual - a.residual) / (b.variable - a.variable);
        (anchor.residual, slope)
    } else {
        let (quadratic, linear, constant) = fit_quadratic(observations)?;
        let value = evaluate_quadratic(quadratic, linear, constant, anchor.variable);
        let derivative = 2.0 * quadratic * anchor.variable + linear;
        (value, derivative)
    };

    if !derivative.is_finite() || derivative == 0.0 {
        return None;
    }
    let step = anchor.variable - value / derivative;
    step.is_finite().then_some(step)
}

/// Closed-form least-squares fit of `r = a*x^2 + b*x + c` through all
/// observations, via the 3x3 normal equations and the QR linear solver.
fn fit_quadratic(observations: &Observations) -> Option<(f64, f64, f64)> {
    let records = observations.records();
    let mut power_sums = [0.0; 5];
    let mut moment_sums = [0.0; 3];
    for o in records {
        let x = o.variable;
        let powers = [1.0, x, x * x, x * x * x, x * x * x * x];
        for (sum, power) in power_sums.iter_mut().zip(powers) {
            *sum += power;
        }
        for (sum, power) in moment_sums.iter_mut().zip(powers) {
            *sum += power * o.residual;
        }
    }
    let normal = Matrix::from_entries(vec![
        vec![power_sums[4], power_sums[3], power_sums[2]],
        vec![power_sums[3], power_sums[2], power_sums[1]],
        vec![power_sums[2], power_sums[1], power_sums[0]],
    ])
    .ok()?;
    let rhs = Vector::new(vec![moment_sums[2], moment_sums[1], moment_sums[0]]);
    let coefficients = linear::solve(&normal, &rhs).ok()?;
    Some((coefficients[0], coefficients[1], coefficients[2]))
}

fn evaluate_quadratic(quadratic: f64, linear: f64, constant: f64, x: f64) -> f64 {
    (quadratic * x + linear) * x + constant
}

/// Weighted bisection between the bracket ends, skipping candidates that
/// were already observed.
fn bisect(observations: &Observations, lower: f64, upper: f64) -> Result<f64, Error> {
    for weight in BISECTION_WEIGHTS {
        let candidate = lower + weight * (upper - lower);
        if !observations.contains_variable(candidate) {
            trace!("bisection candidate {candidate} at weight {weight}");
            return Ok(candidate);
        }
    }
    Err(Error::BisectionExhausted { lower, upper })
}
