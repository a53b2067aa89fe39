//! Dense row-major matrices and QR decomposition.

use log::trace;

use crate::{Error, vector::Vector};

/// Diagonal entries below this are treated as linearly dependent columns.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// A dense matrix stored as a sequence of row vectors. All rows have the
/// same length; the rectangular invariant is checked at construction and
/// preserved by every operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: Vec<Vector>,
}

/// Which algorithm [`Matrix::qr`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QrMethod {
    /// Classical Gram-Schmidt: each column is orthogonalized against the
    /// projections of its *original* value. Kept for reference; numerically
    /// the weakest of the three.
    ClassicalGramSchmidt,
    /// Modified Gram-Schmidt: re-orthogonalizes against the column as it is
    /// being built. Prefer this in production.
    #[default]
    ModifiedGramSchmidt,
    /// Givens rotations: zero sub-diagonal entries with 2x2 rotations and
    /// accumulate Q as the product of rotation transposes. Zero pivot
    /// columns are skipped, so R may carry zero diagonal entries instead of
    /// failing outright.
    GivensRotation,
}

impl QrMethod {
    /// Human-readable method name, useful for debugging.
    #[mutants::skip]
    pub fn name(self) -> &'static str {
        match self {
            Self::ClassicalGramSchmidt => "classical Gram-Schmidt",
            Self::ModifiedGramSchmidt => "modified Gram-Schmidt",
            Self::GivensRotation => "Givens rotation",
        }
    }
}

/// The result of a QR decomposition: `a = q * r` with `q` orthonormal and
/// `r` upper triangular. Freshly computed and owned by the caller.
#[derive(Debug, Clone)]
pub struct Qr {
    /// Orthonormal factor.
    pub q: Matrix,
    /// Upper-triangular factor.
    pub r: Matrix,
}

impl Matrix {
    /// Build a matrix from row vectors. Fails if the rows are ragged.
    pub fn from_rows(rows: Vec<Vector>) -> Result<Self, Error> {
        if let Some(first) = rows.first() {
            for row in &rows {
                if row.len() != first.len() {
                    return Err(Error::DimensionMismatch {
                        operation: "matrix construction",
                        left: first.len(),
                        right: row.len(),
                    });
                }
            }
        }
        Ok(Self { rows })
    }

    /// Build a matrix from nested arrays of entries, mostly for tests and
    /// doc examples. Fails if the rows are ragged.
    pub fn from_entries(entries: Vec<Vec<f64>>) -> Result<Self, Error> {
        Self::from_rows(entries.into_iter().map(Vector::new).collect())
    }

    pub(crate) fn from_rows_unchecked(rows: Vec<Vector>) -> Self {
        Self { rows }
    }

    /// An `nrows x ncols` matrix of zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            rows: (0..nrows).map(|_| Vector::zeros(ncols)).collect(),
        }
    }

    /// The `n x n` identity matrix.
    pub fn identity(n: usize) -> Self {
        let mut out = Self::zeros(n, n);
        for i in 0..n {
            out.set(i, i, 1.0);
        }
        out
    }

    /// Number of rows.
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns (zero for an empty matrix).
    pub fn ncols(&self) -> usize {
        self.rows.first().map_or(0, Vector::len)
    }

    /// Borrow row `i`.
    pub fn row(&self, i: usize) -> &Vector {
        &self.rows[i]
    }

    /// Extract column `j` as a fresh vector.
    pub fn column(&self, j: usize) -> Vector {
        self.rows.iter().map(|row| row[j]).collect()
    }

    /// Extract the main diagonal as a fresh vector.
    pub fn diagonal(&self) -> Vector {
        (0..self.nrows().min(self.ncols()))
            .map(|i| self.get(i, i))
            .collect()
    }

    /// Entry at row `i`, column `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.rows[i][j]
    }

    /// Overwrite the entry at row `i`, column `j`.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.rows[i].set(j, value);
    }

    /// The transpose.
    pub fn transpose(&self) -> Self {
        Self {
            rows: (0..self.ncols()).map(|j| self.column(j)).collect(),
        }
    }

    /// Entrywise sum. Fails unless both matrices have the same shape.
    pub fn add(&self, rhs: &Self) -> Result<Self, Error> {
        self.check_shape("matrix add", rhs)?;
        let rows = self
            .rows
            .iter()
            .zip(&rhs.rows)
            .map(|(a, b)| a.add(b))
            .collect::<Result<_, _>>()?;
        Ok(Self { rows })
    }

    /// Entrywise difference. Fails unless both matrices have the same shape.
    pub fn sub(&self, rhs: &Self) -> Result<Self, Error> {
        self.check_shape("matrix sub", rhs)?;
        let rows = self
            .rows
            .iter()
            .zip(&rhs.rows)
            .map(|(a, b)| a.sub(b))
            .collect::<Result<_, _>>()?;
        Ok(Self { rows })
    }

    /// Multiply every entry by `factor`.
    pub fn mul_scalar(&self, factor: f64) -> Self {
        Self {
            rows: self.rows.iter().map(|row| row.scale(factor)).collect(),
        }
    }

    /// Matrix-vector product. Fails unless `self.ncols() == rhs.len()`.
    pub fn mul_vector(&self, rhs: &Vector) -> Result<Vector, Error> {
        if self.ncols() != rhs.len() {
            return Err(Error::DimensionMismatch {
                operation: "matrix-vector product",
                left: self.ncols(),
                right: rhs.len(),
            });
        }
        self.rows.iter().map(|row| row.dot(rhs)).collect()
    }

    /// Matrix-matrix product. Fails unless `self.ncols() == rhs.nrows()`.
    pub fn mul_matrix(&self, rhs: &Self) -> Result<Self, Error> {
        if self.ncols() != rhs.nrows() {
            return Err(Error::DimensionMismatch {
                operation: "matrix product",
                left: self.ncols(),
                right: rhs.nrows(),
            });
        }
        let rhs_columns: Vec<Vector> = (0..rhs.ncols()).map(|j| rhs.column(j)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                rhs_columns
                    .iter()
                    .map(|col| row.dot(col))
                    .collect::<Result<Vector, _>>()
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { rows })
    }

    /// Decompose `self = q * r` using the given algorithm.
    ///
    /// The Gram-Schmidt variants fail with [`Error::SingularSystem`] when a
    /// diagonal entry vanishes (linearly dependent columns); the Givens
    /// variant skips such columns instead.
    pub fn qr(&self, method: QrMethod) -> Result<Qr, Error> {
        trace!(
            "qr decomposition of a {}x{} matrix via {}",
            self.nrows(),
            self.ncols(),
            method.name()
        );
        match method {
            QrMethod::ClassicalGramSchmidt => self.qr_gram_schmidt(false),
            QrMethod::ModifiedGramSchmidt => self.qr_gram_schmidt(true),
            QrMethod::GivensRotation => Ok(self.qr_givens()),
        }
    }

    /// Both Gram-Schmidt flavors, iterating columns left to right.
    /// `modified` re-orthogonalizes against the column actually being
    /// built, which keeps the projections consistent with earlier rounding.
    fn qr_gram_schmidt(&self, modified: bool) -> Result<Qr, Error> {
        let n = self.ncols();
        let mut q_columns: Vec<Vector> = Vec::with_capacity(n);
        let mut r = Self::zeros(n, n);

        for j in 0..n {
            let original = self.column(j);
            let mut building = original.clone();
            for (k, q_k) in q_columns.iter().enumerate() {
                let projected = if modified { &building } else { &original };
                let r_kj = q_k.dot(projected)?;
                r.set(k, j, r_kj);
                building = building.sub(&q_k.scale(r_kj))?;
            }
            let r_jj = building.norm();
            if r_jj.abs() < PIVOT_TOLERANCE {
                return Err(Error::SingularSystem { column: j });
            }
            r.set(j, j, r_jj);
            q_columns.push(building.scale(1.0 / r_jj));
        }

        let q = Self::from_rows_unchecked(q_columns).transpose();
        Ok(Qr { q, r })
    }

    /// Givens rotations: for each column, rotate every sub-diagonal entry
    /// to zero using the 2x2 rotation of rows `(j, i)`, and apply the
    /// transposed rotation to the columns of the accumulating Q.
    // Exact zero tests are intentional here: only a true zero entry (or
    // pivot) degenerates the rotation to identity.
    #[allow(clippy::float_cmp)]
    fn qr_givens(&self) -> Qr {
        let m = self.nrows();
        let n = self.ncols();
        let mut r = self.clone();
        let mut q = Self::identity(m);

        for j in 0..n.min(m) {
            for i in (j + 1)..m {
                let a = r.get(j, j);
                let b = r.get(i, j);
                if b == 0.0 {
                    continue;
                }
                let radius = a.hypot(b);
                if radius == 0.0 {
                    // Zero pivot column: the rotation degenerates to an
                    // identity contribution, skip it.
                    continue;
                }
                let c = a / radius;
                let s = b / radius;
                for col in 0..n {
                    let upper = r.get(j, col);
                    let lower = r.get(i, col);
                    r.set(j, col, c * upper + s * lower);
                    r.set(i, col, -s * upper + c * lower);
                }
                for row in 0..m {
                    let left = q.get(row, j);
                    let right = q.get(row, i);
                    q.set(row, j, c * left + s * right);
                    q.set(row, i, -s * left + c * right);
                }
            }
        }

        Qr { q, r }
    }

    fn check_shape(&self, operation: &'static str, rhs: &Self) -> Result<(), Error> {
        if self.nrows() != rhs.nrows() {
            return Err(Error::DimensionMismatch {
                operation,
                left: self.nrows(),
                right: rhs.nrows(),
            });
        }
        if self.ncols() != rhs.ncols() {
            return Err(Error::DimensionMismatch {
                operation,
                left: self.ncols(),
                right: rhs.ncols(),
            });
        }
        Ok(())
    }
}
