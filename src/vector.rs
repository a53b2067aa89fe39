//! Dense fixed-length vectors.

use crate::{Error, matrix::Matrix};

/// A dense vector of `f64` entries. The length is fixed once created;
/// arithmetic between two vectors of different lengths is an error, never
/// a silent truncation.
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    entries: Vec<f64>,
}

impl Vector {
    /// Wrap the given entries.
    pub fn new(entries: Vec<f64>) -> Self {
        Self { entries }
    }

    /// A vector of `len` zeros.
    pub fn zeros(len: usize) -> Self {
        Self {
            entries: vec![0.0; len],
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the vector has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow the entries as a slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.entries
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.entries.iter()
    }

    /// Entrywise sum. Fails unless both vectors have the same length.
    pub fn add(&self, rhs: &Self) -> Result<Self, Error> {
        self.check_len("vector add", rhs)?;
        Ok(Self::new(
            self.iter().zip(rhs.iter()).map(|(a, b)| a + b).collect(),
        ))
    }

    /// Entrywise difference. Fails unless both vectors have the same length.
    pub fn sub(&self, rhs: &Self) -> Result<Self, Error> {
        self.check_len("vector sub", rhs)?;
        Ok(Self::new(
            self.iter().zip(rhs.iter()).map(|(a, b)| a - b).collect(),
        ))
    }

    /// Multiply every entry by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.iter().map(|a| a * factor).collect())
    }

    /// Scalar (dot) product. Fails unless both vectors have the same length.
    pub fn dot(&self, rhs: &Self) -> Result<f64, Error> {
        self.check_len("scalar product", rhs)?;
        Ok(self.iter().zip(rhs.iter()).map(|(a, b)| a * b).sum())
    }

    /// Tensor (outer) product: entry `(i, j)` of the result is
    /// `self[i] * rhs[j]`. Any pair of lengths is valid.
    pub fn tensor(&self, rhs: &Self) -> Matrix {
        let rows = self
            .iter()
            .map(|&a| Self::new(rhs.iter().map(|&b| a * b).collect()))
            .collect();
        // Every row has rhs.len() entries, so the rectangular invariant holds.
        Matrix::from_rows_unchecked(rows)
    }

    /// Euclidean norm.
    pub fn norm(&self) -> f64 {
        self.iter().map(|a| a * a).sum::<f64>().sqrt()
    }

    /// Largest absolute entry, or zero for an empty vector.
    pub fn max_abs(&self) -> f64 {
        self.iter().map(|a| a.abs()).fold(0.0, libm::fmax)
    }

    /// Copy-on-write entry replacement: a fresh vector with entry `index`
    /// set to `value`.
    pub fn with_entry(&self, index: usize, value: f64) -> Self {
        let mut out = self.clone();
        out.entries[index] = value;
        out
    }

    /// In-place entry replacement.
    pub fn set(&mut self, index: usize, value: f64) {
        self.entries[index] = value;
    }

    fn check_len(&self, operation: &'static str, rhs: &Self) -> Result<(), Error> {
        if self.len() == rhs.len() {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                operation,
                left: self.len(),
                right: rhs.len(),
            })
        }
    }
}

impl std::ops::Index<usize> for Vector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.entries[index]
    }
}

impl From<Vec<f64>> for Vector {
    fn from(entries: Vec<f64>) -> Self {
        Self::new(entries)
    }
}

impl FromIterator<f64> for Vector {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
