//! Linear-system solvers over a feature matrix's Gram matrix.
//!
//! For a matrix `M` (rows = feature vectors) the solver answers
//! `x = (Mᵗ·M)⁻¹ · b`. The fold-in update uses the items' solver to turn an
//! item vector into a user correction and vice versa.

use crate::vectors::SharedVector;

/// Solves `A · x = b` for a fixed `A`.
pub trait Solver: Send + Sync {
    /// `x` for right-hand side `rhs`.
    fn solve(&self, rhs: &[f32]) -> Vec<f64>;

    /// Dimension of `A`.
    fn dimension(&self) -> usize;
}

/// Relative pivot size below which the Gram matrix is treated as singular.
const SINGULARITY_THRESHOLD: f64 = 1.0e-9;

/// Cholesky factorization `A = L·Lᵗ` of a symmetric positive definite matrix.
pub struct CholeskySolver {
    n: usize,
    /// Row-major lower-triangular factor.
    l: Vec<f64>,
}

impl CholeskySolver {
    /// Factor `Mᵗ·M` for the given rows. `None` if there are no rows or the
    /// Gram matrix is singular.
    pub fn from_rows<'a>(rows: impl IntoIterator<Item = &'a SharedVector>) -> Option<Self> {
        let mut n = 0;
        let mut gram: Vec<f64> = Vec::new();
        for row in rows {
            let values = row.read();
            if gram.is_empty() {
                n = values.len();
                if n == 0 {
                    return None;
                }
                gram = vec![0.0; n * n];
            }
            if values.len() != n {
                continue;
            }
            for i in 0..n {
                let vi = values[i] as f64;
                for j in 0..=i {
                    gram[i * n + j] += vi * values[j] as f64;
                }
            }
        }
        if gram.is_empty() {
            return None;
        }
        for i in 0..n {
            for j in 0..i {
                gram[j * n + i] = gram[i * n + j];
            }
        }
        Self::factor(n, &gram)
    }

    /// Factor a dense row-major symmetric matrix.
    pub fn factor(n: usize, a: &[f64]) -> Option<Self> {
        let max_diag = (0..n).map(|i| a[i * n + i].abs()).fold(0.0, f64::max);
        if max_diag == 0.0 || !max_diag.is_finite() {
            return None;
        }
        let mut l = vec![0.0; n * n];

        for i in 0..n {
            for j in 0..=i {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l[i * n + k] * l[j * n + k];
                }

                if i == j {
                    let diag = a[i * n + i] - sum;
                    if diag <= SINGULARITY_THRESHOLD * max_diag {
                        return None;
                    }
                    l[i * n + j] = diag.sqrt();
                } else {
                    l[i * n + j] = (a[i * n + j] - sum) / l[j * n + j];
                }
            }
        }

        Some(Self { n, l })
    }
}

impl Solver for CholeskySolver {
    fn solve(&self, rhs: &[f32]) -> Vec<f64> {
        let n = self.n;
        let l = &self.l;

        // Forward substitution: L * y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += l[i * n + j] * y[j];
            }
            y[i] = (rhs.get(i).copied().unwrap_or(0.0) as f64 - sum) / l[i * n + i];
        }

        // Backward substitution: L^T * x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += l[j * n + i] * x[j];
            }
            x[i] = (y[i] - sum) / l[i * n + i];
        }

        x
    }

    fn dimension(&self) -> usize {
        self.n
    }
}
