//! Feature vectors and the vector kernels used for scoring.
//!
//! - Dot product (AVX2 + FMA when the build enables it, auto-vectorized otherwise)
//! - Euclidean norm
//! - Cosine similarity
//!
//! A [`FeatureVector`] is one row of a feature matrix. Its contents sit behind
//! their own `RwLock` so fold-in updates can write a row while scans of other
//! rows proceed, and a scan never observes a half-applied update of a row.

#[cfg(all(target_arch = "x86_64", target_feature = "avx2", target_feature = "fma"))]
use std::arch::x86_64::*;

use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

/// Shared handle to a matrix row.
pub type SharedVector = Arc<FeatureVector>;

#[derive(Debug)]
pub struct FeatureVector {
    rank: usize,
    values: RwLock<Vec<f32>>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            rank: values.len(),
            values: RwLock::new(values),
        }
    }

    pub fn zeros(rank: usize) -> Self {
        Self::new(vec![0.0; rank])
    }

    pub fn shared(values: Vec<f32>) -> SharedVector {
        Arc::new(Self::new(values))
    }

    /// Length of the row. Fixed at construction.
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Read access for the duration of the guard.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<f32>> {
        self.values.read()
    }

    pub fn snapshot(&self) -> Vec<f32> {
        self.values.read().clone()
    }

    /// `row += weight * delta`, elementwise, under the row's write lock.
    pub fn add_scaled(&self, weight: f64, delta: &[f64]) {
        let mut values = self.values.write();
        for (v, d) in values.iter_mut().zip(delta) {
            *v += (weight * d) as f32;
        }
    }
}

/// Dot product accumulated into `f64`.
#[cfg(not(all(target_arch = "x86_64", target_feature = "avx2", target_feature = "fma")))]
#[inline(always)]
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum()
}

/// Dot product on the AVX2 path; the build already guarantees the features.
#[cfg(all(target_arch = "x86_64", target_feature = "avx2", target_feature = "fma"))]
#[inline(always)]
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    unsafe { dot_avx2(a, b) as f64 }
}

#[inline]
pub fn norm(a: &[f32]) -> f64 {
    a.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt()
}

/// Cosine similarity. NaN when either vector has zero length; callers drop
/// non-finite scores.
#[inline]
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    dot(a, b) / (norm(a) * norm(b))
}

/// Cosine when the norm of `b` is already known.
#[inline]
pub fn cosine_with_norm(a: &[f32], b: &[f32], b_norm: f64) -> f64 {
    dot(a, b) / (norm(a) * b_norm)
}

/// AVX2 Dot Product
#[cfg(all(target_arch = "x86_64", target_feature = "avx2", target_feature = "fma"))]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn dot_avx2(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let mut sum = _mm256_setzero_ps();

    let mut i = 0;
    while i + 8 <= n {
        unsafe {
            let va = _mm256_loadu_ps(a.as_ptr().add(i));
            let vb = _mm256_loadu_ps(b.as_ptr().add(i));
            sum = _mm256_fmadd_ps(va, vb, sum);
        }
        i += 8;
    }

    let mut res = [0.0f32; 8];
    unsafe { _mm256_storeu_ps(res.as_mut_ptr(), sum) };

    let mut total = res.iter().sum::<f32>();

    while i < n {
        total += a[i] * b[i];
        i += 1;
    }

    total
}
