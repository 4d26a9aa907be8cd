//! Small dense linear algebra for belief covariances.
//!
//! Filters keep their state in `ndarray`; factorizations and inverses go through
//! `nalgebra` and come back as `ndarray` matrices.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::error::{Result, TrackError};

fn to_nalgebra(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn from_nalgebra(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Lower Cholesky factor of a symmetric positive-definite matrix.
///
/// Returns `None` when the matrix is not positive definite or holds non-finite entries.
pub fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    if !a.is_square() || a.iter().any(|v| !v.is_finite()) {
        return None;
    }
    to_nalgebra(a).cholesky().map(|c| from_nalgebra(&c.l()))
}

/// Square-root factor `L` with `L L^T = a` for a positive semi-definite matrix.
///
/// Rows and columns with a zero diagonal stay zero. A singular remainder falls back to
/// the symmetric eigendecomposition with negative eigenvalues clamped to zero.
fn psd_factor(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let active: Vec<usize> = (0..n).filter(|&i| a[[i, i]] > 0.0).collect();
    let mut l = Array2::<f64>::zeros((n, n));
    if active.is_empty() {
        return l;
    }
    let sub = DMatrix::from_fn(active.len(), active.len(), |i, j| a[[active[i], active[j]]]);
    let factor = match sub.clone().cholesky() {
        Some(c) => c.l(),
        None => {
            let eig = sub.symmetric_eigen();
            let sqrt_vals = eig.eigenvalues.map(|v| v.max(0.0).sqrt());
            eig.eigenvectors * DMatrix::from_diagonal(&sqrt_vals)
        }
    };
    for (i, &row) in active.iter().enumerate() {
        for (j, &col) in active.iter().enumerate() {
            l[[row, col]] = factor[(i, j)];
        }
    }
    l
}

/// Natural log of the determinant of a covariance matrix.
///
/// A covariance that is not positive definite means the filter diverged.
pub fn log_det(cov: &Array2<f64>) -> Result<f64> {
    let l = cholesky(cov).ok_or_else(|| {
        TrackError::NumericalError(format!(
            "covariance is not positive definite: {:?}",
            cov.as_slice().unwrap_or(&[])
        ))
    })?;
    Ok(2.0 * l.diag().iter().map(|d| d.ln()).sum::<f64>())
}

/// Inverse of a square matrix
pub fn inverse(a: &Array2<f64>) -> Result<Array2<f64>> {
    if !a.is_square() {
        return Err(TrackError::dimension_mismatch(
            format!("square matrix ({0}x{0})", a.nrows()),
            format!("{}x{}", a.nrows(), a.ncols()),
        ));
    }
    to_nalgebra(a)
        .try_inverse()
        .map(|inv| from_nalgebra(&inv))
        .ok_or_else(|| TrackError::NumericalError("singular matrix".to_string()))
}

/// Replace `a` by `(a + a^T) / 2`
pub fn symmetrize(a: &mut Array2<f64>) {
    let sym = (&*a + &a.t()) * 0.5;
    a.assign(&sym);
}

/// Draw from N(0, cov); `cov` may be singular (e.g. all zeros)
pub fn sample_gaussian<R: Rng + ?Sized>(cov: &Array2<f64>, rng: &mut R) -> Array1<f64> {
    let l = psd_factor(cov);
    let z: Array1<f64> = Array1::random_using(cov.nrows(), StandardNormal, rng);
    l.dot(&z)
}
