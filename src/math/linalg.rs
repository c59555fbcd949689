//! Dense linear algebra for the fitter.
//!
//! Parameter dimension is tiny (four columns), so we favour robustness over speed:
//! - damped normal equations are solved with Cholesky (the damping keeps them
//!   positive definite; a failed factorization is reported, not panicked on)
//! - the covariance is built from an SVD of the weighted Jacobian, which also
//!   gives a direct rank test

use nalgebra::{DMatrix, DVector};

use crate::error::AnalysisError;

/// Solve `(A + λ·D) δ = g` where `D = diag(A)` floored at `min_diag`.
///
/// Returns `None` when the damped matrix is not positive definite.
pub fn solve_damped(a: &DMatrix<f64>, g: &DVector<f64>, lambda: f64, min_diag: f64) -> Option<DVector<f64>> {
    let mut m = a.clone();
    for i in 0..m.nrows() {
        m[(i, i)] += lambda * a[(i, i)].max(min_diag);
    }
    let chol = m.cholesky()?;
    let step = chol.solve(g);
    if step.iter().all(|v| v.is_finite()) {
        Some(step)
    } else {
        None
    }
}

/// Covariance `(JᵀJ)⁻¹` of a weighted Jacobian `J` (rows already divided by sigma).
///
/// Uses `J = U S Vᵀ` so that `(JᵀJ)⁻¹ = V S⁻² Vᵀ`. Singular values below
/// `ε · max(n, p) · s_max` mark the Jacobian as rank-deficient.
pub fn covariance_from_jacobian(j: &DMatrix<f64>) -> Result<DMatrix<f64>, AnalysisError> {
    let (n, p) = j.shape();
    if n < p {
        return Err(AnalysisError::DegenerateCovariance {
            reason: format!("{n} points cannot determine {p} parameters"),
        });
    }
    if j.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::DegenerateCovariance {
            reason: "non-finite Jacobian at the optimum".to_string(),
        });
    }

    let svd = j.clone().svd(false, true);
    let v_t = svd.v_t.ok_or_else(|| AnalysisError::DegenerateCovariance {
        reason: "SVD did not produce right singular vectors".to_string(),
    })?;
    let s = &svd.singular_values;

    let s_max = s.iter().copied().fold(0.0_f64, f64::max);
    let threshold = f64::EPSILON * n.max(p) as f64 * s_max;
    let rank = s.iter().filter(|&&v| v > threshold).count();
    if s_max <= 0.0 || rank < p {
        return Err(AnalysisError::DegenerateCovariance {
            reason: format!("Jacobian rank {rank} < {p} parameters"),
        });
    }

    let mut cov = DMatrix::<f64>::zeros(p, p);
    for k in 0..s.len() {
        let inv_s2 = 1.0 / (s[k] * s[k]);
        for a in 0..p {
            for b in 0..p {
                cov[(a, b)] += v_t[(k, a)] * v_t[(k, b)] * inv_s2;
            }
        }
    }

    // Symmetrize away rounding noise.
    let cov = (&cov + cov.transpose()) * 0.5;
    if cov.iter().any(|v| !v.is_finite()) || (0..p).any(|i| cov[(i, i)] < 0.0) {
        return Err(AnalysisError::DegenerateCovariance {
            reason: "covariance is not positive semi-definite".to_string(),
        });
    }
    Ok(cov)
}

/// Convert a square matrix to nested rows (for serialization).
pub fn to_rows(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..m.nrows())
        .map(|i| (0..m.ncols()).map(|j| m[(i, j)]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damped_solve_matches_plain_solve_at_zero_damping() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let g = DVector::from_row_slice(&[1.0, 2.0]);
        let x = solve_damped(&a, &g, 0.0, 1e-12).unwrap();
        let back = &a * &x;
        assert!((back[0] - 1.0).abs() < 1e-12);
        assert!((back[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn covariance_of_line_fit() {
        // Straight line y = p0 + p1 x with unit sigma on x = [0, 1, 2].
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let cov = covariance_from_jacobian(&j).unwrap();
        // (JᵀJ)⁻¹ = [[3, 3], [3, 5]]⁻¹ = 1/6 · [[5, -3], [-3, 3]]
        assert!((cov[(0, 0)] - 5.0 / 6.0).abs() < 1e-12);
        assert!((cov[(0, 1)] + 0.5).abs() < 1e-12);
        assert!((cov[(1, 0)] - cov[(0, 1)]).abs() < 1e-15);
        assert!((cov[(1, 1)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rank_deficient_jacobian_is_rejected() {
        // Second column is twice the first.
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        let err = covariance_from_jacobian(&j).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateCovariance { .. }));
    }
}
