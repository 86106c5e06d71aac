//! Zhang's closed-form intrinsics from plane homographies.

use charuco_calib_core::CameraIntrinsics;
use nalgebra::{DMatrix, Matrix3, SVector};

#[derive(thiserror::Error, Debug)]
pub enum ZhangError {
    #[error("need at least 3 homographies for intrinsics estimation, got {0}")]
    NotEnoughViews(usize),
    #[error("svd failed")]
    SvdFailed,
    #[error("degenerate configuration: {0}")]
    Degenerate(&'static str),
}

/// Build the 6-vector v_ij(H) from Zhang's method for columns `i`, `j`.
fn v_ij(hmtx: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate the camera matrix K from a set of board-plane homographies.
///
/// Needs at least 3 homographies with distinct orientations; near-parallel
/// views make the absolute-conic system rank deficient and are reported as
/// [`ZhangError::Degenerate`].
pub fn estimate_intrinsics_from_homographies(
    hmtxs: &[Matrix3<f64>],
) -> Result<CameraIntrinsics, ZhangError> {
    if hmtxs.len() < 3 {
        return Err(ZhangError::NotEnoughViews(hmtxs.len()));
    }

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<f64>::zeros(2 * m, 6);

    for (k, hmtx) in hmtxs.iter().enumerate() {
        let v11 = v_ij(hmtx, 0, 0);
        let v22 = v_ij(hmtx, 1, 1);
        let v12 = v_ij(hmtx, 0, 1);

        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    // V b = 0: take the singular vector of the smallest singular value.
    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(ZhangError::SvdFailed)?;
    let b = v_t.row(v_t.nrows() - 1);

    let b11 = b[0];
    let b12 = b[1];
    let b22 = b[2];
    let b13 = b[3];
    let b23 = b[4];
    let b33 = b[5];

    // Closed-form recovery of (fx, fy, cx, cy, skew) from B = K^-T K^-1.
    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return Err(ZhangError::Degenerate(
            "B11*B22 - B12^2 vanishes; views too similar",
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() {
        return Err(ZhangError::Degenerate("invalid sign for lambda"));
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Ok(CameraIntrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    })
}
