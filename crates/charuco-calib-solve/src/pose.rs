//! Board pose from a plane homography.

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

#[derive(thiserror::Error, Debug)]
pub enum PoseError {
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
    #[error("svd failed during rotation projection")]
    SvdFailed,
    #[error("homography has a vanishing column")]
    DegenerateHomography,
}

/// Decompose a board-plane homography `H` (plane -> image) into the board
/// pose `T_C_B` given intrinsics `K`.
///
/// The first two columns of `K^-1 H` are the rotation's first two columns up
/// to scale; the third gives the translation. The reassembled rotation is
/// projected onto SO(3) via SVD.
pub fn pose_from_homography(
    k_mtx: &Matrix3<f64>,
    h_mtx: &Matrix3<f64>,
) -> Result<Isometry3<f64>, PoseError> {
    let k_inv = k_mtx
        .try_inverse()
        .ok_or(PoseError::IntrinsicsNotInvertible)?;

    let k_inv_h1 = k_inv * h_mtx.column(0);
    let k_inv_h2 = k_inv * h_mtx.column(1);
    let h3 = h_mtx.column(2).into_owned();

    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    if norm1 < 1e-12 || norm2 < 1e-12 {
        return Err(PoseError::DegenerateHomography);
    }
    let lambda = 1.0 / ((norm1 + norm2) * 0.5);

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);

    let mut r_mat = Matrix3::<f64>::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    // Project onto SO(3) and keep det(R) = +1.
    let svd = r_mat.svd(true, true);
    let mut u = svd.u.ok_or(PoseError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PoseError::SvdFailed)?;
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let r_orth = u * v_t;

    let mut t_vec: Vector3<f64> = lambda * (k_inv * h3);
    let mut rot = r_orth;
    // A homography is only defined up to sign; keep the board in front of
    // the camera.
    if t_vec.z < 0.0 {
        t_vec = -t_vec;
        rot.column_mut(0).neg_mut();
        rot.column_mut(1).neg_mut();
    }

    let quat = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot));
    Ok(Isometry3::from_parts(Translation3::from(t_vec), quat))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kmtx() -> Matrix3<f64> {
        Matrix3::new(800.0, 0.0, 640.0, 0.0, 780.0, 360.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn recovers_pose_from_exact_homography() {
        let k = kmtx();
        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let t = Vector3::new(0.1, -0.05, 1.0);

        let r = rot.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));

        let iso = pose_from_homography(&k, &h).expect("pose");
        assert!((iso.translation.vector - t).norm() < 1e-9);

        let r_est = iso.rotation.to_rotation_matrix();
        let r_diff = r_est.matrix().transpose() * r;
        let angle = ((r_diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0).acos();
        assert!(angle < 1e-9, "rotation error {angle}");
    }

    #[test]
    fn sign_flipped_homography_still_puts_board_in_front() {
        let k = kmtx();
        let rot = Rotation3::from_euler_angles(0.05, 0.1, -0.05);
        let t = Vector3::new(0.0, 0.02, 0.8);

        let r = rot.matrix();
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));
        h.neg_mut();

        let iso = pose_from_homography(&k, &h).expect("pose");
        assert!(iso.translation.vector.z > 0.0);
        assert!((iso.translation.vector - t).norm() < 1e-9);
    }
}
