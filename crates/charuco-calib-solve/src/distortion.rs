//! Linear Brown-Conrady distortion fit from homography residuals.
//!
//! With intrinsics K and a per-view homography computed from the *distorted*
//! observations, the residual between the homography prediction and the
//! observation (both taken to normalized coordinates) is, to first order, a
//! linear function of the distortion coefficients. Stacking every point of
//! every view gives an overdetermined system solved by SVD. Intended as
//! initialization-grade estimation; severe wide-angle distortion breaks the
//! linearization.

use charuco_calib_core::Distortion;
use nalgebra::{DMatrix, DVector, Matrix3, Vector2, Vector3};

use crate::calibrate::ViewObservations;

#[derive(thiserror::Error, Debug)]
pub enum DistortionFitError {
    #[error("need at least {needed} points for distortion estimation, got {got}")]
    NotEnoughPoints { needed: usize, got: usize },
    #[error("view {0} has mismatched object/image point counts")]
    MismatchedView(usize),
    #[error("homography count {0} does not match view count {1}")]
    MismatchedHomographies(usize, usize),
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
    #[error("degenerate configuration: all points near the principal axis")]
    DegenerateConfiguration,
    #[error("svd failed during distortion estimation")]
    SvdFailed,
}

/// Which coefficients to estimate.
#[derive(Clone, Copy, Debug)]
pub struct DistortionFitOptions {
    /// Fix tangential coefficients (p1, p2) to zero.
    pub fix_tangential: bool,
    /// Fix the r^6 radial coefficient (k3) to zero. The k3 term overfits
    /// easily with ordinary calibration data.
    pub fix_k3: bool,
}

impl Default for DistortionFitOptions {
    fn default() -> Self {
        Self {
            fix_tangential: false,
            fix_k3: true,
        }
    }
}

fn to_normalized(k_inv: &Matrix3<f64>, x: f64, y: f64) -> Vector2<f64> {
    let v = k_inv * Vector3::new(x, y, 1.0);
    Vector2::new(v.x / v.z, v.y / v.z)
}

/// Estimate distortion coefficients given K, per-view homographies (fitted
/// from distorted observations) and the observations themselves.
pub fn estimate_distortion(
    k_mtx: &Matrix3<f64>,
    homographies: &[Matrix3<f64>],
    views: &[ViewObservations],
    opts: DistortionFitOptions,
) -> Result<Distortion, DistortionFitError> {
    if homographies.len() != views.len() {
        return Err(DistortionFitError::MismatchedHomographies(
            homographies.len(),
            views.len(),
        ));
    }
    for (i, v) in views.iter().enumerate() {
        if v.object.len() != v.image.len() {
            return Err(DistortionFitError::MismatchedView(i));
        }
    }

    let total_points: usize = views.iter().map(|v| v.object.len()).sum();
    let n_params: usize = match (opts.fix_tangential, opts.fix_k3) {
        (true, true) => 2,
        (true, false) => 3,
        (false, true) => 4,
        (false, false) => 5,
    };
    let min_points = n_params.div_ceil(2) + 2;
    if total_points < min_points {
        return Err(DistortionFitError::NotEnoughPoints {
            needed: min_points,
            got: total_points,
        });
    }

    let k_inv = k_mtx
        .try_inverse()
        .ok_or(DistortionFitError::IntrinsicsNotInvertible)?;

    let mut a = DMatrix::<f64>::zeros(2 * total_points, n_params);
    let mut b = DVector::<f64>::zeros(2 * total_points);
    let mut max_r2 = 0.0_f64;

    let mut row = 0;
    for (hom, view) in homographies.iter().zip(views) {
        for (obj, obs) in view.object.iter().zip(&view.image) {
            let ideal_h = hom * Vector3::new(obj.x, obj.y, 1.0);
            let n_ideal = to_normalized(&k_inv, ideal_h.x / ideal_h.z, ideal_h.y / ideal_h.z);
            let n_obs = to_normalized(&k_inv, obs.x, obs.y);

            let residual = n_obs - n_ideal;
            let x = n_ideal.x;
            let y = n_ideal.y;
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            max_r2 = max_r2.max(r2);

            let mut col = 0;
            a[(row, col)] = x * r2;
            a[(row + 1, col)] = y * r2;
            col += 1;

            a[(row, col)] = x * r4;
            a[(row + 1, col)] = y * r4;
            col += 1;

            if !opts.fix_k3 {
                let r6 = r4 * r2;
                a[(row, col)] = x * r6;
                a[(row + 1, col)] = y * r6;
                col += 1;
            }

            if !opts.fix_tangential {
                let xy = x * y;
                a[(row, col)] = 2.0 * xy;
                a[(row + 1, col)] = r2 + 2.0 * y * y;
                col += 1;

                a[(row, col)] = r2 + 2.0 * x * x;
                a[(row + 1, col)] = 2.0 * xy;
            }

            b[row] = residual.x;
            b[row + 1] = residual.y;
            row += 2;
        }
    }

    if max_r2 < 1e-6 {
        return Err(DistortionFitError::DegenerateConfiguration);
    }

    let svd = a.svd(true, true);
    let x = svd
        .solve(&b, 1e-10)
        .map_err(|_| DistortionFitError::SvdFailed)?;

    let mut col = 0;
    let k1 = x[col];
    col += 1;
    let k2 = x[col];
    col += 1;
    let k3 = if opts.fix_k3 {
        0.0
    } else {
        let v = x[col];
        col += 1;
        v
    };
    let (p1, p2) = if opts.fix_tangential {
        (0.0, 0.0)
    } else {
        (x[col], x[col + 1])
    };

    Ok(Distortion { k1, k2, k3, p1, p2 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Rotation3, Vector3};

    fn kmtx() -> Matrix3<f64> {
        Matrix3::new(800.0, 0.0, 640.0, 0.0, 800.0, 360.0, 0.0, 0.0, 1.0)
    }

    fn board_points() -> Vec<Point2<f64>> {
        (0..7)
            .flat_map(|i| (0..7).map(move |j| Point2::new(i as f64 * 0.03, j as f64 * 0.03)))
            .collect()
    }

    fn synthetic_view(
        k: &Matrix3<f64>,
        dist: &Distortion,
        rot: Rotation3<f64>,
        t: Vector3<f64>,
    ) -> (Matrix3<f64>, ViewObservations) {
        let object = board_points();
        let r = rot.matrix();

        // Pinhole homography H = K [r1 r2 t].
        let mut h = Matrix3::zeros();
        h.set_column(0, &(k * r.column(0)));
        h.set_column(1, &(k * r.column(1)));
        h.set_column(2, &(k * t));

        let image = object
            .iter()
            .map(|p| {
                let p3 = rot * Vector3::new(p.x, p.y, 0.0) + t;
                let n = dist.distort(Vector2::new(p3.x / p3.z, p3.y / p3.z));
                let px = k * Vector3::new(n.x, n.y, 1.0);
                Point2::new(px.x / px.z, px.y / px.z)
            })
            .collect();

        (h, ViewObservations { object, image })
    }

    #[test]
    fn recovers_radial_coefficients() {
        let k = kmtx();
        let dist_gt = Distortion {
            k1: -0.2,
            k2: 0.05,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
        };

        let poses = [
            (
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(0.1, -0.05, 1.0),
            ),
            (
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-0.05, 0.1, 1.2),
            ),
            (
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 0.9),
            ),
        ];

        let mut homs = Vec::new();
        let mut views = Vec::new();
        for (rot, t) in poses {
            let (h, v) = synthetic_view(&k, &dist_gt, rot, t);
            homs.push(h);
            views.push(v);
        }

        let opts = DistortionFitOptions {
            fix_tangential: true,
            fix_k3: true,
        };
        let est = estimate_distortion(&k, &homs, &views, opts).expect("fit");

        assert!((est.k1 - dist_gt.k1).abs() < 0.1, "k1 = {}", est.k1);
        assert!((est.k2 - dist_gt.k2).abs() < 0.05, "k2 = {}", est.k2);
        assert_eq!(est.p1, 0.0);
        assert_eq!(est.p2, 0.0);
        assert_eq!(est.k3, 0.0);
    }

    #[test]
    fn zero_distortion_data_fits_near_zero() {
        let k = kmtx();
        let dist_gt = Distortion::default();
        let (h, v) = synthetic_view(
            &k,
            &dist_gt,
            Rotation3::from_euler_angles(0.15, -0.05, 0.0),
            Vector3::new(0.02, 0.01, 1.0),
        );

        let est =
            estimate_distortion(&k, &[h], &[v], DistortionFitOptions::default()).expect("fit");
        assert!(est.k1.abs() < 1e-8);
        assert!(est.k2.abs() < 1e-6);
        assert!(est.p1.abs() < 1e-8);
    }

    #[test]
    fn too_few_points_rejected() {
        let k = kmtx();
        let view = ViewObservations {
            object: vec![Point2::new(0.0, 0.0)],
            image: vec![Point2::new(640.0, 360.0)],
        };
        assert!(matches!(
            estimate_distortion(
                &k,
                &[Matrix3::identity()],
                &[view],
                DistortionFitOptions::default()
            ),
            Err(DistortionFitError::NotEnoughPoints { .. })
        ));
    }
}
