//! Pinhole camera model with Brown-Conrady distortion.

use nalgebra::{Matrix3, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Intrinsic camera parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub skew: f64,
}

impl CameraIntrinsics {
    /// The 3x3 camera matrix K.
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.skew, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn from_k_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            skew: k[(0, 1)],
        }
    }

    /// Normalized image-plane coordinates -> pixel.
    #[inline]
    pub fn project(&self, n: Vector2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * n.x + self.skew * n.y + self.cx,
            self.fy * n.y + self.cy,
        )
    }

    /// Pixel -> normalized image-plane coordinates.
    #[inline]
    pub fn unproject(&self, p: Point2<f64>) -> Vector2<f64> {
        let y = (p.y - self.cy) / self.fy;
        let x = (p.x - self.cx - self.skew * y) / self.fx;
        Vector2::new(x, y)
    }

    /// Map an observed (distorted) pixel to its ideal pinhole position.
    pub fn undistort_pixel(&self, dist: &Distortion, p: Point2<f64>) -> Point2<f64> {
        self.project(dist.undistort(self.unproject(p)))
    }

    /// Map an ideal pinhole pixel to where the lens would image it.
    pub fn distort_pixel(&self, dist: &Distortion, p: Point2<f64>) -> Point2<f64> {
        self.project(dist.distort(self.unproject(p)))
    }
}

/// Brown-Conrady distortion coefficients `(k1, k2, p1, p2, k3)`.
///
/// `coefficients()` returns them in that order, matching the usual on-disk
/// convention for 5-element distortion vectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub p1: f64,
    pub p2: f64,
}

const UNDISTORT_ITERS: usize = 8;

impl Distortion {
    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_coefficients(c: &[f64]) -> Self {
        Self {
            k1: c.first().copied().unwrap_or(0.0),
            k2: c.get(1).copied().unwrap_or(0.0),
            p1: c.get(2).copied().unwrap_or(0.0),
            p2: c.get(3).copied().unwrap_or(0.0),
            k3: c.get(4).copied().unwrap_or(0.0),
        }
    }

    fn distort_impl(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        (x * radial + x_tan, y * radial + y_tan)
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort(&self, n_undist: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = self.distort_impl(n_undist.x, n_undist.y);
        Vector2::new(x, y)
    }

    /// Invert the distortion by fixed-point iteration.
    pub fn undistort(&self, n_dist: Vector2<f64>) -> Vector2<f64> {
        let mut x = n_dist.x;
        let mut y = n_dist.y;
        for _ in 0..UNDISTORT_ITERS {
            let (xd, yd) = self.distort_impl(x, y);
            x -= xd - n_dist.x;
            y -= yd - n_dist.y;
        }
        Vector2::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 900.0,
            fy: 880.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        }
    }

    #[test]
    fn project_unproject_round_trip() {
        let intr = intrinsics();
        for n in [
            Vector2::new(0.0, 0.0),
            Vector2::new(0.2, -0.1),
            Vector2::new(-0.35, 0.3),
        ] {
            let back = intr.unproject(intr.project(n));
            assert_relative_eq!(back.x, n.x, epsilon = 1e-12);
            assert_relative_eq!(back.y, n.y, epsilon = 1e-12);
        }
    }

    #[test]
    fn k_matrix_round_trip() {
        let intr = intrinsics();
        let back = CameraIntrinsics::from_k_matrix(&intr.k_matrix());
        assert_relative_eq!(back.fx, intr.fx);
        assert_relative_eq!(back.cy, intr.cy);
    }

    #[test]
    fn undistort_inverts_distort() {
        let dist = Distortion {
            k1: -0.2,
            k2: 0.05,
            k3: 0.0,
            p1: 0.001,
            p2: -0.001,
        };
        for n in [
            Vector2::new(0.1, 0.1),
            Vector2::new(-0.3, 0.2),
            Vector2::new(0.25, -0.25),
        ] {
            let back = dist.undistort(dist.distort(n));
            assert_relative_eq!(back.x, n.x, epsilon = 1e-7);
            assert_relative_eq!(back.y, n.y, epsilon = 1e-7);
        }
    }

    #[test]
    fn coefficient_order_is_k1_k2_p1_p2_k3() {
        let dist = Distortion {
            k1: 1.0,
            k2: 2.0,
            k3: 5.0,
            p1: 3.0,
            p2: 4.0,
        };
        assert_eq!(dist.coefficients(), [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(Distortion::from_coefficients(&dist.coefficients()), dist);
    }
}
