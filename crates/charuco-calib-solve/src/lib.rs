//! Planar intrinsic calibration.
//!
//! The solver consumes per-view 2D correspondences between board-plane
//! points (meters, z = 0) and observed pixels, and produces camera
//! intrinsics, Brown-Conrady distortion, per-view board poses and an RMS
//! reprojection error. The estimation is linear/alternating: per-view DLT
//! homographies, Zhang's closed-form intrinsics, a least-squares distortion
//! fit from homography residuals, and a few undistort-and-re-estimate
//! rounds. That is the initialization-grade pipeline of the classic
//! calibration stack; a full nonlinear bundle adjustment is intentionally
//! not part of this workspace.

mod calibrate;
mod distortion;
mod pose;
mod zhang;

pub use calibrate::{
    calibrate, calibrate_with_corners, calibrate_with_markers, seed_camera_matrix,
    CalibrationFlags, CalibrationOutcome, CornerObservations, FlattenedMarkers, SolveError,
    SolveOptions, ViewObservations,
};
pub use distortion::{estimate_distortion, DistortionFitError, DistortionFitOptions};
pub use pose::{pose_from_homography, PoseError};
pub use zhang::{estimate_intrinsics_from_homographies, ZhangError};
