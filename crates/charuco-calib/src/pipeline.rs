//! The two-stage calibration pipeline.
//!
//! Stage 1 ([`run_marker_stage`]) calibrates from raw marker corners and is
//! a sanity baseline plus the seed for stage 2. Stage 2
//! ([`run_charuco_stage`]) re-interpolates every frame's board corners with
//! the stage-1 camera and runs the authoritative ChArUco calibration. The
//! stage-1 result is a required argument of stage 2, so the dependency is a
//! compile-time precondition rather than a calling convention.

use crate::aggregate::{flatten_for_marker_calibration, reinterpolate_with_camera};
use crate::session::CalibrationDataset;
use charuco_calib_core::{Board, CameraIntrinsics, Distortion};
use charuco_calib_detect::InterpolatedCorners;
use charuco_calib_solve::{
    calibrate_with_corners, calibrate_with_markers, seed_camera_matrix, CalibrationFlags,
    CalibrationOutcome, CornerObservations, SolveError, SolveOptions,
};
use nalgebra::Isometry3;

/// Minimum frames with usable interpolated corners for the refined pass;
/// below this the solver is underdetermined in practice.
pub const MIN_CHARUCO_FRAMES: usize = 4;

/// User-facing calibration options shared by both stages.
#[derive(Clone, Copy, Debug, Default)]
pub struct CalibrationOptions {
    pub flags: CalibrationFlags,
    /// fx/fy ratio, meaningful only with `flags.fix_aspect_ratio`.
    pub aspect_ratio: f64,
}

/// Output of the coarse (marker-only) stage.
#[derive(Clone, Debug)]
pub struct MarkerCalibration {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
    pub reprojection_error: f64,
}

/// Final, authoritative calibration.
#[derive(Clone, Debug)]
pub struct CalibrationResult {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
    pub view_poses: Vec<Isometry3<f64>>,
    pub reprojection_error: f64,
    /// Stage-1 baseline error, kept for operator diagnostics.
    pub marker_reprojection_error: f64,
    pub image_size: (u32, u32),
    pub flags: CalibrationFlags,
    /// Present only when the fixed-aspect flag was set.
    pub aspect_ratio: Option<f64>,
    /// Per-frame refined corners, in dataset order (possibly empty entries),
    /// for post-calibration review rendering.
    pub refined_corners: Vec<InterpolatedCorners>,
}

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("no frames with detected markers; capture at least one frame before calibrating")]
    NoMarkerFrames,
    #[error(
        "only {got} frame(s) with usable interpolated corners; the refined pass needs at \
         least {min}"
    )]
    TooFewCornerFrames { got: usize, min: usize },
    #[error(transparent)]
    Solve(#[from] SolveError),
}

fn solve_options(options: &CalibrationOptions) -> SolveOptions {
    let initial = seed_camera_matrix(options.flags, options.aspect_ratio)
        .map(|k| CameraIntrinsics::from_k_matrix(&k));
    SolveOptions {
        flags: options.flags,
        aspect_ratio: options.aspect_ratio,
        initial,
        ..SolveOptions::default()
    }
}

/// Stage 1: marker-only (coarse) calibration.
pub fn run_marker_stage(
    dataset: &CalibrationDataset,
    board: &Board,
    options: &CalibrationOptions,
) -> Result<MarkerCalibration, CalibrationError> {
    let frames_with_markers = dataset
        .frames
        .iter()
        .filter(|f| !f.markers.is_empty())
        .count();
    if frames_with_markers == 0 {
        return Err(CalibrationError::NoMarkerFrames);
    }

    let flat = flatten_for_marker_calibration(&dataset.frames);
    let outcome =
        calibrate_with_markers(&flat, board, dataset.image_size, &solve_options(options))?;
    log::info!(
        "marker stage: {} frame(s), rms reprojection error {:.4} px",
        frames_with_markers,
        outcome.reprojection_error
    );

    Ok(MarkerCalibration {
        intrinsics: outcome.intrinsics,
        distortion: outcome.distortion,
        reprojection_error: outcome.reprojection_error,
    })
}

/// Stage 2: ChArUco (refined) calibration, seeded by stage 1.
pub fn run_charuco_stage(
    dataset: &CalibrationDataset,
    board: &Board,
    coarse: &MarkerCalibration,
    options: &CalibrationOptions,
) -> Result<CalibrationResult, CalibrationError> {
    let refined_corners =
        reinterpolate_with_camera(&dataset.frames, board, &coarse.intrinsics, &coarse.distortion);

    let usable = refined_corners.iter().filter(|c| c.len() >= 4).count();
    if usable < MIN_CHARUCO_FRAMES {
        return Err(CalibrationError::TooFewCornerFrames {
            got: usable,
            min: MIN_CHARUCO_FRAMES,
        });
    }

    let frames: Vec<CornerObservations> = refined_corners
        .iter()
        .filter(|c| c.len() >= 4)
        .map(|c| CornerObservations {
            points: c.points.clone(),
            ids: c.ids.clone(),
        })
        .collect();

    let solve_opts = SolveOptions {
        initial: Some(coarse.intrinsics),
        ..solve_options(options)
    };
    let outcome: CalibrationOutcome =
        calibrate_with_corners(&frames, board, dataset.image_size, &solve_opts)?;

    log::info!(
        "charuco stage: {} usable frame(s), rms {:.4} px (marker baseline {:.4} px)",
        usable,
        outcome.reprojection_error,
        coarse.reprojection_error
    );

    Ok(CalibrationResult {
        intrinsics: outcome.intrinsics,
        distortion: outcome.distortion,
        view_poses: outcome.view_poses,
        reprojection_error: outcome.reprojection_error,
        marker_reprojection_error: coarse.reprojection_error,
        image_size: dataset.image_size,
        flags: options.flags,
        aspect_ratio: options
            .flags
            .fix_aspect_ratio
            .then_some(options.aspect_ratio),
        refined_corners,
    })
}
