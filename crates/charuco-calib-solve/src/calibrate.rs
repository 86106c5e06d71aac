//! Two-stage ChArUco calibration entry points and the alternating solver.

use charuco_calib_core::{
    estimate_homography, Board, CameraIntrinsics, Distortion, HomographyError,
};
use nalgebra::{Isometry3, Matrix3, Point2, Point3, Vector2};

use crate::distortion::{estimate_distortion, DistortionFitError, DistortionFitOptions};
use crate::pose::{pose_from_homography, PoseError};
use crate::zhang::{estimate_intrinsics_from_homographies, ZhangError};

/// Calibration mode switches.
///
/// Named booleans instead of a raw bitmask; [`CalibrationFlags::bits`] gives
/// the stable on-disk encoding and [`CalibrationFlags::decode`] the
/// `+flag` string used in the output file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CalibrationFlags {
    pub use_intrinsic_guess: bool,
    pub fix_aspect_ratio: bool,
    pub fix_principal_point: bool,
    pub zero_tangent_dist: bool,
}

impl CalibrationFlags {
    pub fn bits(self) -> u32 {
        let mut bits = 0;
        if self.use_intrinsic_guess {
            bits |= 1;
        }
        if self.fix_aspect_ratio {
            bits |= 1 << 1;
        }
        if self.fix_principal_point {
            bits |= 1 << 2;
        }
        if self.zero_tangent_dist {
            bits |= 1 << 3;
        }
        bits
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            use_intrinsic_guess: bits & 1 != 0,
            fix_aspect_ratio: bits & (1 << 1) != 0,
            fix_principal_point: bits & (1 << 2) != 0,
            zero_tangent_dist: bits & (1 << 3) != 0,
        }
    }

    /// Human-readable `+name` concatenation of the active flags.
    pub fn decode(self) -> String {
        let mut out = String::new();
        if self.use_intrinsic_guess {
            out.push_str("+use_intrinsic_guess");
        }
        if self.fix_aspect_ratio {
            out.push_str("+fix_aspect_ratio");
        }
        if self.fix_principal_point {
            out.push_str("+fix_principal_point");
        }
        if self.zero_tangent_dist {
            out.push_str("+zero_tangent_dist");
        }
        out
    }
}

/// Solver options shared by both calibration passes.
#[derive(Clone, Copy, Debug)]
pub struct SolveOptions {
    pub flags: CalibrationFlags,
    /// fx/fy ratio enforced when `flags.fix_aspect_ratio` is set.
    pub aspect_ratio: f64,
    /// Alternating distortion/intrinsics refinement rounds.
    pub iterations: usize,
    /// Caller-provided intrinsics, required by `use_intrinsic_guess`.
    pub initial: Option<CameraIntrinsics>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            flags: CalibrationFlags::default(),
            aspect_ratio: 1.0,
            iterations: 2,
            initial: None,
        }
    }
}

/// One view's board-plane/pixel correspondences.
#[derive(Clone, Debug, Default)]
pub struct ViewObservations {
    pub object: Vec<Point2<f64>>,
    pub image: Vec<Point2<f64>>,
}

/// Marker observations of all frames, flattened for the coarse pass.
///
/// Invariant: `per_frame_counts` sums to `corners.len() == ids.len()`.
#[derive(Clone, Debug, Default)]
pub struct FlattenedMarkers {
    pub corners: Vec<[Point2<f64>; 4]>,
    pub ids: Vec<u32>,
    pub per_frame_counts: Vec<usize>,
}

impl FlattenedMarkers {
    pub fn check_invariant(&self) -> Result<(), SolveError> {
        let total: usize = self.per_frame_counts.iter().sum();
        if total != self.corners.len() || self.corners.len() != self.ids.len() {
            return Err(SolveError::InconsistentFlattening {
                counted: total,
                corners: self.corners.len(),
                ids: self.ids.len(),
            });
        }
        Ok(())
    }
}

/// Interpolated ChArUco corners of one frame (refined-pass input).
#[derive(Clone, Debug, Default)]
pub struct CornerObservations {
    pub points: Vec<Point2<f64>>,
    pub ids: Vec<u32>,
}

/// Result of one calibration pass.
#[derive(Clone, Debug)]
pub struct CalibrationOutcome {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
    /// Board pose per solved view, in acceptance order.
    pub view_poses: Vec<Isometry3<f64>>,
    /// RMS reprojection error in pixels over every point of every view.
    pub reprojection_error: f64,
}

#[derive(thiserror::Error, Debug)]
pub enum SolveError {
    #[error("no usable views for calibration")]
    NoViews,
    #[error("view {view} has only {got} usable correspondences (need >= 4)")]
    TooFewPointsInView { view: usize, got: usize },
    #[error("view {0} has mismatched point/id counts")]
    MismatchedView(usize),
    #[error("use_intrinsic_guess is set but no initial intrinsics were provided")]
    MissingInitialGuess,
    #[error(
        "flattened marker data is inconsistent (counts sum to {counted}, \
         {corners} corner quads, {ids} ids)"
    )]
    InconsistentFlattening {
        counted: usize,
        corners: usize,
        ids: usize,
    },
    #[error(transparent)]
    Homography(#[from] HomographyError),
    #[error(transparent)]
    Zhang(#[from] ZhangError),
    #[error(transparent)]
    Distortion(#[from] DistortionFitError),
    #[error(transparent)]
    Pose(#[from] PoseError),
}

/// Seed camera matrix mandated by `fix_aspect_ratio`: identity with the
/// configured ratio at `(0, 0)`. Without the flag there is no seeding.
pub fn seed_camera_matrix(flags: CalibrationFlags, aspect_ratio: f64) -> Option<Matrix3<f64>> {
    flags.fix_aspect_ratio.then(|| {
        let mut k = Matrix3::identity();
        k[(0, 0)] = aspect_ratio;
        k
    })
}

fn homographies(
    views: &[ViewObservations],
    camera: Option<(&CameraIntrinsics, &Distortion)>,
) -> Result<Vec<Matrix3<f64>>, SolveError> {
    views
        .iter()
        .map(|v| {
            let h = match camera {
                Some((intr, dist)) => {
                    let undistorted: Vec<Point2<f64>> = v
                        .image
                        .iter()
                        .map(|&p| intr.undistort_pixel(dist, p))
                        .collect();
                    estimate_homography(&v.object, &undistorted)?
                }
                None => estimate_homography(&v.object, &v.image)?,
            };
            Ok(h.h)
        })
        .collect()
}

fn fallback_intrinsics(image_size: (u32, u32), opts: &SolveOptions) -> CameraIntrinsics {
    // Focal prior of one image width, principal point at the center. Only
    // used when too few views exist for the closed-form init.
    let (w, h) = (image_size.0 as f64, image_size.1 as f64);
    let fy = w;
    let fx = if opts.flags.fix_aspect_ratio {
        opts.aspect_ratio * fy
    } else {
        fy
    };
    CameraIntrinsics {
        fx,
        fy,
        cx: w * 0.5,
        cy: h * 0.5,
        skew: 0.0,
    }
}

fn apply_constraints(
    intr: &mut CameraIntrinsics,
    image_size: (u32, u32),
    opts: &SolveOptions,
) {
    intr.skew = 0.0;
    if opts.flags.fix_aspect_ratio {
        intr.fx = opts.aspect_ratio * intr.fy;
    }
    if opts.flags.fix_principal_point {
        if let Some(initial) = opts.initial.filter(|_| opts.flags.use_intrinsic_guess) {
            intr.cx = initial.cx;
            intr.cy = initial.cy;
        } else {
            intr.cx = image_size.0 as f64 * 0.5;
            intr.cy = image_size.1 as f64 * 0.5;
        }
    }
}

fn initial_intrinsics(
    views: &[ViewObservations],
    image_size: (u32, u32),
    opts: &SolveOptions,
) -> Result<CameraIntrinsics, SolveError> {
    if opts.flags.use_intrinsic_guess {
        return opts.initial.ok_or(SolveError::MissingInitialGuess);
    }
    if views.len() >= 3 {
        let homs = homographies(views, None)?;
        match estimate_intrinsics_from_homographies(&homs) {
            Ok(est) => return Ok(est),
            Err(err) => {
                log::warn!("closed-form intrinsics init failed ({err}); using the seeded matrix")
            }
        }
    } else {
        log::info!(
            "only {} view(s); starting from the seeded camera matrix",
            views.len()
        );
    }
    Ok(fallback_intrinsics(image_size, opts))
}

fn rms_reprojection_error(
    views: &[ViewObservations],
    poses: &[Isometry3<f64>],
    intr: &CameraIntrinsics,
    dist: &Distortion,
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (view, pose) in views.iter().zip(poses) {
        for (obj, obs) in view.object.iter().zip(&view.image) {
            let p3 = pose.transform_point(&Point3::new(obj.x, obj.y, 0.0));
            if p3.z <= 0.0 {
                continue;
            }
            let n = Vector2::new(p3.x / p3.z, p3.y / p3.z);
            let pred = intr.project(dist.distort(n));
            sum += (pred - obs).norm_squared();
            count += 1;
        }
    }
    if count == 0 {
        return f64::INFINITY;
    }
    (sum / count as f64).sqrt()
}

/// Solve intrinsics, distortion and per-view poses from correspondences.
pub fn calibrate(
    views: &[ViewObservations],
    image_size: (u32, u32),
    opts: &SolveOptions,
) -> Result<CalibrationOutcome, SolveError> {
    if views.is_empty() {
        return Err(SolveError::NoViews);
    }
    for (i, v) in views.iter().enumerate() {
        if v.object.len() != v.image.len() {
            return Err(SolveError::MismatchedView(i));
        }
        if v.object.len() < 4 {
            return Err(SolveError::TooFewPointsInView {
                view: i,
                got: v.object.len(),
            });
        }
    }

    let fit_opts = DistortionFitOptions {
        fix_tangential: opts.flags.zero_tangent_dist,
        ..DistortionFitOptions::default()
    };

    let mut intrinsics = initial_intrinsics(views, image_size, opts)?;
    apply_constraints(&mut intrinsics, image_size, opts);
    let mut distortion = Distortion::default();

    for round in 0..opts.iterations.max(1) {
        // Homographies from the current best guess of undistorted pixels
        // (round 0: raw observations).
        let homs = if round == 0 {
            homographies(views, None)?
        } else {
            homographies(views, Some((&intrinsics, &distortion)))?
        };

        // Residuals against the original observations carry the distortion.
        distortion = estimate_distortion(&intrinsics.k_matrix(), &homs, views, fit_opts)?;

        if views.len() >= 3 {
            let homs_undist = homographies(views, Some((&intrinsics, &distortion)))?;
            match estimate_intrinsics_from_homographies(&homs_undist) {
                Ok(est) => intrinsics = est,
                Err(err) => log::warn!(
                    "intrinsics re-estimation failed in round {round} ({err}); keeping previous"
                ),
            }
            apply_constraints(&mut intrinsics, image_size, opts);
        }
    }

    let homs_final = homographies(views, Some((&intrinsics, &distortion)))?;
    let k = intrinsics.k_matrix();
    let view_poses = homs_final
        .iter()
        .map(|h| pose_from_homography(&k, h))
        .collect::<Result<Vec<_>, _>>()?;

    let reprojection_error = rms_reprojection_error(views, &view_poses, &intrinsics, &distortion);
    log::debug!(
        "calibration pass: {} views, rms reprojection error {:.4} px",
        views.len(),
        reprojection_error
    );

    Ok(CalibrationOutcome {
        intrinsics,
        distortion,
        view_poses,
        reprojection_error,
    })
}

/// Coarse pass: calibrate from raw marker corners.
///
/// Frames are reconstructed from `per_frame_counts`; markers whose id is not
/// on the board are dropped with a warning.
pub fn calibrate_with_markers(
    flat: &FlattenedMarkers,
    board: &Board,
    image_size: (u32, u32),
    opts: &SolveOptions,
) -> Result<CalibrationOutcome, SolveError> {
    flat.check_invariant()?;

    let mut views = Vec::with_capacity(flat.per_frame_counts.len());
    let mut idx = 0;
    for &count in &flat.per_frame_counts {
        let mut view = ViewObservations::default();
        for k in idx..idx + count {
            let id = flat.ids[k];
            let Some(obj) = board.marker_object_corners(id) else {
                log::warn!("marker id {id} is not on the board; ignoring its corners");
                continue;
            };
            view.object.extend_from_slice(&obj);
            view.image.extend_from_slice(&flat.corners[k]);
        }
        idx += count;
        if view.object.is_empty() {
            log::warn!("frame with no usable markers skipped in the coarse pass");
            continue;
        }
        views.push(view);
    }

    if views.is_empty() {
        return Err(SolveError::NoViews);
    }
    calibrate(&views, image_size, opts)
}

/// Refined pass: calibrate from interpolated ChArUco corners.
///
/// Frames with fewer than 4 corners cannot constrain a homography and are
/// skipped with a warning; callers enforce the minimum-frame policy before
/// getting here.
pub fn calibrate_with_corners(
    frames: &[CornerObservations],
    board: &Board,
    image_size: (u32, u32),
    opts: &SolveOptions,
) -> Result<CalibrationOutcome, SolveError> {
    let mut views = Vec::with_capacity(frames.len());
    for (i, frame) in frames.iter().enumerate() {
        if frame.points.len() != frame.ids.len() {
            return Err(SolveError::MismatchedView(i));
        }
        let mut view = ViewObservations::default();
        for (p, &id) in frame.points.iter().zip(&frame.ids) {
            let Some(obj) = board.corner_object_point(id) else {
                log::warn!("charuco corner id {id} is not on the board; ignoring");
                continue;
            };
            view.object.push(obj);
            view.image.push(*p);
        }
        if view.object.len() < 4 {
            if !view.object.is_empty() {
                log::warn!(
                    "frame {i} has only {} interpolated corners; skipping",
                    view.object.len()
                );
            }
            continue;
        }
        views.push(view);
    }

    if views.is_empty() {
        return Err(SolveError::NoViews);
    }
    calibrate(&views, image_size, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    #[test]
    fn flag_bits_round_trip() {
        let flags = CalibrationFlags {
            use_intrinsic_guess: false,
            fix_aspect_ratio: true,
            fix_principal_point: false,
            zero_tangent_dist: true,
        };
        assert_eq!(flags.bits(), 0b1010);
        assert_eq!(CalibrationFlags::from_bits(flags.bits()), flags);
        assert_eq!(flags.decode(), "+fix_aspect_ratio+zero_tangent_dist");
        assert_eq!(CalibrationFlags::default().decode(), "");
    }

    #[test]
    fn seed_matrix_only_with_fixed_aspect() {
        let ratio = 16.0 / 9.0;
        let flags = CalibrationFlags {
            fix_aspect_ratio: true,
            ..CalibrationFlags::default()
        };
        let k = seed_camera_matrix(flags, ratio).expect("seeded");
        assert_eq!(k[(0, 0)], ratio);
        assert_eq!(k[(1, 1)], 1.0);
        assert_eq!(k[(2, 2)], 1.0);
        assert_eq!(k[(0, 1)], 0.0);
        assert_eq!(k[(0, 2)], 0.0);

        assert!(seed_camera_matrix(CalibrationFlags::default(), ratio).is_none());
    }

    #[test]
    fn flattening_invariant_is_checked() {
        let flat = FlattenedMarkers {
            corners: vec![[Point2::new(0.0, 0.0); 4]; 3],
            ids: vec![0, 1, 2],
            per_frame_counts: vec![2, 2],
        };
        assert!(matches!(
            flat.check_invariant(),
            Err(SolveError::InconsistentFlattening { counted: 4, .. })
        ));
    }

    // Synthetic full-model views for the solver tests.
    fn make_views(
        intr: &CameraIntrinsics,
        dist: &Distortion,
        n_views: usize,
    ) -> Vec<ViewObservations> {
        let object: Vec<Point2<f64>> = (0..8)
            .flat_map(|i| (0..8).map(move |j| Point2::new(i as f64 * 0.03, j as f64 * 0.03)))
            .collect();

        let poses = [
            (
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(-0.1, -0.1, 0.9),
            ),
            (
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-0.05, -0.15, 1.1),
            ),
            (
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(-0.12, -0.08, 0.8),
            ),
            (
                Rotation3::from_euler_angles(0.0, 0.2, 0.1),
                Vector3::new(-0.08, -0.12, 1.0),
            ),
            (
                Rotation3::from_euler_angles(-0.1, 0.1, -0.05),
                Vector3::new(-0.1, -0.1, 0.95),
            ),
            (
                Rotation3::from_euler_angles(0.15, 0.05, 0.15),
                Vector3::new(-0.09, -0.11, 1.05),
            ),
        ];

        poses
            .iter()
            .take(n_views)
            .map(|(rot, t)| {
                let image = object
                    .iter()
                    .map(|p| {
                        let p3 = rot * Vector3::new(p.x, p.y, 0.0) + t;
                        let n = dist.distort(Vector2::new(p3.x / p3.z, p3.y / p3.z));
                        intr.project(n)
                    })
                    .collect();
                ViewObservations {
                    object: object.clone(),
                    image,
                }
            })
            .collect()
    }

    #[test]
    fn recovers_pinhole_camera_exactly() {
        let intr_gt = CameraIntrinsics {
            fx: 850.0,
            fy: 830.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        };
        let views = make_views(&intr_gt, &Distortion::default(), 5);
        let outcome =
            calibrate(&views, (1280, 720), &SolveOptions::default()).expect("calibrates");

        assert!((outcome.intrinsics.fx - intr_gt.fx).abs() < 0.1);
        assert!((outcome.intrinsics.fy - intr_gt.fy).abs() < 0.1);
        assert!((outcome.intrinsics.cx - intr_gt.cx).abs() < 0.5);
        assert!((outcome.intrinsics.cy - intr_gt.cy).abs() < 0.5);
        assert!(outcome.reprojection_error < 1e-3);
        assert_eq!(outcome.view_poses.len(), 5);
    }

    #[test]
    fn distorted_views_still_converge_below_a_pixel() {
        let intr_gt = CameraIntrinsics {
            fx: 850.0,
            fy: 850.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        };
        let dist_gt = Distortion {
            k1: -0.08,
            k2: 0.01,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
        };
        let views = make_views(&intr_gt, &dist_gt, 6);
        let opts = SolveOptions {
            iterations: 3,
            ..SolveOptions::default()
        };
        let outcome = calibrate(&views, (1280, 720), &opts).expect("calibrates");

        assert!(
            outcome.reprojection_error < 1.0,
            "rms {} px",
            outcome.reprojection_error
        );
        assert_eq!(dist_gt.k1.signum(), outcome.distortion.k1.signum());
    }

    #[test]
    fn fixed_aspect_ratio_is_enforced() {
        let intr_gt = CameraIntrinsics {
            fx: 900.0,
            fy: 900.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        };
        let views = make_views(&intr_gt, &Distortion::default(), 5);
        let opts = SolveOptions {
            flags: CalibrationFlags {
                fix_aspect_ratio: true,
                ..CalibrationFlags::default()
            },
            aspect_ratio: 1.0,
            ..SolveOptions::default()
        };
        let outcome = calibrate(&views, (1280, 720), &opts).expect("calibrates");
        assert!((outcome.intrinsics.fx / outcome.intrinsics.fy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_guess_is_rejected() {
        let intr = CameraIntrinsics {
            fx: 900.0,
            fy: 900.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        };
        let views = make_views(&intr, &Distortion::default(), 3);
        let opts = SolveOptions {
            flags: CalibrationFlags {
                use_intrinsic_guess: true,
                ..CalibrationFlags::default()
            },
            ..SolveOptions::default()
        };
        assert!(matches!(
            calibrate(&views, (1280, 720), &opts),
            Err(SolveError::MissingInitialGuess)
        ));
    }

    #[test]
    fn empty_input_is_no_views() {
        assert!(matches!(
            calibrate(&[], (1280, 720), &SolveOptions::default()),
            Err(SolveError::NoViews)
        ));
    }
}
