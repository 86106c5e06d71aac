//! Synthetic scenes and a projective detector.
//!
//! Projects the board through a known camera model and hands the resulting
//! marker quads out through the [`FrameDetector`] seam. Used by the test
//! suites and as a headless stand-in detector for demos.

use crate::detector::{DetectedMarker, Detection, FrameDetector};
use crate::params::DetectorParams;
use charuco_calib_core::{Board, CameraIntrinsics, Distortion, GrayImageView};
use nalgebra::{Point2, Rotation3, Vector2, Vector3};
use std::path::Path;

/// Board pose in the camera frame.
///
/// `translation` is the position of the board *center*; the rotation is
/// applied about the center so that tilting a pose keeps the board in view.
#[derive(Clone, Copy, Debug)]
pub struct ScenePose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl ScenePose {
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64, translation: Vector3<f64>) -> Self {
        Self {
            rotation: Rotation3::from_euler_angles(roll, pitch, yaw),
            translation,
        }
    }
}

/// A board observed by a known camera from a set of poses.
#[derive(Clone, Debug)]
pub struct SyntheticScene {
    pub board: Board,
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
    pub image_size: (u32, u32),
    pub poses: Vec<ScenePose>,
}

const POSE_TABLE: [(f64, f64, f64, [f64; 3]); 8] = [
    (0.10, 0.00, 0.05, [0.02, -0.02, 0.55]),
    (-0.05, 0.15, -0.10, [-0.03, 0.03, 0.65]),
    (0.20, -0.10, 0.00, [0.00, 0.00, 0.50]),
    (0.00, 0.20, 0.10, [0.04, 0.04, 0.60]),
    (-0.10, 0.10, -0.05, [-0.04, -0.04, 0.58]),
    (0.15, 0.05, 0.15, [0.02, 0.03, 0.70]),
    (-0.15, -0.05, 0.08, [-0.02, 0.02, 0.52]),
    (0.05, -0.15, -0.12, [0.03, -0.03, 0.68]),
];

impl SyntheticScene {
    /// A 1280x720 camera with mildly unequal focal lengths and `n_views`
    /// tilted poses from a fixed table.
    pub fn standard(board: Board, n_views: usize) -> Self {
        let poses = (0..n_views)
            .map(|i| {
                let (r, p, y, t) = POSE_TABLE[i % POSE_TABLE.len()];
                // Push repeats of the table further back so no two poses
                // coincide.
                let extra = 0.04 * (i / POSE_TABLE.len()) as f64;
                ScenePose::from_euler(r, p, y, Vector3::new(t[0], t[1], t[2] + extra))
            })
            .collect();
        Self {
            board,
            intrinsics: CameraIntrinsics {
                fx: 900.0,
                fy: 880.0,
                cx: 640.0,
                cy: 360.0,
                skew: 0.0,
            },
            distortion: Distortion::default(),
            image_size: (1280, 720),
            poses,
        }
    }

    fn board_center(&self) -> Point2<f64> {
        let spec = self.board.spec();
        Point2::new(
            spec.squares_x as f64 * spec.square_length * 0.5,
            spec.squares_y as f64 * spec.square_length * 0.5,
        )
    }

    /// Project a board-plane point through pose + full camera model.
    pub fn project(&self, pose: &ScenePose, p: Point2<f64>) -> Point2<f64> {
        let c = self.board_center();
        let in_camera =
            pose.rotation * Vector3::new(p.x - c.x, p.y - c.y, 0.0) + pose.translation;
        let n = Vector2::new(in_camera.x / in_camera.z, in_camera.y / in_camera.z);
        self.intrinsics.project(self.distortion.distort(n))
    }

    fn in_frame(&self, p: Point2<f64>) -> bool {
        p.x >= 0.0
            && p.x < self.image_size.0 as f64
            && p.y >= 0.0
            && p.y < self.image_size.1 as f64
    }

    /// Full-board detection for pose `idx`; markers with any corner outside
    /// the frame are dropped, as a real detector would drop them.
    pub fn detection_for_pose(&self, idx: usize) -> Detection {
        let Some(pose) = self.poses.get(idx) else {
            return Detection::default();
        };
        let markers = (0..self.board.marker_count() as u32)
            .filter_map(|id| {
                let obj = self.board.marker_object_corners(id)?;
                let corners = obj.map(|o| self.project(pose, o));
                corners
                    .iter()
                    .all(|&p| self.in_frame(p))
                    .then_some(DetectedMarker { id, corners })
            })
            .collect();
        Detection {
            markers,
            rejected: vec![],
        }
    }
}

/// Detector that replays a [`SyntheticScene`] one pose per frame.
#[derive(Clone, Debug)]
pub struct ProjectedBoardDetector {
    scene: SyntheticScene,
    next: usize,
}

impl ProjectedBoardDetector {
    pub fn new(scene: SyntheticScene) -> Self {
        Self { scene, next: 0 }
    }

    pub fn scene(&self) -> &SyntheticScene {
        &self.scene
    }
}

impl FrameDetector for ProjectedBoardDetector {
    fn detect(
        &mut self,
        _image: &GrayImageView<'_>,
        _source: Option<&Path>,
        _params: &DetectorParams,
    ) -> Detection {
        let detection = self.scene.detection_for_pose(self.next);
        self.next += 1;
        detection
    }
}
