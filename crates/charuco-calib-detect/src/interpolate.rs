//! ChArUco corner interpolation from detected markers.
//!
//! The detected marker corners of one frame constrain a single board-to-image
//! homography (the board is planar); the inner chessboard corners are read
//! off by projecting their object points through it. Two variants exist:
//! the capture-time one with no camera model, and the refined one that
//! undistorts observations with a coarse intrinsic estimate first and bends
//! the projections back through the lens model.

use crate::detector::DetectedMarker;
use charuco_calib_core::{estimate_homography, Board, CameraIntrinsics, Distortion};
use nalgebra::Point2;

/// Interpolated inner-corner observations, ordered by corner id.
///
/// May be empty (interpolation failed or nothing landed inside the frame)
/// but is always present, so frames are never silently dropped before the
/// minimum-count checks.
#[derive(Clone, Debug, Default)]
pub struct InterpolatedCorners {
    pub points: Vec<Point2<f64>>,
    pub ids: Vec<u32>,
}

impl InterpolatedCorners {
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Interpolate inner corners with no camera model (capture-time variant).
pub fn interpolate_corners(
    markers: &[DetectedMarker],
    board: &Board,
    image_size: (u32, u32),
) -> InterpolatedCorners {
    interpolate_impl(markers, board, image_size, None)
}

/// Interpolate inner corners using a coarse intrinsic estimate.
///
/// Observed marker corners are undistorted before the homography fit, and
/// projected corners are re-distorted into observed pixel space, so the
/// output is directly comparable with raw detections.
pub fn interpolate_corners_with_camera(
    markers: &[DetectedMarker],
    board: &Board,
    image_size: (u32, u32),
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> InterpolatedCorners {
    interpolate_impl(markers, board, image_size, Some((intrinsics, distortion)))
}

fn interpolate_impl(
    markers: &[DetectedMarker],
    board: &Board,
    image_size: (u32, u32),
    camera: Option<(&CameraIntrinsics, &Distortion)>,
) -> InterpolatedCorners {
    let mut object_pts = Vec::with_capacity(markers.len() * 4);
    let mut image_pts = Vec::with_capacity(markers.len() * 4);

    for marker in markers {
        let Some(obj) = board.marker_object_corners(marker.id) else {
            log::debug!("marker id {} is not on the board; skipping", marker.id);
            continue;
        };
        for (o, &i) in obj.iter().zip(marker.corners.iter()) {
            object_pts.push(*o);
            image_pts.push(match camera {
                Some((intr, dist)) => intr.undistort_pixel(dist, i),
                None => i,
            });
        }
    }

    if object_pts.len() < 4 {
        return InterpolatedCorners::default();
    }

    let hom = match estimate_homography(&object_pts, &image_pts) {
        Ok(h) => h,
        Err(err) => {
            log::debug!("corner interpolation homography failed: {err}");
            return InterpolatedCorners::default();
        }
    };

    let (w, h) = (image_size.0 as f64, image_size.1 as f64);
    let mut out = InterpolatedCorners::default();
    for id in 0..board.corner_count() as u32 {
        let Some(obj) = board.corner_object_point(id) else {
            continue;
        };
        let mut p = hom.apply(obj);
        if let Some((intr, dist)) = camera {
            p = intr.distort_pixel(dist, p);
        }
        if p.x >= 0.0 && p.x < w && p.y >= 0.0 && p.y < h {
            out.points.push(p);
            out.ids.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use charuco_calib_core::{BoardSpec, DictionaryId, Homography};
    use nalgebra::Matrix3;

    fn board() -> Board {
        Board::new(BoardSpec {
            squares_x: 5,
            squares_y: 7,
            square_length: 0.04,
            marker_length: 0.02,
            dictionary: DictionaryId::Dict6x6_250,
        })
        .expect("valid board")
    }

    fn markers_through(h: &Homography, board: &Board) -> Vec<DetectedMarker> {
        (0..board.marker_count() as u32)
            .map(|id| {
                let obj = board.marker_object_corners(id).expect("marker on board");
                DetectedMarker {
                    id,
                    corners: [
                        h.apply(obj[0]),
                        h.apply(obj[1]),
                        h.apply(obj[2]),
                        h.apply(obj[3]),
                    ],
                }
            })
            .collect()
    }

    #[test]
    fn recovers_corners_under_known_homography() {
        let board = board();
        // Board meters -> pixels: ~3000 px/m with a slight perspective term.
        let h = Homography::new(Matrix3::new(
            3000.0, 40.0, 120.0, //
            -30.0, 3100.0, 90.0, //
            0.02, 0.01, 1.0,
        ));
        let markers = markers_through(&h, &board);

        let corners = interpolate_corners(&markers, &board, (1280, 720));
        assert_eq!(corners.len(), board.corner_count());
        for (p, id) in corners.points.iter().zip(&corners.ids) {
            let expected = h.apply(board.corner_object_point(*id).expect("corner"));
            assert!((p.x - expected.x).abs() < 1e-6);
            assert!((p.y - expected.y).abs() < 1e-6);
        }
    }

    #[test]
    fn corners_outside_the_frame_are_dropped() {
        let board = board();
        let h = Homography::new(Matrix3::new(
            3000.0, 0.0, -300.0, //
            0.0, 3000.0, 60.0, //
            0.0, 0.0, 1.0,
        ));
        let markers = markers_through(&h, &board);
        let corners = interpolate_corners(&markers, &board, (400, 720));
        assert!(corners.len() < board.corner_count());
        for p in &corners.points {
            assert!(p.x >= 0.0 && p.x < 400.0);
        }
    }

    #[test]
    fn too_few_markers_yield_empty_but_present_result() {
        let board = board();
        let corners = interpolate_corners(&[], &board, (1280, 720));
        assert!(corners.is_empty());
        assert_eq!(corners.points.len(), corners.ids.len());
    }

    #[test]
    fn camera_variant_inverts_the_lens_model() {
        let board = board();
        let intr = CameraIntrinsics {
            fx: 900.0,
            fy: 900.0,
            cx: 640.0,
            cy: 360.0,
            skew: 0.0,
        };
        let dist = Distortion {
            k1: -0.15,
            k2: 0.03,
            k3: 0.0,
            p1: 0.0005,
            p2: -0.0005,
        };
        // Pinhole board pose: fronto-parallel at 0.6 m, roughly centered.
        let pinhole = Homography::new(Matrix3::new(
            900.0 / 0.6,
            0.0,
            640.0 - 0.1 * 900.0 / 0.6,
            0.0,
            900.0 / 0.6,
            360.0 - 0.14 * 900.0 / 0.6,
            0.0,
            0.0,
            1.0,
        ));

        // Observed = distorted pinhole projection.
        let markers: Vec<DetectedMarker> = (0..board.marker_count() as u32)
            .map(|id| {
                let obj = board.marker_object_corners(id).expect("marker");
                let c = obj.map(|o| intr.distort_pixel(&dist, pinhole.apply(o)));
                DetectedMarker { id, corners: c }
            })
            .collect();

        let corners =
            interpolate_corners_with_camera(&markers, &board, (1280, 720), &intr, &dist);
        assert_eq!(corners.len(), board.corner_count());
        for (p, id) in corners.points.iter().zip(&corners.ids) {
            let expected = intr.distort_pixel(
                &dist,
                pinhole.apply(board.corner_object_point(*id).expect("corner")),
            );
            assert!(
                (p.x - expected.x).abs() < 1e-4 && (p.y - expected.y).abs() < 1e-4,
                "corner {id} off by ({}, {})",
                p.x - expected.x,
                p.y - expected.y
            );
        }
    }
}
