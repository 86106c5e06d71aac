//! Observation aggregation between capture and calibration.

use crate::session::FrameObservation;
use charuco_calib_core::{Board, CameraIntrinsics, Distortion};
use charuco_calib_detect::{interpolate_corners_with_camera, InterpolatedCorners};
use charuco_calib_solve::FlattenedMarkers;

/// Flatten per-frame marker observations for the coarse pass.
///
/// Marker order within each frame is preserved; `per_frame_counts` records
/// the frame boundaries so the solver can rebuild views.
pub fn flatten_for_marker_calibration(frames: &[FrameObservation]) -> FlattenedMarkers {
    let total: usize = frames.iter().map(|f| f.markers.len()).sum();
    let mut flat = FlattenedMarkers {
        corners: Vec::with_capacity(total),
        ids: Vec::with_capacity(total),
        per_frame_counts: Vec::with_capacity(frames.len()),
    };
    for frame in frames {
        flat.per_frame_counts.push(frame.markers.len());
        for marker in &frame.markers {
            flat.corners.push(marker.corners);
            flat.ids.push(marker.id);
        }
    }
    flat
}

/// Re-run corner interpolation for every frame with the coarse intrinsic
/// estimate. Frames that yield nothing produce an empty (but present)
/// entry so the minimum-count policy sees them.
pub fn reinterpolate_with_camera(
    frames: &[FrameObservation],
    board: &Board,
    intrinsics: &CameraIntrinsics,
    distortion: &Distortion,
) -> Vec<InterpolatedCorners> {
    frames
        .iter()
        .map(|frame| {
            if frame.markers.is_empty() {
                return InterpolatedCorners::default();
            }
            interpolate_corners_with_camera(
                &frame.markers,
                board,
                frame.image.size(),
                intrinsics,
                distortion,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use charuco_calib_core::GrayImage;
    use charuco_calib_detect::DetectedMarker;
    use nalgebra::Point2;

    fn frame_with(ids: &[u32]) -> FrameObservation {
        FrameObservation {
            markers: ids
                .iter()
                .map(|&id| DetectedMarker {
                    id,
                    corners: [Point2::new(id as f64, 0.0); 4],
                })
                .collect(),
            charuco: InterpolatedCorners::default(),
            image: GrayImage::new(4, 4),
        }
    }

    #[test]
    fn flattening_preserves_order_and_counts() {
        let frames = vec![frame_with(&[3, 1, 4]), frame_with(&[1, 5])];
        let flat = flatten_for_marker_calibration(&frames);

        assert_eq!(flat.per_frame_counts, vec![3, 2]);
        assert_eq!(flat.ids, vec![3, 1, 4, 1, 5]);
        assert_eq!(flat.corners.len(), 5);
        flat.check_invariant().expect("invariant holds");

        let total: usize = flat.per_frame_counts.iter().sum();
        assert_eq!(total, flat.corners.len());
        assert_eq!(total, flat.ids.len());
    }

    #[test]
    fn empty_input_flattens_to_empty() {
        let flat = flatten_for_marker_calibration(&[]);
        assert!(flat.per_frame_counts.is_empty());
        flat.check_invariant().expect("invariant holds");
    }
}
