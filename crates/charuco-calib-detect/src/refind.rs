//! Refind strategy: recover undecoded marker candidates using the board.
//!
//! Once a frame has enough decoded markers to pin down the board-to-image
//! homography, every undetected marker has a predicted corner quad. A
//! rejected candidate whose corners land on such a quad (under any of the 4
//! cyclic corner orderings) is promoted to a detection with that marker id.

use crate::detector::{DetectedMarker, Detection};
use charuco_calib_core::{estimate_homography, Board};
use nalgebra::Point2;
use std::collections::HashSet;

/// Result summary of a refind pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct RefindOutcome {
    pub recovered: usize,
}

/// Minimum decoded markers before the frame homography is trusted.
const MIN_MARKERS_FOR_REFIND: usize = 2;

/// Try to promote rejected candidates to detections.
///
/// `min_rep_distance` is the per-corner gate in pixels: a candidate matches a
/// predicted marker only if all four corners are within this distance.
/// Promoted markers are appended to `detection.markers` with their corners
/// reordered to the canonical TL, TR, BR, BL; consumed candidates are removed
/// from `detection.rejected`.
pub fn refind_markers(
    detection: &mut Detection,
    board: &Board,
    min_rep_distance: f64,
) -> RefindOutcome {
    if detection.markers.len() < MIN_MARKERS_FOR_REFIND || detection.rejected.is_empty() {
        return RefindOutcome::default();
    }

    let mut object_pts = Vec::new();
    let mut image_pts = Vec::new();
    let mut seen = HashSet::new();
    for marker in &detection.markers {
        seen.insert(marker.id);
        let Some(obj) = board.marker_object_corners(marker.id) else {
            continue;
        };
        object_pts.extend_from_slice(&obj);
        image_pts.extend_from_slice(&marker.corners);
    }

    let Ok(hom) = estimate_homography(&object_pts, &image_pts) else {
        return RefindOutcome::default();
    };

    let mut used = vec![false; detection.rejected.len()];
    let mut recovered = Vec::new();

    for id in 0..board.marker_count() as u32 {
        if seen.contains(&id) {
            continue;
        }
        let Some(obj) = board.marker_object_corners(id) else {
            continue;
        };
        let predicted = obj.map(|o| hom.apply(o));

        let mut best: Option<(usize, usize, f64)> = None;
        for (ci, candidate) in detection.rejected.iter().enumerate() {
            if used[ci] {
                continue;
            }
            for rot in 0..4 {
                let err = quad_distance(&candidate.corners, &predicted, rot);
                if err <= min_rep_distance && best.map_or(true, |(_, _, e)| err < e) {
                    best = Some((ci, rot, err));
                }
            }
        }

        if let Some((ci, rot, err)) = best {
            used[ci] = true;
            let c = &detection.rejected[ci].corners;
            let corners = [c[rot], c[(rot + 1) % 4], c[(rot + 2) % 4], c[(rot + 3) % 4]];
            log::debug!("refind recovered marker {id} (corner error {err:.2} px)");
            recovered.push(DetectedMarker { id, corners });
        }
    }

    let mut idx = 0;
    detection.rejected.retain(|_| {
        let keep = !used[idx];
        idx += 1;
        keep
    });
    let outcome = RefindOutcome {
        recovered: recovered.len(),
    };
    detection.markers.extend(recovered);
    outcome
}

/// Max corner distance between a candidate quad (cyclically rotated by
/// `rot`) and the predicted quad.
fn quad_distance(candidate: &[Point2<f64>; 4], predicted: &[Point2<f64>; 4], rot: usize) -> f64 {
    (0..4)
        .map(|k| {
            let c = candidate[(k + rot) % 4];
            let p = predicted[k];
            ((c.x - p.x).powi(2) + (c.y - p.y).powi(2)).sqrt()
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::RejectedCandidate;
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

    fn view_homography() -> Homography {
        Homography::new(Matrix3::new(
            3000.0, 25.0, 150.0, //
            -20.0, 3050.0, 100.0, //
            0.01, 0.02, 1.0,
        ))
    }

    fn full_detection(board: &Board, h: &Homography) -> Detection {
        Detection {
            markers: (0..board.marker_count() as u32)
                .map(|id| {
                    let obj = board.marker_object_corners(id).expect("marker");
                    DetectedMarker {
                        id,
                        corners: obj.map(|o| h.apply(o)),
                    }
                })
                .collect(),
            rejected: vec![],
        }
    }

    #[test]
    fn recovers_a_dropped_marker_with_rotated_corners() {
        let board = board();
        let h = view_homography();
        let mut detection = full_detection(&board, &h);

        // Demote marker 5, with its corner order rotated as a raw candidate
        // quad would be.
        let dropped = detection.markers.remove(5);
        let c = dropped.corners;
        detection.rejected.push(RejectedCandidate {
            corners: [c[3], c[0], c[1], c[2]],
        });

        let outcome = refind_markers(&mut detection, &board, 5.0);
        assert_eq!(outcome.recovered, 1);
        assert!(detection.rejected.is_empty());

        let recovered = detection
            .markers
            .iter()
            .find(|m| m.id == dropped.id)
            .expect("marker recovered");
        for (a, b) in recovered.corners.iter().zip(dropped.corners.iter()) {
            assert!((a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9);
        }
    }

    #[test]
    fn far_candidates_stay_rejected() {
        let board = board();
        let h = view_homography();
        let mut detection = full_detection(&board, &h);
        detection.markers.remove(3);
        detection.rejected.push(RejectedCandidate {
            corners: [
                Point2::new(2.0, 2.0),
                Point2::new(12.0, 2.0),
                Point2::new(12.0, 12.0),
                Point2::new(2.0, 12.0),
            ],
        });

        let outcome = refind_markers(&mut detection, &board, 5.0);
        assert_eq!(outcome.recovered, 0);
        assert_eq!(detection.rejected.len(), 1);
    }

    #[test]
    fn needs_enough_decoded_markers() {
        let board = board();
        let h = view_homography();
        let full = full_detection(&board, &h);

        let mut detection = Detection {
            markers: vec![full.markers[0].clone()],
            rejected: vec![RejectedCandidate {
                corners: full.markers[1].corners,
            }],
        };
        let outcome = refind_markers(&mut detection, &board, 5.0);
        assert_eq!(outcome.recovered, 0);
    }
}
