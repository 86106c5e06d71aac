//! The frame-detector seam.
//!
//! Marker detection and decoding are delegated to an external detector; this
//! module fixes the contract: a grayscale frame plus [`DetectorParams`] in,
//! detected markers and rejected candidates out. A frame where detection
//! fails simply yields an empty [`Detection`] — the operator can decline to
//! accept it.

use crate::params::DetectorParams;
use charuco_calib_core::GrayImageView;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One detected marker: dictionary id plus its corner quad (TL, TR, BR, BL)
/// in pixel coordinates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub id: u32,
    pub corners: [Point2<f64>; 4],
}

/// A square candidate the detector found but could not decode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub corners: [Point2<f64>; 4],
}

/// Per-frame detection output. Also the on-disk sidecar report format.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Detection {
    pub markers: Vec<DetectedMarker>,
    #[serde(default)]
    pub rejected: Vec<RejectedCandidate>,
}

impl Detection {
    #[inline]
    pub fn has_markers(&self) -> bool {
        !self.markers.is_empty()
    }

    pub fn marker_ids(&self) -> Vec<u32> {
        self.markers.iter().map(|m| m.id).collect()
    }
}

/// Per-frame marker detection.
///
/// `source` carries the originating file path when the frame came from disk,
/// which file-based implementations use to locate their data.
pub trait FrameDetector {
    fn detect(
        &mut self,
        image: &GrayImageView<'_>,
        source: Option<&Path>,
        params: &DetectorParams,
    ) -> Detection;
}

#[derive(thiserror::Error, Debug)]
pub enum SidecarError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Detector that reads per-frame JSON detection reports written by an
/// external detector, stored next to each frame
/// (`frame_0001.png` -> `frame_0001.markers.json` by default).
///
/// A missing or unparsable report is logged and treated as "no markers".
#[derive(Clone, Debug)]
pub struct SidecarDetector {
    report_extension: String,
}

impl Default for SidecarDetector {
    fn default() -> Self {
        Self {
            report_extension: "markers.json".to_owned(),
        }
    }
}

impl SidecarDetector {
    pub fn new(report_extension: impl Into<String>) -> Self {
        Self {
            report_extension: report_extension.into(),
        }
    }

    /// Load a report file directly.
    pub fn load_report(path: &Path) -> Result<Detection, SidecarError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn report_path(&self, frame: &Path) -> std::path::PathBuf {
        frame.with_extension(self.report_extension.as_str())
    }
}

impl FrameDetector for SidecarDetector {
    fn detect(
        &mut self,
        _image: &GrayImageView<'_>,
        source: Option<&Path>,
        _params: &DetectorParams,
    ) -> Detection {
        let Some(frame) = source else {
            log::warn!("sidecar detector needs a frame path; reporting no markers");
            return Detection::default();
        };
        let report = self.report_path(frame);
        match Self::load_report(&report) {
            Ok(detection) => detection,
            Err(err) => {
                log::warn!(
                    "no usable detection report at {}: {err}",
                    report.display()
                );
                Detection::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charuco_calib_core::GrayImage;

    fn marker(id: u32) -> DetectedMarker {
        DetectedMarker {
            id,
            corners: [
                Point2::new(10.0, 10.0),
                Point2::new(20.0, 10.0),
                Point2::new(20.0, 20.0),
                Point2::new(10.0, 20.0),
            ],
        }
    }

    #[test]
    fn sidecar_reads_report_next_to_frame() {
        let dir = tempfile::tempdir().expect("tempdir");
        let frame_path = dir.path().join("frame_0001.png");
        let report_path = dir.path().join("frame_0001.markers.json");

        let detection = Detection {
            markers: vec![marker(7), marker(12)],
            rejected: vec![],
        };
        std::fs::write(
            &report_path,
            serde_json::to_string(&detection).expect("serialize"),
        )
        .expect("write report");

        let img = GrayImage::new(4, 4);
        let mut det = SidecarDetector::default();
        let out = det.detect(
            &img.view(),
            Some(frame_path.as_path()),
            &DetectorParams::default(),
        );
        assert_eq!(out.marker_ids(), vec![7, 12]);
    }

    #[test]
    fn missing_report_yields_no_markers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let frame_path = dir.path().join("frame_0002.png");

        let img = GrayImage::new(4, 4);
        let mut det = SidecarDetector::default();
        let out = det.detect(
            &img.view(),
            Some(frame_path.as_path()),
            &DetectorParams::default(),
        );
        assert!(!out.has_markers());
        assert!(out.rejected.is_empty());
    }
}
