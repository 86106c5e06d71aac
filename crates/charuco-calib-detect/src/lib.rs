//! Detection-side building blocks for ChArUco calibration capture.
//!
//! Marker detection itself is an external collaborator: this crate defines
//! the [`FrameDetector`] seam plus the pieces that sit right next to it —
//! the detector parameter file, ChArUco corner interpolation from detected
//! markers, and the refind strategy over rejected candidates. The
//! [`synthetic`] module provides a projective detector for tests and demos.

mod detector;
mod interpolate;
mod params;
mod refind;
pub mod synthetic;

pub use detector::{
    DetectedMarker, Detection, FrameDetector, RejectedCandidate, SidecarDetector, SidecarError,
};
pub use interpolate::{
    interpolate_corners, interpolate_corners_with_camera, InterpolatedCorners,
};
pub use params::{ConfigError, CornerRefinementMethod, DetectorParams};
pub use refind::{refind_markers, RefindOutcome};
