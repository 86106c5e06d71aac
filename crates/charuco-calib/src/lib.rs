//! High-level facade for ChArUco capture and calibration.
//!
//! Wires the lower crates into the operator workflow: a video source feeds
//! frames to the capture session, the session runs the detector seam and
//! interpolation and lets the operator accept frames, the aggregator
//! flattens the accepted observations, and the two-stage pipeline produces a
//! [`CalibrationResult`] that the io module persists.
//!
//! ## API map
//! - [`source`]: the [`VideoSource`] seam plus file/buffer sources.
//! - [`session`]: the interactive capture loop and the observation store.
//! - [`aggregate`]: flattening and camera-refined re-interpolation.
//! - [`pipeline`]: the marker (coarse) and ChArUco (refined) stages.
//! - [`io`]: the camera-parameters file with atomic writes.
//! - [`render`]: printable board previews and frame overlays.

pub mod aggregate;
pub mod io;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod source;

pub use charuco_calib_core as core;
pub use charuco_calib_detect as detect;
pub use charuco_calib_solve as solve;

pub use aggregate::{flatten_for_marker_calibration, reinterpolate_with_camera};
pub use io::{CameraParamsFile, WriteError};
pub use pipeline::{
    run_charuco_stage, run_marker_stage, CalibrationError, CalibrationOptions,
    CalibrationResult, MarkerCalibration, MIN_CHARUCO_FRAMES,
};
pub use session::{
    AutoAccept, CalibrationDataset, CaptureCommand, CaptureControl, CaptureError,
    CaptureOptions, CaptureSession, FrameObservation, FramePreview, StdinControl,
};
pub use source::{BufferSource, Frame, ImageSequenceSource, SourceError, VideoSource};
