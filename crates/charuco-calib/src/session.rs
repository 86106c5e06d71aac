//! Interactive capture session and the observation store.

use crate::render;
use crate::source::{SourceError, VideoSource};
use charuco_calib_core::{Board, GrayImage};
use charuco_calib_detect::{
    interpolate_corners, refind_markers, DetectedMarker, DetectorParams, FrameDetector,
    InterpolatedCorners,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Operator instructions, shown once by interactive control surfaces.
pub const INSTRUCTIONS: &str =
    "Press 'c' to add the current frame, 'f' to finish and calibrate, Enter to skip";

/// Observations of one accepted frame. Immutable after acceptance; the
/// session's dataset owns the source image for later review rendering.
#[derive(Clone, Debug)]
pub struct FrameObservation {
    pub markers: Vec<DetectedMarker>,
    /// Capture-time (uncalibrated) corner interpolation.
    pub charuco: InterpolatedCorners,
    pub image: GrayImage,
}

/// Accepted frames plus their common image size.
#[derive(Clone, Debug, Default)]
pub struct CalibrationDataset {
    pub frames: Vec<FrameObservation>,
    pub image_size: (u32, u32),
}

impl CalibrationDataset {
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Operator decision for the currently displayed frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureCommand {
    /// Store the frame (only honored when it has detected markers).
    Accept,
    /// End the capture loop and move on to calibration.
    Finish,
    /// Drop this frame's detection and continue.
    Skip,
}

/// What the operator gets to see before deciding.
#[derive(Clone, Copy, Debug)]
pub struct FramePreview<'a> {
    pub index: usize,
    pub path: Option<&'a Path>,
    pub marker_count: usize,
    pub corner_count: usize,
    pub accepted_so_far: usize,
}

/// Per-frame operator control surface.
pub trait CaptureControl {
    fn poll(&mut self, preview: &FramePreview<'_>) -> CaptureCommand;
}

/// Headless policy: accept every frame with markers, optionally finishing
/// after a frame budget.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoAccept {
    pub max_frames: Option<usize>,
}

impl CaptureControl for AutoAccept {
    fn poll(&mut self, preview: &FramePreview<'_>) -> CaptureCommand {
        if self
            .max_frames
            .is_some_and(|max| preview.accepted_so_far >= max)
        {
            return CaptureCommand::Finish;
        }
        if preview.marker_count > 0 {
            CaptureCommand::Accept
        } else {
            CaptureCommand::Skip
        }
    }
}

/// Line-oriented stdin control: `c` accepts, `f` finishes, anything else
/// (including a bare Enter) skips. End of input finishes.
#[derive(Debug, Default)]
pub struct StdinControl {
    instructions_shown: bool,
}

impl CaptureControl for StdinControl {
    fn poll(&mut self, preview: &FramePreview<'_>) -> CaptureCommand {
        let mut stderr = std::io::stderr();
        if !self.instructions_shown {
            let _ = writeln!(stderr, "{INSTRUCTIONS}");
            self.instructions_shown = true;
        }
        let _ = write!(
            stderr,
            "frame {} ({} markers, {} corners, {} accepted) > ",
            preview.index, preview.marker_count, preview.corner_count, preview.accepted_so_far
        );
        let _ = stderr.flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => CaptureCommand::Finish,
            Ok(_) => match line.trim() {
                "c" | "C" => CaptureCommand::Accept,
                "f" | "F" => CaptureCommand::Finish,
                _ => CaptureCommand::Skip,
            },
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("frame size {got:?} differs from the session size {expected:?}")]
    ImageSizeMismatch {
        expected: (u32, u32),
        got: (u32, u32),
    },
}

/// Capture-loop behavior switches.
#[derive(Clone, Debug, Default)]
pub struct CaptureOptions {
    /// Re-attempt rejected marker candidates against the board geometry.
    pub refind_strategy: bool,
    /// Corner gate for the refind pass, in pixels.
    pub refind_min_rep_distance: f64,
    /// Directory for per-frame overlay images; `None` disables rendering.
    pub review_dir: Option<PathBuf>,
}

impl CaptureOptions {
    pub fn with_refind(mut self, enabled: bool) -> Self {
        self.refind_strategy = enabled;
        if self.refind_min_rep_distance <= 0.0 {
            self.refind_min_rep_distance = 10.0;
        }
        self
    }
}

/// Drives the read-detect-decide loop and owns frame acceptance.
pub struct CaptureSession<'a> {
    board: &'a Board,
    params: &'a DetectorParams,
    options: CaptureOptions,
}

impl<'a> CaptureSession<'a> {
    pub fn new(board: &'a Board, params: &'a DetectorParams, options: CaptureOptions) -> Self {
        Self {
            board,
            params,
            options,
        }
    }

    /// Run the capture loop until the source is exhausted or the operator
    /// finishes. Frames are stored only when they carry at least one
    /// detected marker; the first stored frame pins the session image size.
    pub fn run(
        &self,
        source: &mut dyn VideoSource,
        detector: &mut dyn FrameDetector,
        control: &mut dyn CaptureControl,
    ) -> Result<CalibrationDataset, CaptureError> {
        let mut dataset = CalibrationDataset::default();

        while let Some(frame) = source.next_frame()? {
            let mut detection =
                detector.detect(&frame.image.view(), frame.path.as_deref(), self.params);

            if self.options.refind_strategy {
                let outcome = refind_markers(
                    &mut detection,
                    self.board,
                    self.options.refind_min_rep_distance.max(1.0),
                );
                if outcome.recovered > 0 {
                    log::info!(
                        "frame {}: refind recovered {} marker(s)",
                        frame.index,
                        outcome.recovered
                    );
                }
            }

            let charuco = if detection.has_markers() {
                interpolate_corners(&detection.markers, self.board, frame.image.size())
            } else {
                InterpolatedCorners::default()
            };

            log::info!(
                "frame {}: {} marker(s), {} interpolated corner(s)",
                frame.index,
                detection.markers.len(),
                charuco.len()
            );

            if let Some(dir) = &self.options.review_dir {
                let name = format!("frame_{:04}.png", frame.index);
                if let Err(err) = render::write_overlay(
                    dir,
                    &name,
                    &frame.image,
                    &detection.markers,
                    &charuco,
                ) {
                    log::warn!("could not write review overlay {name}: {err}");
                }
            }

            let preview = FramePreview {
                index: frame.index,
                path: frame.path.as_deref(),
                marker_count: detection.markers.len(),
                corner_count: charuco.len(),
                accepted_so_far: dataset.len(),
            };

            match control.poll(&preview) {
                CaptureCommand::Finish => break,
                CaptureCommand::Skip => continue,
                CaptureCommand::Accept => {
                    if !detection.has_markers() {
                        log::warn!("frame {} has no markers; not stored", frame.index);
                        continue;
                    }
                    let size = frame.image.size();
                    if dataset.is_empty() {
                        dataset.image_size = size;
                    } else if dataset.image_size != size {
                        return Err(CaptureError::ImageSizeMismatch {
                            expected: dataset.image_size,
                            got: size,
                        });
                    }
                    dataset.frames.push(FrameObservation {
                        markers: detection.markers,
                        charuco,
                        image: frame.image,
                    });
                    log::info!("frame captured ({} total)", dataset.len());
                }
            }
        }

        Ok(dataset)
    }
}
