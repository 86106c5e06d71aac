//! Marker detector parameter file.
//!
//! The parameter set mirrors the classic ArUco detector knobs. The values
//! are opaque to this workspace — they are loaded, validated and handed to
//! whatever [`FrameDetector`](crate::FrameDetector) implementation is in
//! use — but a missing or unreadable file is a hard startup error: running
//! a capture session with undefined detector behavior is worse than not
//! running at all.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Subpixel corner refinement strategy requested from the detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CornerRefinementMethod {
    #[default]
    None,
    Subpixel,
    Contour,
}

/// Detector parameters, loaded once at startup and immutable thereafter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub adaptive_thresh_win_size_min: i32,
    pub adaptive_thresh_win_size_max: i32,
    pub adaptive_thresh_win_size_step: i32,
    pub adaptive_thresh_constant: f64,
    /// Min/max marker perimeter as a fraction of the image perimeter.
    pub min_marker_perimeter_rate: f64,
    pub max_marker_perimeter_rate: f64,
    pub polygonal_approx_accuracy_rate: f64,
    pub min_corner_distance_rate: f64,
    pub min_marker_distance_rate: f64,
    pub min_distance_to_border: i32,
    pub corner_refinement_method: CornerRefinementMethod,
    pub corner_refinement_win_size: i32,
    pub corner_refinement_max_iterations: i32,
    pub corner_refinement_min_accuracy: f64,
    /// Width of the black marker border, in bits.
    pub marker_border_bits: i32,
    pub perspective_remove_pixel_per_cell: i32,
    pub perspective_remove_ignored_margin_per_cell: f64,
    pub max_erroneous_bits_in_border_rate: f64,
    pub min_otsu_std_dev: f64,
    pub error_correction_rate: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            adaptive_thresh_win_size_min: 3,
            adaptive_thresh_win_size_max: 23,
            adaptive_thresh_win_size_step: 10,
            adaptive_thresh_constant: 7.0,
            min_marker_perimeter_rate: 0.03,
            max_marker_perimeter_rate: 4.0,
            polygonal_approx_accuracy_rate: 0.03,
            min_corner_distance_rate: 0.05,
            min_marker_distance_rate: 0.05,
            min_distance_to_border: 3,
            corner_refinement_method: CornerRefinementMethod::None,
            corner_refinement_win_size: 5,
            corner_refinement_max_iterations: 30,
            corner_refinement_min_accuracy: 0.1,
            marker_border_bits: 1,
            perspective_remove_pixel_per_cell: 4,
            perspective_remove_ignored_margin_per_cell: 0.13,
            max_erroneous_bits_in_border_rate: 0.35,
            min_otsu_std_dev: 5.0,
            error_correction_rate: 0.6,
        }
    }
}

/// Errors from loading or validating the detector parameter file.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("detector parameter file unavailable: {path}: {source}")]
    Unavailable {
        path: String,
        source: std::io::Error,
    },
    #[error("detector parameter file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid detector parameter: {0}")]
    Invalid(&'static str),
}

impl DetectorParams {
    /// Load and validate the parameter file. A missing file is a distinct,
    /// fatal error.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unavailable {
            path: path.display().to_string(),
            source,
        })?;
        let params: Self = serde_json::from_str(&raw)?;
        params.validate()?;
        Ok(params)
    }

    /// Write the parameters as pretty JSON (used to seed a config file).
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Unavailable {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adaptive_thresh_win_size_min < 3
            || self.adaptive_thresh_win_size_max < self.adaptive_thresh_win_size_min
        {
            return Err(ConfigError::Invalid(
                "adaptive threshold window sizes must satisfy 3 <= min <= max",
            ));
        }
        if self.adaptive_thresh_win_size_step <= 0 {
            return Err(ConfigError::Invalid(
                "adaptive_thresh_win_size_step must be > 0",
            ));
        }
        if self.min_marker_perimeter_rate <= 0.0
            || self.max_marker_perimeter_rate <= self.min_marker_perimeter_rate
        {
            return Err(ConfigError::Invalid(
                "marker perimeter rates must satisfy 0 < min < max",
            ));
        }
        if self.polygonal_approx_accuracy_rate <= 0.0 {
            return Err(ConfigError::Invalid(
                "polygonal_approx_accuracy_rate must be > 0",
            ));
        }
        if self.min_distance_to_border < 0 {
            return Err(ConfigError::Invalid("min_distance_to_border must be >= 0"));
        }
        if self.marker_border_bits < 1 {
            return Err(ConfigError::Invalid("marker_border_bits must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.error_correction_rate) {
            return Err(ConfigError::Invalid(
                "error_correction_rate must be in [0, 1]",
            ));
        }
        Ok(())
    }
}
