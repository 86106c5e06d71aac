//! Camera-parameters file.
//!
//! JSON, human- and machine-readable, written all-or-nothing: the content
//! goes to a temp file in the destination directory first and is atomically
//! renamed into place, so a failed write never leaves a partial file.

use crate::pipeline::CalibrationResult;
use charuco_calib_core::{CameraIntrinsics, Distortion};
use charuco_calib_solve::CalibrationFlags;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("cannot write calibration output {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// On-disk calibration artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CameraParamsFile {
    /// Locale-formatted wall-clock time of the calibration.
    pub calibration_time: String,
    pub image_width: u32,
    pub image_height: u32,
    /// Present only when the fixed-aspect flag was set.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub aspect_ratio: Option<f64>,
    /// Decoded flag names (`+fix_aspect_ratio...`), empty when no flag set.
    pub flags: String,
    pub flags_bits: u32,
    /// Row-major 3x3 camera matrix.
    pub camera_matrix: [[f64; 3]; 3],
    /// `(k1, k2, p1, p2, k3)`.
    pub distortion_coefficients: Vec<f64>,
    pub avg_reprojection_error: f64,
}

impl CameraParamsFile {
    /// Assemble the artifact from a refined calibration, stamping the
    /// current local time.
    pub fn from_result(result: &CalibrationResult) -> Self {
        let k = result.intrinsics.k_matrix();
        let camera_matrix = [
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ];
        Self {
            calibration_time: chrono::Local::now().format("%c").to_string(),
            image_width: result.image_size.0,
            image_height: result.image_size.1,
            aspect_ratio: result.aspect_ratio,
            flags: result.flags.decode(),
            flags_bits: result.flags.bits(),
            camera_matrix,
            distortion_coefficients: result.distortion.coefficients().to_vec(),
            avg_reprojection_error: result.reprojection_error,
        }
    }

    pub fn intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics {
            fx: self.camera_matrix[0][0],
            fy: self.camera_matrix[1][1],
            cx: self.camera_matrix[0][2],
            cy: self.camera_matrix[1][2],
            skew: self.camera_matrix[0][1],
        }
    }

    pub fn distortion(&self) -> Distortion {
        Distortion::from_coefficients(&self.distortion_coefficients)
    }

    pub fn calibration_flags(&self) -> CalibrationFlags {
        CalibrationFlags::from_bits(self.flags_bits)
    }

    /// Atomically write the artifact as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), WriteError> {
        let path = path.as_ref();
        let io_err = |source| WriteError::Io {
            path: path.display().to_string(),
            source,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let json = serde_json::to_string_pretty(self)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.write_all(b"\n").map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Read an artifact back (round-trip and downstream consumers).
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, WriteError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| WriteError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CameraParamsFile {
        CameraParamsFile {
            calibration_time: "Thu Aug  6 12:00:00 2026".to_owned(),
            image_width: 1280,
            image_height: 720,
            aspect_ratio: Some(16.0 / 9.0),
            flags: "+fix_aspect_ratio".to_owned(),
            flags_bits: 0b10,
            camera_matrix: [
                [901.234567890123, 0.0, 639.5],
                [0.0, 880.987654321098, 359.5],
                [0.0, 0.0, 1.0],
            ],
            distortion_coefficients: vec![-0.21234, 0.04321, 0.00011, -0.00022, 0.0],
            avg_reprojection_error: 0.3456789,
        }
    }

    #[test]
    fn json_round_trip_is_bit_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("camera.json");

        let params = sample();
        params.write_json(&path).expect("write");
        let loaded = CameraParamsFile::load_json(&path).expect("load");

        assert_eq!(loaded.camera_matrix, params.camera_matrix);
        assert_eq!(
            loaded.distortion_coefficients,
            params.distortion_coefficients
        );
        assert_eq!(loaded.flags_bits, params.flags_bits);
        assert_eq!(loaded.flags, params.flags);
        assert_eq!(loaded.aspect_ratio, params.aspect_ratio);
        assert_eq!(
            loaded.avg_reprojection_error.to_bits(),
            params.avg_reprojection_error.to_bits()
        );
    }

    #[test]
    fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("camera.json");

        let err = sample().write_json(&path).expect_err("must fail");
        assert!(matches!(err, WriteError::Io { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn accessors_rebuild_the_models() {
        let params = sample();
        let intr = params.intrinsics();
        assert_eq!(intr.fx, params.camera_matrix[0][0]);
        assert_eq!(intr.cy, params.camera_matrix[1][2]);

        let dist = params.distortion();
        assert_eq!(dist.k1, -0.21234);
        assert_eq!(dist.p2, -0.00022);

        assert!(params.calibration_flags().fix_aspect_ratio);
        assert!(!params.calibration_flags().zero_tangent_dist);
    }
}
