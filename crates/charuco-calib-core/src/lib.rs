//! Core types for ChArUco camera calibration.
//!
//! This crate is intentionally small and purely geometric: the board model
//! and its derived object points, the pinhole camera model with Brown-Conrady
//! distortion, plane homographies, and a lightweight grayscale buffer. It
//! does *not* depend on any concrete marker detector or image codec.

mod board;
mod camera;
mod dictionary;
mod homography;
mod image;
mod logger;

pub use board::{Board, BoardError, BoardSpec};
pub use camera::{CameraIntrinsics, Distortion};
pub use dictionary::{Dictionary, DictionaryError, DictionaryId};
pub use homography::{estimate_homography, Homography, HomographyError};
pub use image::{GrayImage, GrayImageView};
pub use logger::init_with_level;
