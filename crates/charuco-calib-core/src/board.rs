//! ChArUco board specification and derived layout.

use crate::dictionary::DictionaryId;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Static description of the physical calibration target.
///
/// `squares_x`/`squares_y` are **square counts** (not inner corner counts);
/// lengths are in meters. Markers sit centered in the white squares, with
/// the top-left square black and ids assigned row-major over white squares
/// (the OpenCV ChArUco layout).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BoardSpec {
    pub squares_x: u32,
    pub squares_y: u32,
    pub square_length: f64,
    pub marker_length: f64,
    pub dictionary: DictionaryId,
}

/// Board specification validation errors.
#[derive(thiserror::Error, Debug)]
pub enum BoardError {
    #[error("squares_x and squares_y must be >= 2")]
    InvalidSize,
    #[error("square_length must be finite and > 0")]
    InvalidSquareLength,
    #[error("marker_length must be finite, > 0 and < square_length")]
    InvalidMarkerLength,
    #[error("board needs {needed} markers, dictionary {dictionary} has {available}")]
    NotEnoughDictionaryCodes {
        needed: usize,
        available: usize,
        dictionary: DictionaryId,
    },
}

/// Validated board with precomputed marker placement.
#[derive(Clone, Debug)]
pub struct Board {
    spec: BoardSpec,
    marker_cells: Vec<[u32; 2]>,
}

impl Board {
    pub fn new(spec: BoardSpec) -> Result<Self, BoardError> {
        if spec.squares_x < 2 || spec.squares_y < 2 {
            return Err(BoardError::InvalidSize);
        }
        if !spec.square_length.is_finite() || spec.square_length <= 0.0 {
            return Err(BoardError::InvalidSquareLength);
        }
        if !spec.marker_length.is_finite()
            || spec.marker_length <= 0.0
            || spec.marker_length >= spec.square_length
        {
            return Err(BoardError::InvalidMarkerLength);
        }

        let marker_cells = white_square_cells(spec.squares_x, spec.squares_y);
        let needed = marker_cells.len();
        let available = spec.dictionary.capacity();
        if available < needed {
            return Err(BoardError::NotEnoughDictionaryCodes {
                needed,
                available,
                dictionary: spec.dictionary,
            });
        }

        Ok(Self { spec, marker_cells })
    }

    #[inline]
    pub fn spec(&self) -> BoardSpec {
        self.spec
    }

    /// Number of markers placed on the board.
    #[inline]
    pub fn marker_count(&self) -> usize {
        self.marker_cells.len()
    }

    /// Inner chessboard corner grid size `(cols, rows)`.
    #[inline]
    pub fn inner_corners(&self) -> (u32, u32) {
        (self.spec.squares_x - 1, self.spec.squares_y - 1)
    }

    /// Total number of inner chessboard corners.
    #[inline]
    pub fn corner_count(&self) -> usize {
        let (cols, rows) = self.inner_corners();
        cols as usize * rows as usize
    }

    /// Square cell `(sx, sy)` occupied by marker `id`, if the id is on the board.
    pub fn marker_cell(&self, id: u32) -> Option<(u32, u32)> {
        self.marker_cells.get(id as usize).map(|&[sx, sy]| (sx, sy))
    }

    /// Board-plane positions of marker `id`'s four corners (TL, TR, BR, BL),
    /// in meters, y pointing down the board.
    pub fn marker_object_corners(&self, id: u32) -> Option<[Point2<f64>; 4]> {
        let (sx, sy) = self.marker_cell(id)?;
        let s = self.spec.square_length;
        let cx = (sx as f64 + 0.5) * s;
        let cy = (sy as f64 + 0.5) * s;
        let h = self.spec.marker_length * 0.5;
        Some([
            Point2::new(cx - h, cy - h),
            Point2::new(cx + h, cy - h),
            Point2::new(cx + h, cy + h),
            Point2::new(cx - h, cy + h),
        ])
    }

    /// Board-plane position of inner corner `id` (row-major over the inner
    /// grid), in meters.
    pub fn corner_object_point(&self, id: u32) -> Option<Point2<f64>> {
        let (cols, rows) = self.inner_corners();
        if id >= cols * rows {
            return None;
        }
        let i = (id % cols) as f64 + 1.0;
        let j = (id / cols) as f64 + 1.0;
        let s = self.spec.square_length;
        Some(Point2::new(i * s, j * s))
    }

    /// Corner id of the inner intersection `(ix, iy)` (intersection indices,
    /// `1..squares` on each axis).
    pub fn corner_id(&self, ix: u32, iy: u32) -> Option<u32> {
        if ix == 0 || iy == 0 || ix >= self.spec.squares_x || iy >= self.spec.squares_y {
            return None;
        }
        Some((iy - 1) * (self.spec.squares_x - 1) + (ix - 1))
    }
}

fn white_square_cells(squares_x: u32, squares_y: u32) -> Vec<[u32; 2]> {
    let mut out = Vec::new();
    for sy in 0..squares_y {
        for sx in 0..squares_x {
            // Top-left square is black, so white squares have (sx + sy) odd.
            if (sx + sy) % 2 == 1 {
                out.push([sx, sy]);
            }
        }
    }
    out
}
