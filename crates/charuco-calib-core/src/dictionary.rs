//! Marker dictionary identifiers and code tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Identifier of a predefined ArUco dictionary.
///
/// Only the geometry metadata (bits per side, code capacity) is embedded;
/// the actual code tables are data and live in a [`Dictionary`] loaded from
/// a JSON file.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DictionaryId {
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_100")]
    Dict4x4_100,
    #[serde(rename = "DICT_4X4_250")]
    Dict4x4_250,
    #[serde(rename = "DICT_4X4_1000")]
    Dict4x4_1000,
    #[serde(rename = "DICT_5X5_50")]
    Dict5x5_50,
    #[serde(rename = "DICT_5X5_100")]
    Dict5x5_100,
    #[serde(rename = "DICT_5X5_250")]
    Dict5x5_250,
    #[serde(rename = "DICT_5X5_1000")]
    Dict5x5_1000,
    #[serde(rename = "DICT_6X6_50")]
    Dict6x6_50,
    #[serde(rename = "DICT_6X6_100")]
    Dict6x6_100,
    #[serde(rename = "DICT_6X6_250")]
    Dict6x6_250,
    #[serde(rename = "DICT_6X6_1000")]
    Dict6x6_1000,
    #[serde(rename = "DICT_7X7_50")]
    Dict7x7_50,
    #[serde(rename = "DICT_7X7_100")]
    Dict7x7_100,
    #[serde(rename = "DICT_7X7_250")]
    Dict7x7_250,
    #[serde(rename = "DICT_7X7_1000")]
    Dict7x7_1000,
    #[serde(rename = "DICT_ARUCO_ORIGINAL")]
    DictArucoOriginal,
}

const ALL_IDS: [DictionaryId; 17] = [
    DictionaryId::Dict4x4_50,
    DictionaryId::Dict4x4_100,
    DictionaryId::Dict4x4_250,
    DictionaryId::Dict4x4_1000,
    DictionaryId::Dict5x5_50,
    DictionaryId::Dict5x5_100,
    DictionaryId::Dict5x5_250,
    DictionaryId::Dict5x5_1000,
    DictionaryId::Dict6x6_50,
    DictionaryId::Dict6x6_100,
    DictionaryId::Dict6x6_250,
    DictionaryId::Dict6x6_1000,
    DictionaryId::Dict7x7_50,
    DictionaryId::Dict7x7_100,
    DictionaryId::Dict7x7_250,
    DictionaryId::Dict7x7_1000,
    DictionaryId::DictArucoOriginal,
];

impl DictionaryId {
    /// OpenCV-style numeric code
    /// (`DICT_4X4_50 = 0` .. `DICT_ARUCO_ORIGINAL = 16`).
    pub fn code(self) -> u8 {
        ALL_IDS.iter().position(|&d| d == self).unwrap_or(0) as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        ALL_IDS.get(code as usize).copied()
    }

    /// Canonical name, e.g. `DICT_6X6_250`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Dict4x4_50 => "DICT_4X4_50",
            Self::Dict4x4_100 => "DICT_4X4_100",
            Self::Dict4x4_250 => "DICT_4X4_250",
            Self::Dict4x4_1000 => "DICT_4X4_1000",
            Self::Dict5x5_50 => "DICT_5X5_50",
            Self::Dict5x5_100 => "DICT_5X5_100",
            Self::Dict5x5_250 => "DICT_5X5_250",
            Self::Dict5x5_1000 => "DICT_5X5_1000",
            Self::Dict6x6_50 => "DICT_6X6_50",
            Self::Dict6x6_100 => "DICT_6X6_100",
            Self::Dict6x6_250 => "DICT_6X6_250",
            Self::Dict6x6_1000 => "DICT_6X6_1000",
            Self::Dict7x7_50 => "DICT_7X7_50",
            Self::Dict7x7_100 => "DICT_7X7_100",
            Self::Dict7x7_250 => "DICT_7X7_250",
            Self::Dict7x7_1000 => "DICT_7X7_1000",
            Self::DictArucoOriginal => "DICT_ARUCO_ORIGINAL",
        }
    }

    /// Number of inner bits per marker side.
    pub fn marker_size(self) -> usize {
        match self {
            Self::Dict4x4_50 | Self::Dict4x4_100 | Self::Dict4x4_250 | Self::Dict4x4_1000 => 4,
            Self::Dict5x5_50
            | Self::Dict5x5_100
            | Self::Dict5x5_250
            | Self::Dict5x5_1000
            | Self::DictArucoOriginal => 5,
            Self::Dict6x6_50 | Self::Dict6x6_100 | Self::Dict6x6_250 | Self::Dict6x6_1000 => 6,
            Self::Dict7x7_50 | Self::Dict7x7_100 | Self::Dict7x7_250 | Self::Dict7x7_1000 => 7,
        }
    }

    /// Number of distinct marker ids the dictionary provides.
    pub fn capacity(self) -> usize {
        match self {
            Self::Dict4x4_50 | Self::Dict5x5_50 | Self::Dict6x6_50 | Self::Dict7x7_50 => 50,
            Self::Dict4x4_100 | Self::Dict5x5_100 | Self::Dict6x6_100 | Self::Dict7x7_100 => 100,
            Self::Dict4x4_250 | Self::Dict5x5_250 | Self::Dict6x6_250 | Self::Dict7x7_250 => 250,
            Self::Dict4x4_1000 | Self::Dict5x5_1000 | Self::Dict6x6_1000 | Self::Dict7x7_1000 => {
                1000
            }
            Self::DictArucoOriginal => 1024,
        }
    }
}

impl fmt::Display for DictionaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DictionaryId {
    type Err = DictionaryError;

    /// Accepts the canonical name (`DICT_5X5_100`) or the numeric code (`5`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| DictionaryError::UnknownId(s.to_owned()));
        }
        ALL_IDS
            .iter()
            .copied()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| DictionaryError::UnknownId(s.to_owned()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DictionaryError {
    #[error("unknown dictionary id: {0}")]
    UnknownId(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("dictionary `{name}` has marker size {marker_size}, expected {expected}")]
    MarkerSizeMismatch {
        name: String,
        marker_size: usize,
        expected: usize,
    },
    #[error("marker size {0} not in supported range 3..=8")]
    UnsupportedMarkerSize(usize),
}

/// A concrete dictionary code table.
///
/// One `u64` per marker id, encoding the inner `marker_size x marker_size`
/// bits in row-major order with **black = 1**. Tables are loaded from JSON
/// files; they are data shared with whatever external detector produced the
/// frame observations, so nothing is compiled in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dictionary {
    pub name: String,
    pub marker_size: usize,
    pub max_correction_bits: u8,
    pub codes: Vec<u64>,
}

impl Dictionary {
    /// Load a code table from a JSON file and sanity-check the bit layout.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let raw = std::fs::read_to_string(path)?;
        let dict: Self = serde_json::from_str(&raw)?;
        if !(3..=8).contains(&dict.marker_size) {
            return Err(DictionaryError::UnsupportedMarkerSize(dict.marker_size));
        }
        Ok(dict)
    }

    /// Check the table against the board's declared dictionary id.
    pub fn check_id(&self, id: DictionaryId) -> Result<(), DictionaryError> {
        if self.marker_size != id.marker_size() {
            return Err(DictionaryError::MarkerSizeMismatch {
                name: self.name.clone(),
                marker_size: self.marker_size,
                expected: id.marker_size(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    /// Inner bit at `(row, col)` of marker `id`; true = black.
    pub fn bit(&self, id: usize, row: usize, col: usize) -> bool {
        let code = self.codes[id];
        let idx = row * self.marker_size + col;
        (code >> (self.bit_count() - 1 - idx)) & 1 == 1
    }
}
