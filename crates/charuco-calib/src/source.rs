//! Video sources.
//!
//! Frame acquisition from a live device is an integration concern; the
//! shipped sources replay pre-recorded frames. [`ImageSequenceSource`] walks
//! the image files of a directory in name order, the file-based equivalent
//! of reading a recorded video.

use charuco_calib_core::GrayImage;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// One frame pulled from a source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: usize,
    /// Originating file, when the frame came from disk.
    pub path: Option<PathBuf>,
    pub image: GrayImage,
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("video source unavailable: {path}: {source}")]
    Unavailable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Blocking, pull-based frame source. `Ok(None)` signals end of stream.
pub trait VideoSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Frames from the image files of a directory, sorted by file name.
///
/// Files that fail to decode are skipped with a warning; an empty directory
/// is a valid source that yields zero frames.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: VecDeque<PathBuf>,
    next_index: usize,
}

impl ImageSequenceSource {
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Unavailable {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| {
                        IMAGE_EXTENSIONS.iter().any(|k| ext.eq_ignore_ascii_case(k))
                    })
            })
            .collect();
        paths.sort();

        log::info!("image sequence source: {} frame(s) in {}", paths.len(), dir.display());
        Ok(Self {
            paths: paths.into(),
            next_index: 0,
        })
    }

    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into(),
            next_index: 0,
        }
    }
}

impl VideoSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        while let Some(path) = self.paths.pop_front() {
            let index = self.next_index;
            self.next_index += 1;

            let decoded = image::ImageReader::open(&path)
                .map_err(|e| e.to_string())
                .and_then(|r| r.decode().map_err(|e| e.to_string()));
            match decoded {
                Ok(img) => {
                    let gray = img.to_luma8();
                    let (w, h) = (gray.width() as usize, gray.height() as usize);
                    let Some(image) = GrayImage::from_raw(w, h, gray.into_raw()) else {
                        log::warn!("skipping {}: inconsistent buffer", path.display());
                        continue;
                    };
                    return Ok(Some(Frame {
                        index,
                        path: Some(path),
                        image,
                    }));
                }
                Err(err) => {
                    log::warn!("skipping undecodable frame {}: {err}", path.display());
                    continue;
                }
            }
        }
        Ok(None)
    }
}

/// In-memory frame source, mostly for tests and synthetic demos.
#[derive(Debug, Default)]
pub struct BufferSource {
    frames: VecDeque<GrayImage>,
    next_index: usize,
}

impl BufferSource {
    pub fn new(frames: Vec<GrayImage>) -> Self {
        Self {
            frames: frames.into(),
            next_index: 0,
        }
    }
}

impl VideoSource for BufferSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(image) = self.frames.pop_front() else {
            return Ok(None);
        };
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame {
            index,
            path: None,
            image,
        }))
    }
}
