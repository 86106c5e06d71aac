//! Board preview and frame overlay rendering.

use charuco_calib_core::{Board, Dictionary};
use charuco_calib_detect::{DetectedMarker, InterpolatedCorners};
use image::{Luma, Rgb, RgbImage};
use nalgebra::Point2;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("board needs {needed} marker codes, dictionary `{name}` has {got}")]
    NotEnoughCodes {
        needed: usize,
        got: usize,
        name: String,
    },
    #[error("cannot create review directory {path}: {source}")]
    ReviewDir {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Render the printable board pattern.
///
/// Marker interiors come from the dictionary code table (black = 1) with a
/// one-bit black border ring, matching the layout an external detector
/// expects for this board.
pub fn render_board(
    board: &Board,
    dict: &Dictionary,
    px_per_square: u32,
    margin_px: u32,
) -> Result<image::GrayImage, RenderError> {
    if dict.codes.len() < board.marker_count() {
        return Err(RenderError::NotEnoughCodes {
            needed: board.marker_count(),
            got: dict.codes.len(),
            name: dict.name.clone(),
        });
    }

    let spec = board.spec();
    let pps = px_per_square.max(8);
    let width = spec.squares_x * pps + 2 * margin_px;
    let height = spec.squares_y * pps + 2 * margin_px;
    let mut img = image::GrayImage::from_pixel(width, height, Luma([255u8]));

    // Checkerboard: top-left square is black.
    for sy in 0..spec.squares_y {
        for sx in 0..spec.squares_x {
            if (sx + sy) % 2 == 0 {
                fill_rect(
                    &mut img,
                    margin_px + sx * pps,
                    margin_px + sy * pps,
                    pps,
                    pps,
                    0,
                );
            }
        }
    }

    // Markers, centered in their white squares.
    let marker_px = (pps as f64 * spec.marker_length / spec.square_length).round() as u32;
    let inset = (pps - marker_px) / 2;
    let grid = dict.marker_size as u32 + 2; // inner bits + border ring

    for id in 0..board.marker_count() as u32 {
        let Some((sx, sy)) = board.marker_cell(id) else {
            continue;
        };
        let x0 = margin_px + sx * pps + inset;
        let y0 = margin_px + sy * pps + inset;

        for py in 0..marker_px {
            for px in 0..marker_px {
                let bx = (px * grid) / marker_px;
                let by = (py * grid) / marker_px;
                let black = if bx == 0 || by == 0 || bx == grid - 1 || by == grid - 1 {
                    true
                } else {
                    dict.bit(id as usize, (by - 1) as usize, (bx - 1) as usize)
                };
                if black {
                    img.put_pixel(x0 + px, y0 + py, Luma([0u8]));
                }
            }
        }
    }

    Ok(img)
}

/// Render and save the board preview as PNG.
pub fn write_board_png(
    board: &Board,
    dict: &Dictionary,
    px_per_square: u32,
    margin_px: u32,
    path: impl AsRef<Path>,
) -> Result<(), RenderError> {
    let img = render_board(board, dict, px_per_square, margin_px)?;
    img.save(path.as_ref())?;
    Ok(())
}

const MARKER_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const MARKER_ORIGIN_COLOR: Rgb<u8> = Rgb([220, 40, 40]);
const CORNER_COLOR: Rgb<u8> = Rgb([60, 60, 255]);

/// Draw marker outlines and interpolated corners over a frame.
pub fn render_overlay(
    image: &charuco_calib_core::GrayImage,
    markers: &[DetectedMarker],
    corners: &InterpolatedCorners,
) -> RgbImage {
    let (w, h) = image.size();
    let mut out = RgbImage::from_fn(w, h, |x, y| {
        let v = image.get(x as usize, y as usize);
        Rgb([v, v, v])
    });

    for marker in markers {
        for k in 0..4 {
            draw_line(
                &mut out,
                marker.corners[k],
                marker.corners[(k + 1) % 4],
                MARKER_COLOR,
            );
        }
        fill_square(&mut out, marker.corners[0], 2, MARKER_ORIGIN_COLOR);
    }

    for p in &corners.points {
        draw_cross(&mut out, *p, 4, CORNER_COLOR);
    }

    out
}

/// Render an overlay and save it under `dir/name`.
pub fn write_overlay(
    dir: &Path,
    name: &str,
    image: &charuco_calib_core::GrayImage,
    markers: &[DetectedMarker],
    corners: &InterpolatedCorners,
) -> Result<PathBuf, RenderError> {
    std::fs::create_dir_all(dir).map_err(|source| RenderError::ReviewDir {
        path: dir.display().to_string(),
        source,
    })?;
    let path = dir.join(name);
    render_overlay(image, markers, corners).save(&path)?;
    Ok(path)
}

fn fill_rect(img: &mut image::GrayImage, x0: u32, y0: u32, w: u32, h: u32, value: u8) {
    for y in y0..(y0 + h).min(img.height()) {
        for x in x0..(x0 + w).min(img.width()) {
            img.put_pixel(x, y, Luma([value]));
        }
    }
}

fn put_rgb(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_line(img: &mut RgbImage, a: Point2<f64>, b: Point2<f64>, color: Rgb<u8>) {
    let (mut x0, mut y0) = (a.x.round() as i64, a.y.round() as i64);
    let (x1, y1) = (b.x.round() as i64, b.y.round() as i64);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_rgb(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_cross(img: &mut RgbImage, p: Point2<f64>, r: i64, color: Rgb<u8>) {
    let (x, y) = (p.x.round() as i64, p.y.round() as i64);
    for d in -r..=r {
        put_rgb(img, x + d, y, color);
        put_rgb(img, x, y + d, color);
    }
}

fn fill_square(img: &mut RgbImage, p: Point2<f64>, r: i64, color: Rgb<u8>) {
    let (x, y) = (p.x.round() as i64, p.y.round() as i64);
    for dy in -r..=r {
        for dx in -r..=r {
            put_rgb(img, x + dx, y + dy, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charuco_calib_core::{BoardSpec, DictionaryId};

    fn small_board() -> Board {
        Board::new(BoardSpec {
            squares_x: 3,
            squares_y: 3,
            square_length: 0.04,
            marker_length: 0.02,
            dictionary: DictionaryId::Dict4x4_50,
        })
        .expect("valid board")
    }

    fn test_dictionary(codes: usize) -> Dictionary {
        Dictionary {
            name: "test".to_owned(),
            marker_size: 4,
            max_correction_bits: 1,
            codes: (0..codes as u64).map(|i| i * 0x0f0f + 1).collect(),
        }
    }

    #[test]
    fn board_render_has_expected_geometry() {
        let board = small_board();
        let dict = test_dictionary(board.marker_count());
        let img = render_board(&board, &dict, 40, 10).expect("render");

        assert_eq!(img.width(), 3 * 40 + 20);
        assert_eq!(img.height(), 3 * 40 + 20);
        // Top-left square is black, margin is white.
        assert_eq!(img.get_pixel(2, 2).0[0], 255);
        assert_eq!(img.get_pixel(15, 15).0[0], 0);
        // A marker border pixel inside the first white square is black.
        let marker_start = 10 + 40 + 10; // margin + one square + inset
        assert_eq!(img.get_pixel(marker_start + 1, 10 + 10 + 1).0[0], 0);
    }

    #[test]
    fn short_code_table_is_rejected() {
        let board = small_board();
        let dict = test_dictionary(board.marker_count() - 1);
        assert!(matches!(
            render_board(&board, &dict, 40, 10),
            Err(RenderError::NotEnoughCodes { .. })
        ));
    }

    #[test]
    fn overlay_draws_marker_edges() {
        let gray = charuco_calib_core::GrayImage::new(64, 64);
        let markers = vec![DetectedMarker {
            id: 0,
            corners: [
                Point2::new(10.0, 10.0),
                Point2::new(40.0, 10.0),
                Point2::new(40.0, 40.0),
                Point2::new(10.0, 40.0),
            ],
        }];
        let corners = InterpolatedCorners {
            points: vec![Point2::new(25.0, 25.0)],
            ids: vec![0],
        };
        let out = render_overlay(&gray, &markers, &corners);
        assert_eq!(*out.get_pixel(25, 10), MARKER_COLOR);
        assert_eq!(*out.get_pixel(25, 25), CORNER_COLOR);
        assert_eq!(*out.get_pixel(10, 10), MARKER_ORIGIN_COLOR);
    }
}
