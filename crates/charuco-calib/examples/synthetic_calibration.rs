//! Run the full capture-and-calibrate pipeline on a synthetic scene.

use charuco_calib::core::{Board, BoardSpec, DictionaryId, GrayImage};
use charuco_calib::detect::synthetic::{ProjectedBoardDetector, SyntheticScene};
use charuco_calib::detect::DetectorParams;
use charuco_calib::{
    run_charuco_stage, run_marker_stage, AutoAccept, BufferSource, CalibrationOptions,
    CameraParamsFile, CaptureOptions, CaptureSession,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let n_views = 6;

    let board = Board::new(BoardSpec {
        squares_x: 5,
        squares_y: 7,
        square_length: 0.04,
        marker_length: 0.02,
        dictionary: DictionaryId::Dict6x6_250,
    })?;

    let scene = SyntheticScene::standard(board.clone(), n_views);
    let mut detector = ProjectedBoardDetector::new(scene.clone());
    let mut source = BufferSource::new(
        (0..n_views)
            .map(|_| GrayImage::new(1280, 720))
            .collect(),
    );

    let params = DetectorParams::default();
    let session = CaptureSession::new(&board, &params, CaptureOptions::default());
    let dataset = session.run(&mut source, &mut detector, &mut AutoAccept::default())?;
    println!("captured {} frame(s)", dataset.len());

    let options = CalibrationOptions::default();
    let coarse = run_marker_stage(&dataset, &board, &options)?;
    println!(
        "marker stage: rms {:.6} px, fx {:.2}, fy {:.2}",
        coarse.reprojection_error, coarse.intrinsics.fx, coarse.intrinsics.fy
    );

    let result = run_charuco_stage(&dataset, &board, &coarse, &options)?;
    println!(
        "charuco stage: rms {:.6} px, fx {:.2}, fy {:.2} (truth fx {:.2}, fy {:.2})",
        result.reprojection_error,
        result.intrinsics.fx,
        result.intrinsics.fy,
        scene.intrinsics.fx,
        scene.intrinsics.fy
    );

    let out = std::env::temp_dir().join("synthetic_camera.json");
    CameraParamsFile::from_result(&result).write_json(&out)?;
    println!("parameters written to {}", out.display());

    Ok(())
}
