//! charuco-calib CLI — capture ChArUco observations and calibrate a camera.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use charuco_calib::core::{
    init_with_level, Board, BoardError, BoardSpec, Dictionary, DictionaryError, DictionaryId,
};
use charuco_calib::detect::{ConfigError, DetectorParams, SidecarDetector};
use charuco_calib::render::{self, RenderError};
use charuco_calib::solve::CalibrationFlags;
use charuco_calib::{
    run_charuco_stage, run_marker_stage, AutoAccept, CalibrationError, CalibrationOptions,
    CameraParamsFile, CaptureError, CaptureOptions, CaptureSession, ImageSequenceSource,
    SourceError, StdinControl, WriteError,
};

#[derive(Parser)]
#[command(name = "charuco-calib")]
#[command(about = "Camera calibration from ChArUco board captures")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: log::LevelFilter,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture loop over a frame directory and calibrate.
    Capture(CaptureArgs),

    /// Render the printable board pattern.
    Board(BoardArgs),
}

#[derive(Debug, Clone, Args)]
struct BoardGeometry {
    /// Number of squares in X direction.
    #[arg(long)]
    squares_x: u32,

    /// Number of squares in Y direction.
    #[arg(long)]
    squares_y: u32,

    /// Square side length in meters.
    #[arg(long)]
    square_length: f64,

    /// Marker side length in meters.
    #[arg(long)]
    marker_length: f64,

    /// Dictionary name (e.g. DICT_6X6_250) or its numeric id (0..16).
    #[arg(long, default_value = "DICT_6X6_250")]
    dictionary: String,
}

impl BoardGeometry {
    fn build(&self) -> Result<Board, CliError> {
        let dictionary: DictionaryId = self.dictionary.parse()?;
        Ok(Board::new(BoardSpec {
            squares_x: self.squares_x,
            squares_y: self.squares_y,
            square_length: self.square_length,
            marker_length: self.marker_length,
            dictionary,
        })?)
    }
}

#[derive(Debug, Clone, Args)]
struct CaptureArgs {
    #[command(flatten)]
    board: BoardGeometry,

    /// Directory of frame images (with detection reports next to them).
    #[arg(long)]
    frames: PathBuf,

    /// Detector parameter file (JSON). Required; capture aborts without it.
    #[arg(long)]
    detector_params: PathBuf,

    /// Output file for the calibrated camera parameters.
    #[arg(long)]
    out: PathBuf,

    /// Extension of the per-frame detection reports.
    #[arg(long, default_value = "markers.json")]
    report_extension: String,

    /// Re-attempt rejected marker candidates against the board geometry.
    #[arg(long)]
    refind: bool,

    /// Assume zero tangential distortion.
    #[arg(long)]
    zero_tangent_dist: bool,

    /// Fix the principal point at the image center.
    #[arg(long)]
    fix_principal_point: bool,

    /// Fix the fx/fy ratio to this value.
    #[arg(long)]
    aspect_ratio: Option<f64>,

    /// Directory for per-frame and post-calibration overlay images.
    #[arg(long)]
    review_dir: Option<PathBuf>,

    /// Accept every frame with markers instead of prompting on stdin.
    #[arg(long)]
    auto: bool,

    /// With --auto, stop capturing after this many accepted frames.
    #[arg(long)]
    max_frames: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct BoardArgs {
    #[command(flatten)]
    board: BoardGeometry,

    /// Dictionary code table (JSON) used to draw the marker interiors.
    #[arg(long)]
    codes: PathBuf,

    /// Output image path.
    #[arg(long, default_value = "board.png")]
    out: PathBuf,

    /// Rendered pixels per board square.
    #[arg(long, default_value = "100")]
    px_per_square: u32,

    /// White margin around the board, in pixels.
    #[arg(long, default_value = "50")]
    margin: u32,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Each fatal kind maps to its own process exit status.
fn exit_code(err: &CliError) -> i32 {
    match err {
        CliError::Config(_) => 2,
        CliError::Source(_) | CliError::Capture(CaptureError::Source(_)) => 3,
        CliError::Calibration(
            CalibrationError::NoMarkerFrames | CalibrationError::TooFewCornerFrames { .. },
        ) => 4,
        CliError::Write(_) => 5,
        _ => 1,
    }
}

/// An exactly integral ratio is the classic `16/9`-in-integer-arithmetic
/// mistake; the value is honored but loudly questioned.
fn suspicious_aspect_ratio(ratio: f64) -> bool {
    ratio > 0.0 && ratio.fract() == 0.0
}

fn run_capture(args: &CaptureArgs) -> Result<(), CliError> {
    // Detector parameters first: without them, no detection is defined.
    let params = DetectorParams::load_json(&args.detector_params)?;
    let board = args.board.build()?;

    if let Some(ratio) = args.aspect_ratio {
        if suspicious_aspect_ratio(ratio) {
            log::warn!(
                "aspect ratio {ratio} is exactly integral; if this came from an expression \
                 like 16/9, you probably meant 16.0/9.0 = {:.6}",
                16.0 / 9.0
            );
        }
    }

    let options = CalibrationOptions {
        flags: CalibrationFlags {
            use_intrinsic_guess: false,
            fix_aspect_ratio: args.aspect_ratio.is_some(),
            fix_principal_point: args.fix_principal_point,
            zero_tangent_dist: args.zero_tangent_dist,
        },
        aspect_ratio: args.aspect_ratio.unwrap_or(1.0),
    };

    let mut source = ImageSequenceSource::from_dir(&args.frames)?;
    let mut detector = SidecarDetector::new(args.report_extension.clone());
    let capture_options = CaptureOptions {
        review_dir: args.review_dir.clone(),
        ..CaptureOptions::default()
    }
    .with_refind(args.refind);

    let session = CaptureSession::new(&board, &params, capture_options);
    let dataset = if args.auto {
        session.run(
            &mut source,
            &mut detector,
            &mut AutoAccept {
                max_frames: args.max_frames,
            },
        )?
    } else {
        session.run(&mut source, &mut detector, &mut StdinControl::default())?
    };
    log::info!("capture finished with {} accepted frame(s)", dataset.len());

    let coarse = run_marker_stage(&dataset, &board, &options)?;
    let result = run_charuco_stage(&dataset, &board, &coarse, &options)?;

    let file = CameraParamsFile::from_result(&result);
    file.write_json(&args.out)?;
    log::info!(
        "rms reprojection error: {:.4} px (marker-only baseline: {:.4} px)",
        result.reprojection_error,
        result.marker_reprojection_error
    );
    log::info!("calibration saved to {}", args.out.display());

    // Post-calibration corner review: refined corners over the stored frames.
    if let Some(dir) = &args.review_dir {
        for (i, (frame, corners)) in dataset
            .frames
            .iter()
            .zip(&result.refined_corners)
            .enumerate()
        {
            let name = format!("review_{i:04}.png");
            if let Err(err) = render::write_overlay(dir, &name, &frame.image, &[], corners) {
                log::warn!("could not write {name}: {err}");
            }
        }
    }

    Ok(())
}

fn run_board(args: &BoardArgs) -> Result<(), CliError> {
    let board = args.board.build()?;
    let dict = Dictionary::load_json(&args.codes)?;
    dict.check_id(board.spec().dictionary)?;

    render::write_board_png(&board, &dict, args.px_per_square, args.margin, &args.out)?;
    log::info!(
        "board pattern ({}x{} squares, {} markers) written to {}",
        board.spec().squares_x,
        board.spec().squares_y,
        board.marker_count(),
        args.out.display()
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let _ = init_with_level(cli.log_level);

    let result = match &cli.command {
        Commands::Capture(args) => run_capture(args),
        Commands::Board(args) => run_board(args),
    };

    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(exit_code(&err));
    }
}
