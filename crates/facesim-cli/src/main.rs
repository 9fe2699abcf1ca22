use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facesim_core::image_io;
use facesim_core::{
    ComparisonError, ComparisonPipeline, FaceExtractor, ImageRole, OnnxFaceExtractor, RoleNames,
    DEFAULT_SIMILARITY_THRESHOLD,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "facesim", about = "Compare faces in images with SCRFD + ArcFace")]
struct Cli {
    /// Directory holding det_10g.onnx and w600k_r50.onnx
    /// [default: $FACESIM_MODEL_DIR, then ~/.local/share/facesim/models]
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the faces in two images
    Compare {
        first: PathBuf,
        second: PathBuf,
        /// Score at or above which the faces are the same person
        #[arg(short, long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD, value_parser = parse_threshold)]
        threshold: f32,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every face detected in an image as JSON
    Detect {
        image: PathBuf,
        /// Print only the number of faces
        #[arg(long)]
        count: bool,
    },
}

/// Similarity thresholds live in the cosine range [-1, 1].
fn parse_threshold(value: &str) -> Result<f32, String> {
    let threshold: f32 = value.parse().map_err(|e| format!("{e}"))?;
    if (-1.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(format!("{threshold} is outside [-1, 1]"))
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let model_dir = resolve_model_dir(cli.model_dir, std::env::var_os("FACESIM_MODEL_DIR"));
    tracing::debug!(model_dir = %model_dir.display(), "resolved model directory");

    let extractor = OnnxFaceExtractor::load(&model_dir)
        .with_context(|| format!("loading models from {}", model_dir.display()))?;

    match cli.command {
        Commands::Compare {
            first,
            second,
            threshold,
            json,
        } => {
            let mut pipeline = ComparisonPipeline::new(extractor, threshold);
            let outcome = compare_files(&mut pipeline, &first, &second);
            print_outcome(&outcome, json);
            Ok(if outcome.is_ok() { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }
        Commands::Detect { image, count } => {
            let mut extractor = extractor;
            let raster = image_io::open_image(&image)
                .with_context(|| format!("reading {}", image.display()))?;
            if count {
                println!("{}", extractor.count_faces(&raster)?);
            } else {
                let faces = extractor.detect_faces(&raster)?;
                println!("{}", serde_json::to_string_pretty(&faces)?);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_model_dir(flag: Option<PathBuf>, env: Option<std::ffi::OsString>) -> PathBuf {
    flag.or_else(|| env.map(PathBuf::from))
        .unwrap_or_else(facesim_core::default_model_dir)
}

fn compare_files<E: FaceExtractor>(
    pipeline: &mut ComparisonPipeline<E>,
    first: &Path,
    second: &Path,
) -> Result<facesim_core::Comparison, ComparisonError> {
    let first = image_io::open_image(first).map_err(|e| ComparisonError::from_image(ImageRole::First, e))?;
    let second = image_io::open_image(second).map_err(|e| ComparisonError::from_image(ImageRole::Second, e))?;
    pipeline.compare(&first, &second)
}

fn print_outcome(outcome: &Result<facesim_core::Comparison, ComparisonError>, json: bool) {
    match (outcome, json) {
        (Ok(comparison), false) => println!("{}", comparison.summary()),
        (Ok(comparison), true) => println!(
            "{}",
            serde_json::json!({
                "status": "success",
                "result": comparison.summary(),
                "score": comparison.score,
                "verdict": comparison.verdict,
            })
        ),
        (Err(err), false) => eprintln!("{}", err.message(RoleNames::ORDINAL)),
        (Err(err), true) => println!(
            "{}",
            serde_json::json!({
                "status": "error",
                "message": err.message(RoleNames::ORDINAL),
            })
        ),
    }
}
