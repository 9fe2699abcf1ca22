//! facesim-core: face comparison engine.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime, and scores pairs of faces by cosine similarity.

pub mod alignment;
pub mod detector;
pub mod extractor;
pub mod image_io;
pub mod pipeline;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use extractor::{ExtractorError, FaceExtractor, OnnxFaceExtractor};
pub use pipeline::{
    Comparison, ComparisonError, ComparisonPipeline, ImageRole, RoleNames, Verdict,
    DEFAULT_SIMILARITY_THRESHOLD,
};
pub use recognizer::FaceRecognizer;
pub use types::{cosine_similarity, BoundingBox, Embedding};

/// Default model directory: `$XDG_DATA_HOME/facesim/models`, falling back
/// to `~/.local/share/facesim/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facesim/models")
}
