//! Face extraction: one loaded detector/recognizer pair behind a trait.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("no face detected")]
    NoFaceDetected,
}

/// Locates faces and turns one of them into an identity embedding.
///
/// Methods take `&mut self`: ONNX sessions need exclusive access to run.
/// Implementors provide [`detect_faces`](Self::detect_faces) and
/// [`embed`](Self::embed); the comparison pipeline calls that pair directly
/// so each image is detected only once. [`count_faces`](Self::count_faces)
/// and [`detect_single_face`](Self::detect_single_face) are the one-shot
/// forms for callers that need only one of the two answers.
pub trait FaceExtractor {
    /// All faces in the image, highest confidence first.
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractorError>;

    /// Embedding of one face previously returned by [`detect_faces`](Self::detect_faces).
    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, ExtractorError>;

    fn count_faces(&mut self, image: &RgbImage) -> Result<usize, ExtractorError> {
        Ok(self.detect_faces(image)?.len())
    }

    /// Embed the primary face of the image; fails with `NoFaceDetected` when there is none.
    fn detect_single_face(&mut self, image: &RgbImage) -> Result<Embedding, ExtractorError> {
        let faces = self.detect_faces(image)?;
        let face = primary_face(&faces).ok_or(ExtractorError::NoFaceDetected)?;
        self.embed(image, face)
    }
}

/// The face to identify when several are present: the largest box, with
/// confidence breaking ties.
pub fn primary_face(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    faces.iter().max_by(|a, b| {
        a.area()
            .total_cmp(&b.area())
            .then(a.confidence.total_cmp(&b.confidence))
    })
}

/// SCRFD + ArcFace extractor running on ONNX Runtime.
pub struct OnnxFaceExtractor {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceExtractor {
    /// Load both models from `model_dir` ([`DETECTOR_MODEL_FILE`], [`RECOGNIZER_MODEL_FILE`]).
    pub fn load(model_dir: &Path) -> Result<Self, ExtractorError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceExtractor for OnnxFaceExtractor {
    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractorError> {
        Ok(self.detector.detect(image)?)
    }

    fn embed(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, ExtractorError> {
        Ok(self.recognizer.extract(image, face)?)
    }
}
