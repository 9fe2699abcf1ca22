//! Two-image face comparison: multi-face guard, embedding, cosine scoring
//! and thresholded verdict.

use crate::extractor::{primary_face, ExtractorError, FaceExtractor};
use crate::image_io::{ImageError, ALLOWED_MIME_TYPES};
use crate::types::{BoundingBox, Embedding};
use image::RgbImage;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Score at or above which two faces are reported as the same person.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Position of an input image in a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    First,
    Second,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::First => f.write_str("first image"),
            ImageRole::Second => f.write_str("second image"),
        }
    }
}

/// How a front end names the two inputs in user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleNames {
    pub first: &'static str,
    pub second: &'static str,
}

impl RoleNames {
    pub const ORDINAL: RoleNames = RoleNames { first: "First image", second: "Second image" };
    pub const REAL_TARGET: RoleNames = RoleNames { first: "Real image", second: "Target image" };

    pub fn name(&self, role: ImageRole) -> &'static str {
        match role {
            ImageRole::First => self.first,
            ImageRole::Second => self.second,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    SamePerson,
    DifferentPerson,
}

impl Verdict {
    pub fn classify(score: f32, threshold: f32) -> Self {
        if score >= threshold {
            Verdict::SamePerson
        } else {
            Verdict::DifferentPerson
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::SamePerson => "Same person",
            Verdict::DifferentPerson => "Different person",
        }
    }
}

/// Successful comparison of two single-face images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Comparison {
    pub score: f32,
    pub verdict: Verdict,
}

impl Comparison {
    /// Human-readable result line, e.g. `Same person / similar (0.83)`.
    pub fn summary(&self) -> String {
        format!("{} / similar ({})", self.verdict.label(), self.score)
    }
}

#[derive(Error, Debug)]
pub enum ComparisonError {
    #[error("no face detected in {0}")]
    NoFaceDetected(ImageRole),
    #[error("{role} has multiple faces ({count})")]
    MultipleFacesDetected { role: ImageRole, count: usize },
    #[error("{role} {source}")]
    UnsupportedImageType { role: ImageRole, source: ImageError },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ComparisonError {
    /// Classify an image loading failure for the given input.
    pub fn from_image(role: ImageRole, err: ImageError) -> Self {
        match err {
            ImageError::Io(e) => ComparisonError::Io(e),
            other => ComparisonError::UnsupportedImageType { role, source: other },
        }
    }

    fn from_extractor(role: ImageRole, err: ExtractorError) -> Self {
        match err {
            ExtractorError::NoFaceDetected => ComparisonError::NoFaceDetected(role),
            other => ComparisonError::Inference(other.to_string()),
        }
    }

    /// User-facing message, naming inputs the way the caller's front end does.
    pub fn message(&self, names: RoleNames) -> String {
        match self {
            ComparisonError::NoFaceDetected(role) => {
                format!("No face detected in {}.", names.name(*role).to_lowercase())
            }
            ComparisonError::MultipleFacesDetected { role, .. } => {
                format!("{} has multiple faces.", names.name(*role))
            }
            ComparisonError::UnsupportedImageType {
                role,
                source: ImageError::UnsupportedType(kind),
            } => format!(
                "{} type {kind} not supported. Allowed: {ALLOWED_MIME_TYPES:?}",
                names.name(*role)
            ),
            ComparisonError::UnsupportedImageType { role, source } => {
                format!("{} {source}.", names.name(*role))
            }
            ComparisonError::Io(e) => format!("Error processing files: {e}"),
            ComparisonError::Inference(detail) => format!("Face analysis failed: {detail}"),
        }
    }
}

/// Compares two images with a shared extractor and a fixed threshold.
pub struct ComparisonPipeline<E> {
    extractor: E,
    threshold: f32,
}

impl<E: FaceExtractor> ComparisonPipeline<E> {
    pub fn new(extractor: E, threshold: f32) -> Self {
        Self { extractor, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Compare the faces in two images.
    ///
    /// Both images are checked for multiple faces before either is embedded.
    pub fn compare(&mut self, first: &RgbImage, second: &RgbImage) -> Result<Comparison, ComparisonError> {
        let first_faces = self.faces(ImageRole::First, first)?;
        let second_faces = self.faces(ImageRole::Second, second)?;

        for (role, faces) in [(ImageRole::First, &first_faces), (ImageRole::Second, &second_faces)] {
            if faces.len() > 1 {
                tracing::debug!(%role, count = faces.len(), "multi-face guard rejected input");
                return Err(ComparisonError::MultipleFacesDetected { role, count: faces.len() });
            }
        }

        let a = self.embed(ImageRole::First, first, &first_faces)?;
        let b = self.embed(ImageRole::Second, second, &second_faces)?;

        let score = a.similarity(&b);
        let verdict = Verdict::classify(score, self.threshold);
        tracing::debug!(score, ?verdict, threshold = self.threshold, "comparison complete");

        Ok(Comparison { score, verdict })
    }

    fn faces(&mut self, role: ImageRole, image: &RgbImage) -> Result<Vec<BoundingBox>, ComparisonError> {
        self.extractor
            .detect_faces(image)
            .map_err(|e| ComparisonError::from_extractor(role, e))
    }

    fn embed(
        &mut self,
        role: ImageRole,
        image: &RgbImage,
        faces: &[BoundingBox],
    ) -> Result<Embedding, ComparisonError> {
        let face = primary_face(faces).ok_or(ComparisonError::NoFaceDetected(role))?;
        self.extractor
            .embed(image, face)
            .map_err(|e| ComparisonError::from_extractor(role, e))
    }
}
