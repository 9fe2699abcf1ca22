//! HTTP surface: shared state, routing and upload plumbing.
//!
//! Routes:
//!   GET  /                         interactive form
//!   POST /form                     form submission
//!   POST /v1/image/face/similar    JSON with base64 images
//!   POST /v2/image/face/similar    multipart upload
//!   GET  /status                   service status

use crate::engine::{EngineError, EngineHandle};
use crate::scratch::RequestScratch;
use crate::{api, form};
use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use facesim_core::{Comparison, ComparisonError, ImageRole};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub scratch_root: Arc<PathBuf>,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(form::index))
        .route("/form", post(form::submit))
        .route("/v1/image/face/similar", post(api::similar_v1))
        .route("/v2/image/face/similar", post(api::similar_v2))
        .route("/status", get(api::status))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// One uploaded file part.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// All parts of a multipart body, split into files and text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    files: HashMap<String, Upload>,
    text: HashMap<String, String>,
}

impl UploadForm {
    /// Drain a multipart body. Parts with a file name are files; parts
    /// without one are text fields. Empty file parts (no file chosen in a
    /// browser form) are skipped.
    pub async fn collect(mut multipart: Multipart) -> Result<Self, MultipartError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);

            if file_name.is_some() {
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.files.insert(name, Upload { file_name, content_type, bytes });
                }
            } else {
                let value = field.text().await?;
                form.text.insert(name, value);
            }
        }
        Ok(form)
    }

    pub fn file(&self, name: &str) -> Option<&Upload> {
        self.files.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }
}

/// Write both images to fresh scratch storage and run the comparison.
///
/// The scratch directory lives until the engine has replied.
pub async fn compare_uploads(state: &AppState, first: &[u8], second: &[u8]) -> Result<Comparison, EngineError> {
    let scratch = RequestScratch::create(&state.scratch_root).await.map_err(ComparisonError::Io)?;
    tracing::debug!(dir = %scratch.path().display(), "scratch directory created");
    let first_path = scratch.store(ImageRole::First, first).await.map_err(ComparisonError::Io)?;
    let second_path = scratch.store(ImageRole::Second, second).await.map_err(ComparisonError::Io)?;

    state.engine.compare(first_path, second_path).await
}
