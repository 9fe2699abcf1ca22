//! JSON similarity endpoints.

use crate::engine::EngineError;
use crate::http_interface::{compare_uploads, AppState, UploadForm};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use base64::Engine as _;
use facesim_core::image_io;
use facesim_core::{Comparison, ComparisonError, ImageRole, RoleNames};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SimilarityRequest {
    pub client_id: Uuid,
    /// Base64-encoded image bytes.
    pub real_image: String,
    /// Base64-encoded image bytes.
    pub target_image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SimilarityResponse {
    fn success(client_id: String, comparison: &Comparison) -> Self {
        Self {
            status: "success".into(),
            client_id: Some(client_id),
            result: Some(comparison.summary()),
            score: Some(comparison.score),
            message: None,
        }
    }

    fn error(client_id: Option<String>, message: String) -> Self {
        Self {
            status: "error".into(),
            client_id,
            result: None,
            score: None,
            message: Some(message),
        }
    }
}

type Reply = (StatusCode, Json<SimilarityResponse>);

fn validation_error(message: String) -> Reply {
    tracing::debug!(%message, "rejected malformed request");
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(SimilarityResponse::error(None, message)),
    )
}

fn outcome(client_id: String, result: Result<Comparison, EngineError>, names: RoleNames) -> Reply {
    let response = match result {
        Ok(comparison) => {
            tracing::info!(
                %client_id,
                score = comparison.score,
                verdict = comparison.verdict.label(),
                "comparison succeeded"
            );
            SimilarityResponse::success(client_id, &comparison)
        }
        Err(err) => {
            tracing::info!(%client_id, error = %err, "comparison failed");
            let message = match &err {
                EngineError::Comparison(e) => e.message(names),
                other => other.to_string(),
            };
            SimilarityResponse::error(Some(client_id), message)
        }
    };
    (StatusCode::OK, Json(response))
}

/// Line-wrapped base64 (MIME, `base64` CLI output) decodes like the flat form.
fn strip_whitespace(data: &str) -> Vec<u8> {
    data.bytes().filter(|b| !b.is_ascii_whitespace()).collect()
}

/// `POST /v1/image/face/similar`: JSON body with base64-encoded images.
pub async fn similar_v1(
    State(state): State<AppState>,
    payload: Result<Json<SimilarityRequest>, JsonRejection>,
) -> Reply {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return validation_error(rejection.body_text()),
    };
    let client_id = request.client_id.to_string();
    tracing::info!(%client_id, "v1 similarity request");

    let names = RoleNames::ORDINAL;
    let decode = |role: ImageRole, data: &str| {
        base64::engine::general_purpose::STANDARD
            .decode(strip_whitespace(data))
            .map_err(|e| format!("{} is not valid base64: {e}", names.name(role)))
    };
    let (real, target) = match (
        decode(ImageRole::First, &request.real_image),
        decode(ImageRole::Second, &request.target_image),
    ) {
        (Ok(real), Ok(target)) => (real, target),
        (Err(message), _) | (_, Err(message)) => {
            return (StatusCode::OK, Json(SimilarityResponse::error(Some(client_id), message)));
        }
    };

    let result = compare_uploads(&state, &real, &target).await;
    outcome(client_id, result, names)
}

/// `POST /v2/image/face/similar`: multipart upload with MIME validation.
pub async fn similar_v2(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Reply {
    let multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => return validation_error(rejection.body_text()),
    };
    let form = match UploadForm::collect(multipart).await {
        Ok(form) => form,
        Err(err) => return validation_error(err.body_text()),
    };

    let Some(client_id) = form.text("client_id").map(str::to_string) else {
        return validation_error("field required: client_id".into());
    };
    let (Some(real), Some(target)) = (form.file("real_image"), form.file("target_image")) else {
        let missing: Vec<&str> = ["real_image", "target_image"]
            .into_iter()
            .filter(|name| form.file(name).is_none())
            .collect();
        return validation_error(format!("field required: {}", missing.join(", ")));
    };
    tracing::info!(%client_id, "v2 similarity request");

    let names = RoleNames::REAL_TARGET;
    for (role, upload) in [(ImageRole::First, real), (ImageRole::Second, target)] {
        if let Err(err) = image_io::check_mime_type(upload.content_type.as_deref()) {
            let message = ComparisonError::from_image(role, err).message(names);
            tracing::info!(%client_id, %message, "rejected upload type");
            return (StatusCode::OK, Json(SimilarityResponse::error(Some(client_id), message)));
        }
    }

    let result = compare_uploads(&state, &real.bytes, &target.bytes).await;
    outcome(client_id, result, names)
}

/// `GET /status`: version, engine liveness and threshold.
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "models_loaded": state.engine.is_running(),
        "similarity_threshold": state.engine.threshold(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_interface::test_support::{app, body_string, multipart_request, Part};
    use crate::testing::png;
    use axum::body::Body;
    use axum::http::{header, Request};
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn json_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/image/face/similar")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn parse(response: axum::response::Response) -> (StatusCode, SimilarityResponse) {
        let status = response.status();
        let body = body_string(response).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    const CLIENT: &str = "6f1c1f5e-4a43-4b8e-9d4e-3f3f9a0c2b11";

    #[tokio::test]
    async fn test_v1_same_person() {
        let app = app();
        let response = app
            .router
            .oneshot(json_request(serde_json::json!({
                "client_id": CLIENT,
                "real_image": b64(&png(1, 120, 40)),
                "target_image": b64(&png(1, 118, 44)),
            })))
            .await
            .unwrap();

        let (status, body) = parse(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "success");
        assert_eq!(body.client_id.as_deref(), Some(CLIENT));
        assert!(body.result.unwrap().contains("Same person"));
        assert!(body.score.unwrap() >= 0.7);
        assert!(body.message.is_none());
    }

    #[tokio::test]
    async fn test_v1_different_person() {
        let app = app();
        let response = app
            .router
            .oneshot(json_request(serde_json::json!({
                "client_id": CLIENT,
                "real_image": b64(&png(1, 200, 0)),
                "target_image": b64(&png(1, 0, 200)),
            })))
            .await
            .unwrap();

        let (_, body) = parse(response).await;
        assert_eq!(body.status, "success");
        assert!(body.result.unwrap().contains("Different person"));
        assert!(body.score.unwrap() < 0.7);
    }

    #[tokio::test]
    async fn test_v1_multiple_faces_names_first_image() {
        let app = app();
        let response = app
            .router
            .oneshot(json_request(serde_json::json!({
                "client_id": CLIENT,
                "real_image": b64(&png(2, 1, 1)),
                "target_image": b64(&png(1, 1, 1)),
            })))
            .await
            .unwrap();

        let (_, body) = parse(response).await;
        assert_eq!(body.status, "error");
        assert_eq!(body.message.as_deref(), Some("First image has multiple faces."));
        assert!(body.score.is_none());
    }

    #[tokio::test]
    async fn test_v1_no_face() {
        let app = app();
        let response = app
            .router
            .oneshot(json_request(serde_json::json!({
                "client_id": CLIENT,
                "real_image": b64(&png(1, 1, 1)),
                "target_image": b64(&png(0, 1, 1)),
            })))
            .await
            .unwrap();

        let (_, body) = parse(response).await;
        assert_eq!(body.status, "error");
        assert_eq!(body.message.as_deref(), Some("No face detected in second image."));
    }

    #[tokio::test]
    async fn test_v1_missing_image_is_validation_error() {
        let app = app();
        let response = app
            .router
            .oneshot(json_request(serde_json::json!({
                "client_id": CLIENT,
                "real_image": b64(&png(1, 1, 1)),
            })))
            .await
            .unwrap();

        let (status, body) = parse(response).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.status, "error");
        assert!(body.message.unwrap().contains("target_image"));
        assert_eq!(app.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_v1_rejects_non_uuid_client_id() {
        let app = app();
        let response = app
            .router
            .oneshot(json_request(serde_json::json!({
                "client_id": "../../etc/passwd",
                "real_image": "",
                "target_image": "",
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_v1_bad_base64() {
        let app = app();
        let response = app
            .router
            .oneshot(json_request(serde_json::json!({
                "client_id": CLIENT,
                "real_image": b64(&png(1, 1, 1)),
                "target_image": "%%% not base64 %%%",
            })))
            .await
            .unwrap();

        let (status, body) = parse(response).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.message.unwrap().starts_with("Second image is not valid base64"));
        assert_eq!(app.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_v1_line_wrapped_base64() {
        let app = app();
        let wrap = |encoded: String| {
            encoded
                .as_bytes()
                .chunks(76)
                .map(|line| std::str::from_utf8(line).unwrap())
                .collect::<Vec<_>>()
                .join("\r\n")
        };
        let real = wrap(b64(&png(1, 120, 40)));
        assert!(real.contains('\n'));
        let response = app
            .router
            .oneshot(json_request(serde_json::json!({
                "client_id": CLIENT,
                "real_image": real,
                "target_image": format!("{}\n", wrap(b64(&png(1, 118, 44)))),
            })))
            .await
            .unwrap();

        let (status, body) = parse(response).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "success", "{:?}", body.message);
        assert!(body.result.unwrap().contains("Same person"));
    }

    #[test]
    fn test_strip_whitespace() {
        assert_eq!(strip_whitespace(" ab\r\ncd\t=\n"), b"abcd=");
    }

    #[tokio::test]
    async fn test_v2_missing_client_id_is_validation_error() {
        let app = app();
        let real = png(1, 1, 1);
        let request = multipart_request(
            "/v2/image/face/similar",
            &[
                Part::File { name: "real_image", file_name: "a.png", content_type: "image/png", bytes: &real },
                Part::File { name: "target_image", file_name: "b.png", content_type: "image/png", bytes: &real },
            ],
        );

        let (status, body) = parse(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.message.as_deref(), Some("field required: client_id"));
        assert_eq!(app.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_v2_empty_file_part_counts_as_missing() {
        let app = app();
        let real = png(1, 1, 1);
        let request = multipart_request(
            "/v2/image/face/similar",
            &[
                Part::Text("client_id", "c"),
                Part::File { name: "real_image", file_name: "a.png", content_type: "image/png", bytes: &real },
                Part::File { name: "target_image", file_name: "b.png", content_type: "image/png", bytes: b"" },
            ],
        );

        let (status, body) = parse(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.message.as_deref(), Some("field required: target_image"));
        assert_eq!(app.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_v2_same_person() {
        let app = app();
        let real = png(1, 90, 30);
        let target = png(1, 92, 29);
        let request = multipart_request(
            "/v2/image/face/similar",
            &[
                Part::Text("client_id", "kiosk-7"),
                Part::File { name: "real_image", file_name: "a.png", content_type: "image/png", bytes: &real },
                Part::File { name: "target_image", file_name: "b.jpg", content_type: "image/jpeg", bytes: &target },
            ],
        );

        let (status, body) = parse(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "success");
        assert_eq!(body.client_id.as_deref(), Some("kiosk-7"));
        assert!(body.result.unwrap().starts_with("Same person / similar ("));
    }

    #[tokio::test]
    async fn test_v2_gif_rejected_without_model_call() {
        let app = app();
        let real = png(1, 1, 1);
        let request = multipart_request(
            "/v2/image/face/similar",
            &[
                Part::Text("client_id", "kiosk-7"),
                Part::File { name: "real_image", file_name: "a.png", content_type: "image/png", bytes: &real },
                Part::File { name: "target_image", file_name: "b.gif", content_type: "image/gif", bytes: b"GIF89a" },
            ],
        );

        let (_, body) = parse(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(body.status, "error");
        let message = body.message.unwrap();
        assert!(message.starts_with("Target image type image/gif not supported"), "{message}");
        assert_eq!(app.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_v2_multiple_faces_uses_real_target_names() {
        let app = app();
        let real = png(3, 1, 1);
        let target = png(1, 1, 1);
        let request = multipart_request(
            "/v2/image/face/similar",
            &[
                Part::Text("client_id", "c"),
                Part::File { name: "real_image", file_name: "a.png", content_type: "image/png", bytes: &real },
                Part::File { name: "target_image", file_name: "b.png", content_type: "image/png", bytes: &target },
            ],
        );

        let (_, body) = parse(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(body.message.as_deref(), Some("Real image has multiple faces."));
    }

    #[tokio::test]
    async fn test_v2_missing_file_is_validation_error() {
        let app = app();
        let real = png(1, 1, 1);
        let request = multipart_request(
            "/v2/image/face/similar",
            &[
                Part::Text("client_id", "c"),
                Part::File { name: "real_image", file_name: "a.png", content_type: "image/png", bytes: &real },
            ],
        );

        let (status, body) = parse(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.message.as_deref(), Some("field required: target_image"));
    }

    #[tokio::test]
    async fn test_v2_scratch_cleaned_up() {
        let app = app();
        let real = png(1, 5, 5);
        let request = multipart_request(
            "/v2/image/face/similar",
            &[
                Part::Text("client_id", "../escape"),
                Part::File { name: "real_image", file_name: "a.png", content_type: "image/png", bytes: &real },
                Part::File { name: "target_image", file_name: "b.png", content_type: "image/png", bytes: &real },
            ],
        );

        let (_, body) = parse(app.router.oneshot(request).await.unwrap()).await;
        assert_eq!(body.status, "success");
        let leftovers = std::fs::read_dir(app.scratch.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_status_reports_threshold() {
        let app = app();
        let request = Request::builder().uri("/status").body(Body::empty()).unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["models_loaded"], true);
        assert!((body["similarity_threshold"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }
}
