//! Interactive comparison form.
//!
//! A single HTML page with two uploads and a "Predict" button. Submitting
//! re-renders the page with both images and either the similarity metric or
//! an error banner.

use crate::engine::EngineError;
use crate::http_interface::{compare_uploads, AppState, Upload, UploadForm};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::response::Html;
use base64::Engine as _;
use facesim_core::image_io::{self, ALLOWED_EXTENSIONS};
use facesim_core::{ImageRole, RoleNames};

const FIRST_FIELD: &str = "file_1";
const SECOND_FIELD: &str = "file_2";

/// What the page shows below the form.
#[derive(Debug, Default)]
struct PageView {
    previews: [Option<String>; 2],
    similarity: Option<String>,
    verdict: Option<&'static str>,
    error: Option<String>,
}

/// `GET /`
pub async fn index() -> Html<String> {
    Html(render(&PageView::default()))
}

/// `POST /form`
pub async fn submit(State(state): State<AppState>, multipart: Result<Multipart, MultipartRejection>) -> Html<String> {
    let form = match multipart {
        Ok(multipart) => UploadForm::collect(multipart).await.map_err(|e| e.body_text()),
        Err(rejection) => Err(rejection.body_text()),
    };
    let form = match form {
        Ok(form) => form,
        Err(message) => {
            return Html(render(&PageView {
                error: Some(message),
                ..PageView::default()
            }))
        }
    };

    let first = form.file(FIRST_FIELD);
    let second = form.file(SECOND_FIELD);
    let mut view = PageView {
        previews: [first.map(data_uri), second.map(data_uri)],
        ..PageView::default()
    };

    let (Some(first), Some(second)) = (first, second) else {
        view.error = Some("Please upload two image files".to_string());
        return Html(render(&view));
    };

    for (role, upload) in [(ImageRole::First, first), (ImageRole::Second, second)] {
        let name = upload.file_name.as_deref().unwrap_or_default();
        if image_io::check_extension(name).is_err() {
            view.error = Some(format!(
                "{} must be one of: {}",
                RoleNames::ORDINAL.name(role),
                ALLOWED_EXTENSIONS.join(", ")
            ));
            return Html(render(&view));
        }
    }

    match compare_uploads(&state, &first.bytes, &second.bytes).await {
        Ok(comparison) => {
            tracing::info!(score = comparison.score, "form comparison succeeded");
            view.similarity = Some(format!("{:.2}", comparison.score));
            view.verdict = Some(comparison.verdict.label());
        }
        Err(err) => {
            tracing::info!(error = %err, "form comparison failed");
            view.error = Some(match &err {
                EngineError::Comparison(e) => e.message(RoleNames::ORDINAL),
                other => other.to_string(),
            });
        }
    }
    Html(render(&view))
}

fn data_uri(upload: &Upload) -> String {
    let mime = upload.content_type.as_deref().unwrap_or("image/png");
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(&upload.bytes)
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn render(view: &PageView) -> String {
    let accept = ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(",");

    let column = |field: &str, preview: &Option<String>| {
        let image = preview
            .as_deref()
            .map(|src| format!(r#"<img src="{}" alt="{field}">"#, html_escape(src)))
            .unwrap_or_default();
        format!(
            r#"<div class="col"><label>Please upload an image file<input type="file" name="{field}" accept="{accept}"></label>{image}</div>"#
        )
    };

    let mut outcome = String::new();
    if let Some(error) = &view.error {
        outcome.push_str(&format!(r#"<p class="error">{}</p>"#, html_escape(error)));
    }
    if let Some(score) = &view.similarity {
        outcome.push_str(&format!(
            r#"<div class="metric"><span>Similarity</span><strong>{}</strong>"#,
            html_escape(score)
        ));
        if let Some(verdict) = view.verdict {
            outcome.push_str(&format!("<em>{verdict}</em>"));
        }
        outcome.push_str("</div>");
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Face Recognition App (Demo)</title>
<style>
body {{ font-family: sans-serif; max-width: 960px; margin: 2rem auto; }}
.row {{ display: flex; gap: 2rem; }}
.col {{ flex: 1; }}
.col img {{ max-width: 100%; margin-top: 1rem; }}
.error {{ background: #fde8e8; color: #9b1c1c; padding: 0.75rem; }}
.metric span {{ display: block; color: #555; }}
.metric strong {{ font-size: 2rem; margin-right: 1rem; }}
</style>
</head>
<body>
<h1>Face Recognition App (Demo)</h1>
<form method="post" action="/form" enctype="multipart/form-data">
<div class="row">{first}{second}</div>
<button type="submit">Predict</button>
</form>
{outcome}
</body>
</html>
"#,
        first = column(FIRST_FIELD, &view.previews[0]),
        second = column(SECOND_FIELD, &view.previews[1]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_interface::test_support::{app, body_string, multipart_request, Part};
    use crate::testing::png;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape(r#"<b>"x" & 'y'</b>"#), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }

    #[tokio::test]
    async fn test_index_renders_form() {
        let app = app();
        let response = app
            .router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains(r#"name="file_1""#));
        assert!(html.contains(r#"accept=".jpg,.png,.jpeg,.jfif""#));
        assert!(html.contains("Predict"));
    }

    #[tokio::test]
    async fn test_submit_shows_similarity() {
        let app = app();
        let a = png(1, 100, 0);
        let b = png(1, 100, 0);
        let request = multipart_request(
            "/form",
            &[
                Part::File { name: FIRST_FIELD, file_name: "a.png", content_type: "image/png", bytes: &a },
                Part::File { name: SECOND_FIELD, file_name: "b.jpeg", content_type: "image/jpeg", bytes: &b },
            ],
        );

        let html = body_string(app.router.oneshot(request).await.unwrap()).await;
        assert!(html.contains("<strong>1.00</strong>"), "{html}");
        assert!(html.contains("Same person"));
        assert!(html.contains("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_submit_missing_file_prompts_for_both() {
        let app = app();
        let a = png(1, 1, 1);
        let request = multipart_request(
            "/form",
            &[Part::File { name: FIRST_FIELD, file_name: "a.png", content_type: "image/png", bytes: &a }],
        );

        let html = body_string(app.router.oneshot(request).await.unwrap()).await;
        assert!(html.contains("Please upload two image files"));
        assert_eq!(app.extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_submit_multi_face_error() {
        let app = app();
        let a = png(1, 1, 1);
        let b = png(2, 1, 1);
        let request = multipart_request(
            "/form",
            &[
                Part::File { name: FIRST_FIELD, file_name: "a.png", content_type: "image/png", bytes: &a },
                Part::File { name: SECOND_FIELD, file_name: "b.png", content_type: "image/png", bytes: &b },
            ],
        );

        let html = body_string(app.router.oneshot(request).await.unwrap()).await;
        assert!(html.contains("Second image has multiple faces."));
        assert!(!html.contains("class=\"metric\""));
    }

    #[tokio::test]
    async fn test_submit_rejects_extension() {
        let app = app();
        let a = png(1, 1, 1);
        let request = multipart_request(
            "/form",
            &[
                Part::File { name: FIRST_FIELD, file_name: "a.gif", content_type: "image/gif", bytes: &a },
                Part::File { name: SECOND_FIELD, file_name: "b.png", content_type: "image/png", bytes: &a },
            ],
        );

        let html = body_string(app.router.oneshot(request).await.unwrap()).await;
        assert!(html.contains("First image must be one of: jpg, png, jpeg, jfif"));
        assert_eq!(app.extractor.calls.load(Ordering::SeqCst), 0);
    }
}
