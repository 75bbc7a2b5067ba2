//! Image upload. Files land in the upload directory under a random name and
//! are served back from `/uploads`.

use std::path::Path;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::AppState;
use crate::error::ServerError;
use crate::identity::CurrentUser;

/// Largest accepted image (5 MB).
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// Room for multipart boundaries and part headers on top of the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Multipart field carrying the file.
const FIELD_NAME: &str = "image";

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE + MULTIPART_OVERHEAD))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Lowercased extension of `filename` if it is an accepted image type.
fn image_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

fn multipart_error(err: MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return file_too_large();
    }
    ServerError::InvalidBody(err.body_text())
}

fn file_too_large() -> ServerError {
    ServerError::validation("file too large, maximum size is 5MB")
}

async fn upload_image(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServerError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FIELD_NAME) {
            continue;
        }

        let ext = field
            .file_name()
            .and_then(image_extension)
            .ok_or_else(|| ServerError::validation("invalid file type, only images are allowed"))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.len() > MAX_FILE_SIZE {
            return Err(file_too_large());
        }

        let dir = &state.config.upload_dir;
        tokio::fs::create_dir_all(dir).await.map_err(|err| {
            error!(error = %err, dir = %dir.display(), "Failed to create upload directory");
            ServerError::internal("failed to create upload directory")
        })?;

        let name = format!("{}.{ext}", Uuid::new_v4());
        tokio::fs::write(dir.join(&name), &bytes).await.map_err(|err| {
            error!(error = %err, file = %name, "Failed to save upload");
            ServerError::internal("failed to save file")
        })?;

        info!(user_id = %user.id(), file = %name, size = bytes.len(), "Image uploaded");
        return Ok(Json(UploadResponse {
            url: format!("/uploads/{name}"),
        }));
    }

    debug!(user_id = %user.id(), "Upload without an image field");
    Err(ServerError::validation("no image file provided"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::create_router;
    use crate::routes::tests::{json_body, seed_user, test_state_in};
    use crate::types::Role;
    use axum::body::Body;
    use axum::extract::Request;
    use axum::http::{header, Method};
    use tower::ServiceExt;

    const BOUNDARY: &str = "spotlight-test-boundary";

    fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(token: &str, body: Vec<u8>) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn accepts_image_extensions_only() {
        assert_eq!(image_extension("me.PNG").as_deref(), Some("png"));
        assert_eq!(image_extension("a.b.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(image_extension("clip.webp").as_deref(), Some("webp"));
        assert!(image_extension("script.sh").is_none());
        assert!(image_extension("noext").is_none());
    }

    #[tokio::test]
    async fn stores_image_and_serves_it() {
        let dir = std::env::temp_dir().join(format!("spotlight-upload-{}", Uuid::new_v4()));
        let state = test_state_in(dir.clone()).await;
        let (_, token) = seed_user(&state, "fan1", Role::Fan).await;
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(upload_request(&token, multipart_body("image", "me.png", b"\x89PNG fake")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: UploadResponse = json_body(response).await;
        assert!(body.url.starts_with("/uploads/"));
        assert!(body.url.ends_with(".png"));

        let name = body.url.trim_start_matches("/uploads/");
        assert_eq!(std::fs::read(dir.join(name)).unwrap(), b"\x89PNG fake");

        let served = app
            .oneshot(Request::builder().uri(&body.url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(served.status(), StatusCode::OK);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn rejects_bad_uploads() {
        let dir = std::env::temp_dir().join(format!("spotlight-upload-{}", Uuid::new_v4()));
        let state = test_state_in(dir.clone()).await;
        let (_, token) = seed_user(&state, "fan1", Role::Fan).await;
        let app = create_router(state);

        for body in [
            multipart_body("image", "run.exe", b"MZ"),
            multipart_body("file", "me.png", b"png"),
        ] {
            let response = app.clone().oneshot(upload_request(&token, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let oversized = vec![0u8; MAX_FILE_SIZE + 1];
        let response = app
            .oneshot(upload_request(&token, multipart_body("image", "big.jpg", &oversized)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(!dir.exists() || std::fs::read_dir(&dir).unwrap().next().is_none());
    }
}
