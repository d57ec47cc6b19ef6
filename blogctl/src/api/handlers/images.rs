use crate::api::models::images::{ImageUploadResponse, ImageUrlQuery, ImageUrlResponse};
use crate::api::models::users::CurrentUser;
use crate::errors::{Error, Result};
use crate::images::{ImageStore, marker, strip_marker};
use crate::AppState;
use axum::{
    Json,
    extract::{Multipart, Query, State, multipart::MultipartError},
    http::StatusCode,
};
use tracing::info;

fn image_store(state: &AppState) -> Result<&ImageStore> {
    state.images.as_deref().ok_or_else(|| Error::BadRequest {
        message: "Image storage is not enabled".to_string(),
    })
}

fn too_large(max_file_size: u64) -> Error {
    Error::PayloadTooLarge {
        message: format!("Image exceeds the maximum size of {max_file_size} bytes"),
    }
}

fn multipart_error(e: MultipartError, max_file_size: u64) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return too_large(max_file_size);
    }
    Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", e.body_text()),
    }
}

#[utoipa::path(
    post,
    path = "/images",
    tag = "images",
    summary = "Upload image",
    description = "Stores the image sent in the `file` field and returns the marker to place in post content.",
    request_body(
        content_type = "multipart/form-data",
        description = "The image in a `file` field"
    ),
    responses(
        (status = 201, description = "Image stored", body = ImageUploadResponse),
        (status = 400, description = "Image storage disabled, missing file or disallowed extension"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "Image too large"),
        (status = 500, description = "Internal server error")
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = current_user.id))]
pub async fn upload_image(
    State(state): State<AppState>,
    current_user: CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImageUploadResponse>)> {
    let images = image_store(&state)?;
    let max_file_size = images.max_file_size();

    while let Some(mut field) = multipart.next_field().await.map_err(|e| multipart_error(e, max_file_size))? {
        if field.name() != Some("file") {
            continue;
        }

        let key = images.object_key(field.file_name().unwrap_or_default())?;
        let content_type = field.content_type().map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, max_file_size))? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > max_file_size {
                return Err(too_large(max_file_size));
            }
        }
        if bytes.is_empty() {
            return Err(Error::BadRequest {
                message: "Image file is empty".to_string(),
            });
        }

        images.upload(&key, content_type.as_deref(), bytes).await?;
        info!(key = %key, "Uploaded image");

        return Ok((
            StatusCode::CREATED,
            Json(ImageUploadResponse {
                marker: marker(&key),
                id: key,
            }),
        ));
    }

    Err(Error::BadRequest {
        message: "Missing `file` field".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/images/url",
    tag = "images",
    summary = "Get image URL",
    description = "Returns a temporary URL for a stored image.",
    params(ImageUrlQuery),
    responses(
        (status = 200, description = "Presigned URL", body = ImageUrlResponse),
        (status = 400, description = "Image storage disabled or empty id"),
        (status = 500, description = "Internal server error")
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_image_url(State(state): State<AppState>, Query(query): Query<ImageUrlQuery>) -> Result<Json<ImageUrlResponse>> {
    let images = image_store(&state)?;

    let key = strip_marker(query.id.trim());
    if key.is_empty() {
        return Err(Error::BadRequest {
            message: "Image id cannot be empty".to_string(),
        });
    }

    let url = images.presigned_url(key).await?;
    Ok(Json(ImageUrlResponse {
        url,
        expires_in: images.url_expiry().as_secs(),
    }))
}

#[cfg(all(test, feature = "integration"))]
mod tests {
    use crate::api::models::images::ImageUrlResponse;
    use crate::config::ImageStorageConfig;
    use crate::test_utils::{create_test_app, create_test_app_with_config, create_test_config, login_as_admin};
    use axum::http::StatusCode;
    use axum_test::{
        TestServer,
        multipart::{MultipartForm, Part},
    };
    use sqlx::PgPool;

    /// Storage pointed at a local endpoint; presigning never dials it.
    async fn create_image_app(pool: PgPool) -> TestServer {
        let mut config = create_test_config();
        config.image_storage = Some(ImageStorageConfig {
            bucket: "blog-images".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            force_path_style: true,
            access_key_id: Some("minio".to_string()),
            secret_access_key: Some("minio-secret".to_string()),
            max_file_size: 16,
            ..Default::default()
        });
        create_test_app_with_config(pool, config).await
    }

    fn image_form(filename: &str, bytes: Vec<u8>) -> MultipartForm {
        MultipartForm::new().add_part("file", Part::bytes(bytes).file_name(filename).mime_type("image/png"))
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_disabled_storage_is_rejected(pool: PgPool) {
        let server = create_test_app(pool).await;
        let token = login_as_admin(&server).await;

        server
            .post("/api/v1/images")
            .authorization_bearer(&token)
            .multipart(image_form("cat.png", vec![1, 2, 3]))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .get("/api/v1/images/url")
            .add_query_param("id", "cat.png")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_upload_validation(pool: PgPool) {
        let server = create_image_app(pool).await;

        server
            .post("/api/v1/images")
            .multipart(image_form("cat.png", vec![1, 2, 3]))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let token = login_as_admin(&server).await;

        server
            .post("/api/v1/images")
            .authorization_bearer(&token)
            .multipart(image_form("cat.exe", vec![1, 2, 3]))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .post("/api/v1/images")
            .authorization_bearer(&token)
            .multipart(image_form("cat.png", vec![0; 17]))
            .await
            .assert_status(StatusCode::PAYLOAD_TOO_LARGE);

        server
            .post("/api/v1/images")
            .authorization_bearer(&token)
            .multipart(image_form("cat.png", Vec::new()))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .post("/api/v1/images")
            .authorization_bearer(&token)
            .multipart(MultipartForm::new().add_text("caption", "no file"))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_image_url_accepts_marker(pool: PgPool) {
        let server = create_image_app(pool).await;

        for id in ["cover.webp", "[s3://cover.webp]"] {
            let response = server.get("/api/v1/images/url").add_query_param("id", id).await;
            response.assert_status_ok();
            let body: ImageUrlResponse = response.json();
            assert!(body.url.starts_with("http://localhost:9000/blog-images/cover.webp?"), "{}", body.url);
            assert_eq!(body.expires_in, 3600);
        }

        server
            .get("/api/v1/images/url")
            .add_query_param("id", "  ")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test(migrations = false)]
    #[test_log::test]
    async fn test_post_reads_render_markers(pool: PgPool) {
        let server = create_image_app(pool).await;
        let token = login_as_admin(&server).await;

        let created: crate::api::models::posts::PostDetail = server
            .post("/api/v1/posts")
            .authorization_bearer(&token)
            .json(&serde_json::json!({
                "title": "Pictures",
                "slug": "pictures",
                "content": "![cat]([s3://cat.png])"
            }))
            .await
            .json();
        // Writes echo the stored form
        assert_eq!(created.content.as_deref(), Some("![cat]([s3://cat.png])"));

        for path in [format!("/api/v1/posts/{}", created.post.id), "/api/v1/posts/slug/pictures".to_string()] {
            let read: crate::api::models::posts::PostDetail = server.get(&path).await.json();
            let content = read.content.unwrap_or_default();
            assert!(content.starts_with("![cat](http://localhost:9000/blog-images/cat.png?"), "{content}");
        }
    }
}
