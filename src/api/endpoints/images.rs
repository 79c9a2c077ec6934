//! Image hosting for avatars, reward and platform pictures.
//!
//! - `GET /api/images/:name`: public download
//! - `POST /api/admin/images`: admin upload (multipart field `file`)

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::images;

#[derive(Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub image_url: String,
}

/// `GET /api/images/:name`
pub async fn download(
    State(ctx): State<ApiContext>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let path = images::resolve_image(&ctx.core.config.images.dir, &name)?
        .ok_or_else(|| ApiError::NotFound("Image not found!".into()))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(format!("read image {name}: {e}")))?;
    Ok(([(header::CONTENT_TYPE, images::content_type(&path))], bytes).into_response())
}

/// `POST /api/admin/images`
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read file data: {e}")))?;
            file = Some(bytes.to_vec());
        }
    }
    let bytes = file.ok_or_else(|| ApiError::BadRequest("No file provided.".into()))?;

    let config = &ctx.core.config;
    let filename = images::store_image(&config.images.dir, &bytes, config.images.max_bytes).await?;
    tracing::info!(user_id = auth.user.id, %filename, "Image uploaded");

    Ok(Json(UploadResponse {
        image_url: images::image_url(&config.server.public_url, &filename),
        filename,
    }))
}
