use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::non_empty;
use crate::{
    AppState,
    auth::AdminUser,
    error::{AppError, AppResult, RepoError},
    images,
    models::{
        Image, ImageListing, NewImage, PresignedUrlRequest, PresignedUrlResponse,
        ReconcileReport, UpdateImageRequest,
    },
    storage,
};

/// MIME types accepted for upload.
pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/avif",
    "image/svg+xml",
];

fn check_content_type(content_type: &str) -> AppResult<()> {
    if ALLOWED_IMAGE_TYPES.contains(&content_type) {
        Ok(())
    } else {
        Err(AppError::UnsupportedMediaType(content_type.to_string()))
    }
}

fn multipart_error(err: MultipartError, limit: usize) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit }
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Multipart form accepted by [`upload_image`].
#[derive(utoipa::ToSchema)]
#[allow(dead_code)]
pub struct ImageUploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    alt_text: Option<String>,
}

/// upload_image
///
/// [Admin Route] Stores an image through the configured storage driver and
/// records it in the image library.
#[utoipa::path(
    post,
    path = "/admin/images",
    request_body(content = ImageUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Uploaded", body = Image),
        (status = 413, description = "File too large"),
        (status = 415, description = "Not an accepted image type")
    )
)]
pub async fn upload_image(
    AdminUser(uploader): AdminUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Image>)> {
    let limit = state.config.max_upload_bytes;
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut alt_text = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_ascii_lowercase)
                    .unwrap_or_default();
                check_content_type(&content_type)?;
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                file = Some((filename, content_type, bytes.to_vec()));
            }
            Some("alt_text") => {
                let text = field.text().await.map_err(|e| multipart_error(e, limit))?;
                alt_text = non_empty(Some(text));
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| AppError::BadRequest("multipart field 'file' is required".to_string()))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest("uploaded file is empty".to_string()));
    }
    if bytes.len() > limit {
        return Err(AppError::PayloadTooLarge { limit });
    }

    let size_bytes = bytes.len() as i64;
    let key = storage::image_key(&content_type, Utc::now());
    let stored = state.storage.put_object(&key, bytes, &content_type).await?;

    let inserted = state
        .repo
        .insert_image(NewImage {
            storage_key: stored.key.clone(),
            url: stored.url,
            filename,
            content_type,
            size_bytes,
            alt_text,
            uploaded_by: Some(uploader.id),
        })
        .await;

    let image = match inserted {
        Ok(image) => image,
        Err(e) => {
            // Do not leave an unrecorded blob behind.
            if let Err(cleanup) = state.storage.delete_object(&stored.key).await {
                tracing::error!(key = %stored.key, "failed to remove orphaned upload: {cleanup}");
            }
            return Err(e.into());
        }
    };

    tracing::info!(image_id = %image.id, key = %image.storage_key, size = size_bytes, "image uploaded");
    Ok((StatusCode::CREATED, Json(image)))
}

/// list_images
///
/// [Admin Route] The image library with per-image usage. `source` tells whether
/// the usage index or a content scan produced the listing.
#[utoipa::path(
    get,
    path = "/admin/images",
    responses((status = 200, description = "Image library", body = ImageListing))
)]
pub async fn list_images(State(state): State<AppState>) -> AppResult<Json<ImageListing>> {
    Ok(Json(images::list_library(state.repo.as_ref()).await?))
}

/// update_image
///
/// [Admin Route] Edits the alt text.
#[utoipa::path(
    patch,
    path = "/admin/images/{id}",
    params(("id" = Uuid, Path, description = "Image ID")),
    request_body = UpdateImageRequest,
    responses((status = 200, description = "Updated", body = Image), (status = 404, description = "Not Found"))
)]
pub async fn update_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateImageRequest>,
) -> AppResult<Json<Image>> {
    let alt_text = non_empty(payload.alt_text);
    state
        .repo
        .update_image_alt(id, alt_text.as_deref())
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("image"))
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct DeleteImageQuery {
    /// Delete even when posts still reference the image.
    #[serde(default)]
    pub force: bool,
}

/// delete_image
///
/// [Admin Route] Removes the blob and the library row. Refuses with 409 while
/// posts reference the image unless `force=true`.
#[utoipa::path(
    delete,
    path = "/admin/images/{id}",
    params(("id" = Uuid, Path, description = "Image ID"), DeleteImageQuery),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Still referenced by posts")
    )
)]
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteImageQuery>,
) -> AppResult<StatusCode> {
    let image = state
        .repo
        .get_image(id)
        .await?
        .ok_or(AppError::NotFound("image"))?;

    let used_by = images::references_to(state.repo.as_ref(), &image.url).await?;
    if !used_by.is_empty() && !query.force {
        return Err(AppError::Conflict(format!(
            "image is used by {} post(s); pass force=true to delete anyway",
            used_by.len()
        )));
    }

    state.storage.delete_object(&image.storage_key).await?;
    state.repo.delete_image(id).await?;

    tracing::info!(image_id = %id, forced = query.force, references = used_by.len(), "image deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// reconcile_images
///
/// [Admin Route] Rebuilds the image usage index from every post's content.
#[utoipa::path(
    post,
    path = "/admin/images/reconcile",
    responses(
        (status = 200, description = "Reconciliation report", body = ReconcileReport),
        (status = 409, description = "Usage index table missing")
    )
)]
pub async fn reconcile_images(State(state): State<AppState>) -> AppResult<Json<ReconcileReport>> {
    match images::reconcile_all(state.repo.as_ref()).await {
        Ok(report) => Ok(Json(report)),
        Err(RepoError::MissingTable(table)) => Err(AppError::Conflict(format!(
            "image usage index is unavailable ({table}); run the database migrations"
        ))),
        Err(e) => Err(e.into()),
    }
}

/// get_presigned_url
///
/// [Admin Route] A short-lived URL for uploading straight to the bucket,
/// bypassing this server. Only the Supabase driver supports it.
#[utoipa::path(
    post,
    path = "/admin/images/presigned",
    request_body = PresignedUrlRequest,
    responses(
        (status = 200, description = "URL", body = PresignedUrlResponse),
        (status = 400, description = "Driver cannot presign"),
        (status = 415, description = "Not an accepted image type")
    )
)]
pub async fn get_presigned_url(
    State(state): State<AppState>,
    Json(payload): Json<PresignedUrlRequest>,
) -> AppResult<Json<PresignedUrlResponse>> {
    let file_type = payload.file_type.trim().to_ascii_lowercase();
    check_content_type(&file_type)?;

    let key = storage::image_key(&file_type, Utc::now());
    let upload_url = state
        .storage
        .get_presigned_upload_url(&key, &file_type)
        .await?;

    Ok(Json(PresignedUrlResponse {
        upload_url,
        public_url: state.storage.public_url(&key),
        resource_key: key,
    }))
}
