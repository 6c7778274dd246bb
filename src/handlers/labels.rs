use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::non_empty;
use crate::{
    AppState,
    error::{AppError, AppResult},
    layout::is_hex_color,
    models::{CreateLabelRequest, Label, UpdateLabelRequest},
    slug,
};

fn check_label(name: &str, label_slug: &str, color: Option<&str>) -> AppResult<()> {
    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push("name is required".to_string());
    }
    if let Err(e) = slug::validate_slug(label_slug) {
        errors.push(format!("slug: {e}"));
    }
    if let Some(color) = color {
        if !is_hex_color(color) {
            errors.push(format!("color '{color}' is not a hex color"));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// list_labels
///
/// [Public Route] Every label with its number of published posts.
#[utoipa::path(
    get,
    path = "/labels",
    responses((status = 200, description = "Labels", body = [Label]))
)]
pub async fn list_labels(State(state): State<AppState>) -> AppResult<Json<Vec<Label>>> {
    Ok(Json(state.repo.list_labels().await?))
}

/// create_label
///
/// [Admin Route] The slug defaults to the slugified name. Duplicate slugs are a 409.
#[utoipa::path(
    post,
    path = "/admin/labels",
    request_body = CreateLabelRequest,
    responses(
        (status = 201, description = "Created", body = Label),
        (status = 409, description = "Slug taken"),
        (status = 422, description = "Invalid name, slug or color")
    )
)]
pub async fn create_label(
    State(state): State<AppState>,
    Json(payload): Json<CreateLabelRequest>,
) -> AppResult<(StatusCode, Json<Label>)> {
    let name = payload.name.trim().to_string();
    let label_slug = non_empty(payload.slug).unwrap_or_else(|| slug::slugify(&name));
    let color = non_empty(payload.color);
    check_label(&name, &label_slug, color.as_deref())?;

    let label = state
        .repo
        .insert_label(&name, &label_slug, color.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(label)))
}

/// update_label
///
/// [Admin Route] Partial update; an empty `color` clears it.
#[utoipa::path(
    put,
    path = "/admin/labels/{id}",
    params(("id" = Uuid, Path, description = "Label ID")),
    request_body = UpdateLabelRequest,
    responses(
        (status = 200, description = "Updated", body = Label),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Slug taken")
    )
)]
pub async fn update_label(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLabelRequest>,
) -> AppResult<Json<Label>> {
    let existing = state
        .repo
        .get_label(id)
        .await?
        .ok_or(AppError::NotFound("label"))?;

    let name = payload
        .name
        .map(|n| n.trim().to_string())
        .unwrap_or(existing.name);
    let label_slug = non_empty(payload.slug).unwrap_or(existing.slug);
    let color = match payload.color {
        Some(color) => non_empty(Some(color)),
        None => existing.color,
    };
    check_label(&name, &label_slug, color.as_deref())?;

    state
        .repo
        .update_label(id, &name, &label_slug, color.as_deref())
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("label"))
}

/// delete_label
///
/// [Admin Route] Detaches the label from every post and removes it.
#[utoipa::path(
    delete,
    path = "/admin/labels/{id}",
    params(("id" = Uuid, Path, description = "Label ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_label(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    if state.repo.delete_label(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("label"))
    }
}
