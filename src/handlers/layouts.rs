use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    AppState,
    auth::AdminUser,
    error::{AppError, AppResult},
    layout::{PageLayout, StoredLayout, validate_layout},
};

/// get_layout
///
/// [Public Route] The saved card layout of a page.
#[utoipa::path(
    get,
    path = "/layouts/{page}",
    params(("page" = String, Path, description = "Page key, e.g. home")),
    responses((status = 200, description = "Layout", body = StoredLayout), (status = 404, description = "Not Found"))
)]
pub async fn get_layout(
    State(state): State<AppState>,
    Path(page): Path<String>,
) -> AppResult<Json<StoredLayout>> {
    state
        .repo
        .get_layout(&page)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("layout"))
}

/// list_layouts
///
/// [Admin Route]
#[utoipa::path(
    get,
    path = "/admin/layouts",
    responses((status = 200, description = "Layouts", body = [StoredLayout]))
)]
pub async fn list_layouts(State(state): State<AppState>) -> AppResult<Json<Vec<StoredLayout>>> {
    Ok(Json(state.repo.list_layouts().await?))
}

/// put_layout
///
/// [Admin Route] Saves a page layout. The page key comes from the URL. Every
/// validation problem is returned at once in `details`.
#[utoipa::path(
    put,
    path = "/admin/layouts/{page}",
    params(("page" = String, Path, description = "Page key")),
    request_body = PageLayout,
    responses(
        (status = 200, description = "Saved", body = StoredLayout),
        (status = 422, description = "Invalid layout")
    )
)]
pub async fn put_layout(
    AdminUser(editor): AdminUser,
    State(state): State<AppState>,
    Path(page): Path<String>,
    Json(mut layout): Json<PageLayout>,
) -> AppResult<Json<StoredLayout>> {
    layout.page = page;
    validate_layout(&layout).map_err(AppError::Validation)?;

    let stored = state.repo.put_layout(&layout, Some(editor.id)).await?;
    tracing::info!(page = %layout.page, sections = layout.sections.len(), "layout saved");
    Ok(Json(stored))
}
