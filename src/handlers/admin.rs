use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AdminUser,
    error::{AppError, AppResult},
    images,
    models::{AdminStats, Profile, Role, RoleUpdateRequest, StorageStatus},
};

/// get_admin_stats
///
/// [Admin Route] Dashboard counters.
#[utoipa::path(
    get,
    path = "/admin/stats",
    responses((status = 200, description = "Stats", body = AdminStats))
)]
pub async fn get_admin_stats(State(state): State<AppState>) -> AppResult<Json<AdminStats>> {
    let repo = state.repo.as_ref();
    let mut stats = repo.stats().await?;
    stats.unreferenced_images = images::unreferenced_count(repo).await?;
    Ok(Json(stats))
}

/// list_users
///
/// [Admin Route]
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "Profiles", body = [Profile]))
)]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<Profile>>> {
    Ok(Json(state.repo.list_profiles().await?))
}

/// update_user_role
///
/// [Admin Route] Grants or revokes the admin role. An admin cannot demote
/// themself, which keeps at least one admin able to undo mistakes.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "Profile ID")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Updated", body = Profile),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Self-demotion")
    )
)]
pub async fn update_user_role(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleUpdateRequest>,
) -> AppResult<Json<Profile>> {
    if id == admin.id && payload.role != Role::Admin {
        return Err(AppError::Conflict("admins cannot demote themselves".to_string()));
    }

    let profile = state
        .repo
        .set_role(id, payload.role)
        .await?
        .ok_or(AppError::NotFound("profile"))?;

    tracing::info!(target_user = %id, role = %payload.role, by = %admin.id, "role changed");
    Ok(Json(profile))
}

/// get_storage_status
///
/// [Admin Route] Which storage driver is active and where it writes.
#[utoipa::path(
    get,
    path = "/admin/storage",
    responses((status = 200, description = "Driver", body = StorageStatus))
)]
pub async fn get_storage_status(State(state): State<AppState>) -> Json<StorageStatus> {
    Json(StorageStatus {
        driver: state.storage.driver_name().to_string(),
        location: state.storage.location(),
    })
}
