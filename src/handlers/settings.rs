use axum::{
    Json,
    extract::{Path, State},
};
use serde_json::{Value, json};

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::{CompressionSettings, Setting},
    repository::Repository,
    slug,
};

/// Key of the public site settings (title, tagline, social links).
pub const SITE_KEY: &str = "site";
/// Key of the image compression policy.
pub const COMPRESSION_KEY: &str = "compression";

/// The stored policy, or the defaults when unset or unreadable.
pub async fn load_compression(repo: &dyn Repository) -> AppResult<CompressionSettings> {
    let Some(setting) = repo.get_setting(COMPRESSION_KEY).await? else {
        return Ok(CompressionSettings::default());
    };
    match serde_json::from_value(setting.value) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::warn!("stored compression settings unreadable, using defaults: {e}");
            Ok(CompressionSettings::default())
        }
    }
}

async fn save_compression(
    repo: &dyn Repository,
    settings: &CompressionSettings,
) -> AppResult<Setting> {
    let errors = settings.validate();
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    let value = serde_json::to_value(settings).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(repo.put_setting(COMPRESSION_KEY, value).await?)
}

/// get_site_settings
///
/// [Public Route] Site-wide display settings; `{}` until an admin saves them.
#[utoipa::path(
    get,
    path = "/settings/site",
    responses((status = 200, description = "Site settings", body = serde_json::Value))
)]
pub async fn get_site_settings(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let value = state
        .repo
        .get_setting(SITE_KEY)
        .await?
        .map(|s| s.value)
        .unwrap_or_else(|| json!({}));
    Ok(Json(value))
}

/// list_settings
///
/// [Admin Route]
#[utoipa::path(
    get,
    path = "/admin/settings",
    responses((status = 200, description = "All settings", body = [Setting]))
)]
pub async fn list_settings(State(state): State<AppState>) -> AppResult<Json<Vec<Setting>>> {
    let mut settings = state.repo.list_settings().await?;
    settings.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(Json(settings))
}

/// put_setting
///
/// [Admin Route] Stores any JSON value under a slug-shaped key. The
/// compression key is validated like `PUT /admin/compression`.
#[utoipa::path(
    put,
    path = "/admin/settings/{key}",
    params(("key" = String, Path, description = "Setting key")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Saved", body = Setting),
        (status = 422, description = "Invalid key or value")
    )
)]
pub async fn put_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> AppResult<Json<Setting>> {
    if !is_setting_key(&key) {
        return Err(AppError::validation(format!(
            "key '{key}' must be lowercase letters, digits and hyphens"
        )));
    }

    let repo = state.repo.as_ref();
    if key == COMPRESSION_KEY {
        let settings: CompressionSettings = serde_json::from_value(value)
            .map_err(|e| AppError::validation(format!("compression: {e}")))?;
        return Ok(Json(save_compression(repo, &settings).await?));
    }

    Ok(Json(repo.put_setting(&key, value).await?))
}

/// Setting keys are not URL slugs, so reserved words are allowed.
fn is_setting_key(key: &str) -> bool {
    match slug::validate_slug(key) {
        Ok(()) | Err(slug::SlugError::Reserved(_)) => true,
        Err(_) => false,
    }
}

/// get_compression
///
/// [Admin Route] The compression policy applied by the editor before upload.
#[utoipa::path(
    get,
    path = "/admin/compression",
    responses((status = 200, description = "Policy", body = CompressionSettings))
)]
pub async fn get_compression(State(state): State<AppState>) -> AppResult<Json<CompressionSettings>> {
    Ok(Json(load_compression(state.repo.as_ref()).await?))
}

/// put_compression
///
/// [Admin Route]
#[utoipa::path(
    put,
    path = "/admin/compression",
    request_body = CompressionSettings,
    responses(
        (status = 200, description = "Saved", body = CompressionSettings),
        (status = 422, description = "Out of range")
    )
)]
pub async fn put_compression(
    State(state): State<AppState>,
    Json(settings): Json<CompressionSettings>,
) -> AppResult<Json<CompressionSettings>> {
    save_compression(state.repo.as_ref(), &settings).await?;
    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_keys() {
        assert!(is_setting_key("site"));
        assert!(is_setting_key("settings"));
        assert!(!is_setting_key("Site Title"));
        assert!(!is_setting_key(""));
    }
}
