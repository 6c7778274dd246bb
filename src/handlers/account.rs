use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use super::non_empty;
use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::{Profile, RegisterUserRequest, Role},
};

/// Supabase's own minimum password length.
const MIN_PASSWORD_LEN: usize = 6;

/// SignupResponse
///
/// Supabase answers `/auth/v1/signup` with the bare user while email
/// confirmation is pending and with a session wrapping it otherwise.
#[derive(Deserialize)]
struct SignupResponse {
    id: Option<Uuid>,
    user: Option<SignupUser>,
}

#[derive(Deserialize)]
struct SignupUser {
    id: Uuid,
}

impl SignupResponse {
    fn user_id(&self) -> Option<Uuid> {
        self.id.or_else(|| self.user.as_ref().map(|u| u.id))
    }
}

/// register_user
///
/// [Public Route] Creates the account in Supabase Auth, then the mirrored
/// profile with role `user`. The role is never taken from the client.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = Profile),
        (status = 400, description = "Rejected by the auth provider"),
        (status = 422, description = "Invalid email or password"),
        (status = 502, description = "Auth provider unreachable")
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<Profile>)> {
    let email = payload.email.trim().to_lowercase();
    let mut errors = Vec::new();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.push("email is not valid".to_string());
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(format!("password must be at least {MIN_PASSWORD_LEN} characters"));
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let (Some(supabase_url), Some(supabase_key)) =
        (state.config.supabase_url.as_deref(), state.config.supabase_key.as_deref())
    else {
        return Err(AppError::Upstream("auth provider is not configured".to_string()));
    };

    let response = reqwest::Client::new()
        .post(format!("{supabase_url}/auth/v1/signup"))
        .header("apikey", supabase_key)
        .json(&serde_json::json!({ "email": email, "password": payload.password }))
        .send()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        tracing::warn!(%status, "signup rejected by auth provider");
        return Err(AppError::BadRequest("registration was rejected".to_string()));
    }

    let user_id = response
        .json::<SignupResponse>()
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?
        .user_id()
        .ok_or_else(|| AppError::Upstream("signup response carried no user id".to_string()))?;

    let display_name = non_empty(payload.display_name);
    let profile = state
        .repo
        .create_profile(user_id, &email, display_name.as_deref(), Role::User)
        .await?;

    tracing::info!(user_id = %profile.id, "user registered");
    Ok((StatusCode::CREATED, Json(profile)))
}

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = Profile), (status = 401, description = "Not signed in"))
)]
pub async fn get_me(user: AuthUser, State(state): State<AppState>) -> AppResult<Json<Profile>> {
    state
        .repo
        .get_profile(user.id)
        .await?
        .map(Json)
        .ok_or(AppError::Unauthorized)
}
