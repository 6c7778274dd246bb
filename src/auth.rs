use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::Role,
    repository::RepositoryState,
};

/// Audience Supabase stamps on access tokens of signed-in users.
pub const SUPABASE_AUDIENCE: &str = "authenticated";

/// Claims
///
/// Payload of a Supabase access token. Only `sub` is trusted for identity;
/// the `role` claim is Supabase's Postgres role, not the application role.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The `auth.users.id` of the caller, equal to `profiles.id`.
    pub sub: Uuid,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
    #[serde(default)]
    pub aud: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// LegacyClaims
///
/// Tokens issued by the in-house login that predates Supabase Auth.
#[derive(Debug, Serialize, Deserialize)]
pub struct LegacyClaims {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

/// Which path resolved the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    Supabase,
    Legacy,
    DevBypass,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. `role` always comes
/// from the profile row, never from the token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub source: AuthSource,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// AdminUser
///
/// An [`AuthUser`] whose profile carries the `admin` role. Rejects with 403 otherwise.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// decode_token
///
/// Tries the Supabase path first and the legacy path second. Returns the user
/// id and the path that accepted the token.
pub fn decode_token(token: &str, config: &AppConfig) -> Option<(Uuid, AuthSource)> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[SUPABASE_AUDIENCE]);

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => return Some((data.claims.sub, AuthSource::Supabase)),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => {
                tracing::debug!("rejected expired access token");
                return None;
            }
            kind => tracing::debug!(?kind, "supabase token rejected, trying legacy path"),
        },
    }

    let legacy_secret = config.legacy_jwt_secret.as_deref()?;
    let mut legacy_validation = Validation::new(Algorithm::HS256);
    legacy_validation.validate_aud = false;

    match decode::<LegacyClaims>(
        token,
        &DecodingKey::from_secret(legacy_secret.as_bytes()),
        &legacy_validation,
    ) {
        Ok(data) => Some((data.claims.user_id, AuthSource::Legacy)),
        Err(e) => {
            tracing::debug!(kind = ?e.kind(), "legacy token rejected");
            None
        }
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Dependency Resolution: repository and config from the application state.
/// 2. Local Bypass: in the local env an `x-user-id` header naming an existing profile is accepted.
/// 3. Token Validation: a Bearer token is required and decoded by [`decode_token`].
/// 4. DB Lookup: the profile is loaded; a valid token for a deleted profile is rejected.
///
/// The resolved user is cached in the request extensions so the route-layer
/// middleware and the handler share one lookup.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already resolved by the route-layer middleware.
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        // 1. Dependency Resolution
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // 2. Local Development Bypass Check
        if config.env == Env::Local {
            let bypass_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| Uuid::parse_str(value).ok());

            if let Some(user_id) = bypass_id {
                if let Some(profile) = repo.get_profile(user_id).await? {
                    let user = AuthUser {
                        id: profile.id,
                        email: profile.email,
                        role: profile.role,
                        source: AuthSource::DevBypass,
                    };
                    tracing::debug!(user_id = %user.id, source = ?user.source, "request authenticated");
                    parts.extensions.insert(user.clone());
                    return Ok(user);
                }
            }
        }

        // 3. Token Extraction and Decoding
        let token = bearer_token(parts).ok_or(AppError::Unauthorized)?;
        let (user_id, source) = decode_token(token, &config).ok_or(AppError::Unauthorized)?;

        // 4. Database Lookup (the profile's role is authoritative)
        let profile = repo.get_profile(user_id).await?.ok_or_else(|| {
            tracing::warn!(%user_id, "valid token without a profile");
            AppError::Unauthorized
        })?;

        let user = AuthUser {
            id: profile.id,
            email: profile.email,
            role: profile.role,
            source,
        };
        tracing::debug!(user_id = %user.id, source = ?user.source, "request authenticated");
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            tracing::warn!(user_id = %user.id, "non-admin hit an admin route");
            return Err(AppError::Forbidden("admin role required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// require_auth
///
/// Route-layer middleware: the request only reaches the handler when `AuthUser` resolves.
pub async fn require_auth(_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// require_admin
///
/// Route-layer middleware for everything nested under `/admin`.
pub async fn require_admin(_admin: AdminUser, request: Request, next: Next) -> Response {
    next.run(request).await
}
