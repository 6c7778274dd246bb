mod common;

use axum::{extract::FromRequestParts, http::Request};
use common::{mint_token, spawn_app, spawn_app_with};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::sync::Arc;
use storyline::{
    AppConfig, AppState, MemoryRepository, MockStorageService,
    auth::{AuthSource, AuthUser, LegacyClaims},
    config::Env,
    error::AppError,
    models::{Profile, Role},
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use uuid::Uuid;

async fn resolve(state: &AppState, request: Request<()>) -> Result<AuthUser, AppError> {
    let (mut parts, _) = request.into_parts();
    AuthUser::from_request_parts(&mut parts, state).await
}

#[tokio::test]
async fn me_requires_a_token() {
    let app = spawn_app().await;
    let resp = app.client.get(app.url("/me")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "authentication required");
}

#[tokio::test]
async fn valid_token_returns_profile() {
    let app = spawn_app().await;
    let user = app.seed_user(Role::User).await;

    let resp = app
        .client
        .get(app.url("/me"))
        .bearer_auth(app.token_for(user))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let profile: Profile = resp.json().await.unwrap();
    assert_eq!(profile.id, user);
    assert_eq!(profile.role, Role::User);
}

#[tokio::test]
async fn token_without_profile_is_rejected() {
    let app = spawn_app().await;
    let resp = app
        .client
        .get(app.url("/me"))
        .bearer_auth(app.token_for(Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn expired_or_foreign_tokens_are_rejected() {
    let app = spawn_app().await;
    let user = app.seed_user(Role::Admin).await;

    let expired = mint_token(&app.config.jwt_secret, user, -3600);
    let resp = app.client.get(app.url("/me")).bearer_auth(expired).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let foreign = mint_token("some-other-project-secret", user, 3600);
    let resp = app.client.get(app.url("/me")).bearer_auth(foreign).send().await.unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn admin_routes_need_admin_role() {
    let app = spawn_app().await;

    let resp = app.client.get(app.url("/admin/stats")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let reader = app.seed_user(Role::User).await;
    let resp = app
        .client
        .get(app.url("/admin/stats"))
        .bearer_auth(app.token_for(reader))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let (_, token) = app.admin().await;
    let resp = app
        .client
        .get(app.url("/admin/stats"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn role_comes_from_profile_not_token() {
    let app = spawn_app().await;
    let user = app.seed_user(Role::User).await;
    let token = app.token_for(user);

    let resp = app
        .client
        .get(app.url("/admin/stats"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Promoted after the token was issued: the same token now opens admin routes.
    app.repo.set_role(user, Role::Admin).await.unwrap();

    let resp = app
        .client
        .get(app.url("/admin/stats"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn dev_bypass_only_in_local_env() {
    let app = spawn_app().await;
    let admin = app.seed_user(Role::Admin).await;

    let resp = app
        .client
        .get(app.url("/admin/stats"))
        .header("x-user-id", admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let prod = spawn_app_with(
        MemoryRepository::new(),
        AppConfig {
            env: Env::Production,
            ..AppConfig::default()
        },
    )
    .await;
    let admin = prod.seed_user(Role::Admin).await;
    let resp = prod
        .client
        .get(prod.url("/admin/stats"))
        .header("x-user-id", admin.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn legacy_tokens_accepted_when_configured() {
    let app = spawn_app_with(
        MemoryRepository::new(),
        AppConfig {
            legacy_jwt_secret: Some("old-app-secret".to_string()),
            ..AppConfig::default()
        },
    )
    .await;
    let user = app.seed_user(Role::User).await;

    let claims = LegacyClaims {
        user_id: user,
        role: Some("admin".to_string()),
        exp: (chrono::Utc::now().timestamp() + 600) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"old-app-secret"),
    )
    .unwrap();

    let resp = app.client.get(app.url("/me")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    // The legacy "admin" claim grants nothing; the profile says user.
    let resp = app
        .client
        .get(app.url("/admin/stats"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn register_validates_before_calling_provider() {
    let app = spawn_app().await;

    let resp = app
        .client
        .post(app.url("/auth/register"))
        .json(&serde_json::json!({ "email": "not-an-email", "password": "123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["details"].as_array().unwrap().len(), 2);

    // Valid input, but no Supabase project configured.
    let resp = app
        .client
        .post(app.url("/auth/register"))
        .json(&serde_json::json!({ "email": "new@example.com", "password": "long-enough" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn extractor_records_which_path_resolved_the_caller() {
    let repo = Arc::new(MemoryRepository::new());
    let id = Uuid::new_v4();
    repo.create_profile(id, "writer@example.com", None, Role::User)
        .await
        .unwrap();

    let local = AppState {
        repo: repo.clone() as RepositoryState,
        storage: Arc::new(MockStorageService::new()) as StorageState,
        config: AppConfig {
            legacy_jwt_secret: Some("old-app-secret".to_string()),
            ..AppConfig::default()
        },
    };

    let bypass = Request::builder()
        .header("x-user-id", id.to_string())
        .body(())
        .unwrap();
    let user = resolve(&local, bypass).await.unwrap();
    assert_eq!(user.source, AuthSource::DevBypass);
    assert_eq!(user.id, id);

    let bearer = Request::builder()
        .header(
            "authorization",
            format!("Bearer {}", mint_token(&local.config.jwt_secret, id, 600)),
        )
        .body(())
        .unwrap();
    assert_eq!(resolve(&local, bearer).await.unwrap().source, AuthSource::Supabase);

    let exp = (chrono::Utc::now().timestamp() + 600) as usize;
    let legacy_token = encode(
        &Header::default(),
        &LegacyClaims {
            user_id: id,
            role: None,
            exp,
        },
        &EncodingKey::from_secret(b"old-app-secret"),
    )
    .unwrap();
    let legacy = Request::builder()
        .header("authorization", format!("Bearer {legacy_token}"))
        .body(())
        .unwrap();
    assert_eq!(resolve(&local, legacy).await.unwrap().source, AuthSource::Legacy);

    let production = AppState {
        config: AppConfig {
            env: Env::Production,
            ..AppConfig::default()
        },
        ..local.clone()
    };
    let bypass = Request::builder()
        .header("x-user-id", id.to_string())
        .body(())
        .unwrap();
    assert!(matches!(
        resolve(&production, bypass).await,
        Err(AppError::Unauthorized)
    ));
}
