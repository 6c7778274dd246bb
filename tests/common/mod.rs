#![allow(dead_code)]

use jsonwebtoken::{EncodingKey, Header, encode};
use std::sync::Arc;
use storyline::{
    AppConfig, AppState, MemoryRepository, MockStorageService, create_router,
    auth::{Claims, SUPABASE_AUDIENCE},
    models::Role,
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use tokio::net::TcpListener;
use uuid::Uuid;

/// A running server backed by the in-memory repository and mock storage.
pub struct TestApp {
    pub address: String,
    pub repo: Arc<MemoryRepository>,
    pub storage: MockStorageService,
    pub config: AppConfig,
    pub client: reqwest::Client,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(MemoryRepository::new(), AppConfig::default()).await
}

pub async fn spawn_app_with(repo: MemoryRepository, config: AppConfig) -> TestApp {
    let repo = Arc::new(repo);
    let storage = MockStorageService::new();

    let state = AppState {
        repo: repo.clone() as RepositoryState,
        storage: Arc::new(storage.clone()) as StorageState,
        config: config.clone(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{port}"),
        repo,
        storage,
        config,
        client: reqwest::Client::new(),
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Seeds a profile and returns its id.
    pub async fn seed_user(&self, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        self.repo
            .create_profile(id, &format!("{id}@example.com"), None, role)
            .await
            .unwrap();
        id
    }

    /// A Supabase-style access token for `user_id`, signed with the configured secret.
    pub fn token_for(&self, user_id: Uuid) -> String {
        mint_token(&self.config.jwt_secret, user_id, 3600)
    }

    /// Signed-in admin ready to call `/admin` routes.
    pub async fn admin(&self) -> (Uuid, String) {
        let id = self.seed_user(Role::Admin).await;
        (id, self.token_for(id))
    }
}

pub fn mint_token(secret: &str, user_id: Uuid, ttl_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        exp: (now + ttl_secs) as usize,
        iat: now as usize,
        aud: Some(SUPABASE_AUDIENCE.to_string()),
        email: Some("someone@example.com".to_string()),
        role: Some("authenticated".to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn doc_with_image(text: &str, src: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "doc",
        "content": [
            { "type": "paragraph", "content": [{ "type": "text", "text": text }] },
            { "type": "image", "attrs": { "src": src, "alt": "" } }
        ]
    })
}
