use crate::{
    AppState,
    handlers::{account, labels, layouts, posts, settings},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints any client may call. Post handlers only ever return published
/// posts from here.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/register
        // Signup through Supabase Auth plus the mirrored profile row.
        .route("/auth/register", post(account::register_user))
        // GET /posts?label=&q=&limit=&offset=
        .route("/posts", get(posts::list_published_posts))
        .route("/posts/{slug}", get(posts::get_published_post))
        .route("/labels", get(labels::list_labels))
        // GET /layouts/{page}
        // The card layout the builder saved for a page.
        .route("/layouts/{page}", get(layouts::get_layout))
        .route("/settings/site", get(settings::get_site_settings))
}
