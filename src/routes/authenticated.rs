use crate::{AppState, handlers::account};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes for any signed-in user, whatever their role. Authoring lives under
/// `/admin`; readers only need their own profile.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET /me
        // The caller's profile, including the role the dashboard keys off.
        .route("/me", get(account::get_me))
}
