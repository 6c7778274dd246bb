use crate::{
    AppState,
    handlers::{admin, images, labels, layouts, posts, settings},
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Authoring and moderation. `create_router` nests this under `/admin` and
/// wraps it in `require_admin`, so every handler here runs for admins only.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Dashboard ---
        .route("/stats", get(admin::get_admin_stats))
        .route("/users", get(admin::list_users))
        // PUT /admin/users/{id}/role
        // Admins cannot demote themselves (409).
        .route("/users/{id}/role", put(admin::update_user_role))
        .route("/storage", get(admin::get_storage_status))
        // --- Posts ---
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/posts/{id}/status", put(posts::set_post_status))
        .route("/posts/{id}/labels", put(posts::set_post_labels))
        // GET /admin/slugs/check?slug=&exclude=
        // Live slug feedback for the editor.
        .route("/slugs/check", get(posts::check_slug))
        // --- Images ---
        .route("/images", get(images::list_images).post(images::upload_image))
        // POST /admin/images/reconcile
        // Rebuilds the post_images usage index from post content.
        .route("/images/reconcile", post(images::reconcile_images))
        .route("/images/presigned", post(images::get_presigned_url))
        .route(
            "/images/{id}",
            axum::routing::patch(images::update_image).delete(images::delete_image),
        )
        // --- Labels ---
        .route("/labels", post(labels::create_label))
        .route(
            "/labels/{id}",
            put(labels::update_label).delete(labels::delete_label),
        )
        // --- Layouts & settings ---
        .route("/layouts", get(layouts::list_layouts))
        .route("/layouts/{page}", put(layouts::put_layout))
        .route("/settings", get(settings::list_settings))
        .route("/settings/{key}", put(settings::put_setting))
        .route(
            "/compression",
            get(settings::get_compression).put(settings::put_compression),
        )
}
