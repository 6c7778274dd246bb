use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod content;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod images;
pub mod layout;
pub mod models;
pub mod repository;
pub mod slug;
pub mod storage;

// Routing split by audience (public, authenticated, admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{LocalStorage, MockStorageService, S3StorageClient, StorageState};

/// Extra room on top of the upload limit for multipart framing and the other form fields.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers and
/// `ToSchema` models, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::account::register_user, handlers::account::get_me,
        handlers::posts::list_published_posts, handlers::posts::get_published_post,
        handlers::posts::list_posts, handlers::posts::get_post, handlers::posts::create_post,
        handlers::posts::update_post, handlers::posts::set_post_status,
        handlers::posts::set_post_labels, handlers::posts::delete_post,
        handlers::posts::check_slug,
        handlers::images::upload_image, handlers::images::list_images,
        handlers::images::update_image, handlers::images::delete_image,
        handlers::images::reconcile_images, handlers::images::get_presigned_url,
        handlers::labels::list_labels, handlers::labels::create_label,
        handlers::labels::update_label, handlers::labels::delete_label,
        handlers::layouts::get_layout, handlers::layouts::list_layouts,
        handlers::layouts::put_layout,
        handlers::settings::get_site_settings, handlers::settings::list_settings,
        handlers::settings::put_setting, handlers::settings::get_compression,
        handlers::settings::put_compression,
        handlers::admin::get_admin_stats, handlers::admin::list_users,
        handlers::admin::update_user_role, handlers::admin::get_storage_status,
    ),
    components(
        schemas(
            models::Profile, models::Role, models::Post, models::PostStatus, models::PostSummary,
            models::Label, models::Image, models::ImageSummary, models::ImageListing,
            models::ListingSource, models::PostRef, models::ReconcileReport, models::Setting,
            models::CompressionSettings, models::OutputFormat, models::CreatePostRequest,
            models::UpdatePostRequest, models::StatusRequest, models::SetLabelsRequest,
            models::CreateLabelRequest, models::UpdateLabelRequest, models::UpdateImageRequest,
            models::RegisterUserRequest, models::RoleUpdateRequest, models::PresignedUrlRequest,
            models::PresignedUrlResponse, models::SlugCheckResponse, models::AdminStats,
            models::StorageStatus, handlers::images::ImageUploadForm,
            layout::PageLayout, layout::LayoutSection, layout::LayoutCard, layout::CardKind,
            layout::CardStyle, layout::CardVariant, layout::StoredLayout,
        )
    ),
    tags(
        (name = "storyline", description = "Storytelling platform API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Persistence, Postgres in production and in-memory in tests.
    pub repo: RepositoryState,
    /// Image blob storage driver.
    pub storage: StorageState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the route groups, their access layers and the observability stack.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS and Upload Limits
    let cors = cors::cors_layer(&state.config.cors_origins);
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let mut base_router = Router::new()
        // Documentation: Swagger UI plus the generated OpenAPI JSON.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        // Any signed-in profile.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_auth,
            )),
        )
        // Admin profiles only.
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::require_admin,
            )),
        );

    // 3. Local Uploads: files written by the local driver are served by this process.
    if let config::StorageConfig::Local { root, .. } = &state.config.storage {
        base_router = base_router.nest_service("/uploads", ServeDir::new(root));
    }

    // 4. Body Limit, State, then Observability (outermost) and CORS
    base_router
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation back to the client
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, carrying the `x-request-id` so every log line of the
/// request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
