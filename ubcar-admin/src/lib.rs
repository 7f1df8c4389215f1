//! ubcar-admin library - media administration service
//!
//! Session-authenticated HTTP surface over the `ubcar-common` data layer:
//! paged media listing, edit, delete and multipart create, with every
//! mutation keeping the point/layer reverse indexes in step.

use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use ubcar_common::db::settings::RuntimeSettings;

pub mod api;
pub mod pagination;
pub mod uploads;
pub mod views;

/// Extra room for the text fields that accompany an upload
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Snapshot of the `settings` table taken at startup
    pub settings: RuntimeSettings,
    /// Secret mixed into every nonce
    pub nonce_secret: i64,
    /// Where uploads and thumbnails are written and served from
    pub uploads_dir: PathBuf,
    /// Absolute base URL the redirect page may send users to
    pub public_base_url: Option<String>,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: RuntimeSettings, nonce_secret: i64, uploads_dir: PathBuf) -> Self {
        Self {
            db,
            settings,
            nonce_secret,
            uploads_dir,
            public_base_url: None,
        }
    }

    pub fn with_public_base_url(mut self, public_base_url: Option<String>) -> Self {
        self.public_base_url = public_base_url.filter(|url| !url.is_empty());
        self
    }
}

/// Build application router
///
/// Everything under `/api/media`, `/api/nonce`, `/api/logout` and `POST /media`
/// requires a session. Login, static assets, uploads, the redirect page and
/// health endpoints are public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let upload_limit = state.settings.upload_max_bytes + MULTIPART_OVERHEAD_BYTES;

    let protected = Router::new()
        .route("/api/logout", post(api::logout))
        .route("/api/nonce", get(api::issue_nonce))
        .route("/api/media/initial", post(api::media_initial))
        .route("/api/media/forward", post(api::media_forward))
        .route("/api/media/backward", post(api::media_backward))
        .route("/api/media/delete", post(api::media_delete))
        .route("/api/media/edit", post(api::media_edit))
        .route("/api/media/edit-submit", post(api::media_edit_submit))
        .route(
            "/media",
            post(api::create_medium).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::session_middleware,
        ));

    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .route("/redirect", get(api::redirect_page))
        .route("/api/login", post(api::login))
        .route("/api/buildinfo", get(api::get_build_info))
        .nest_service("/uploads", ServeDir::new(&state.uploads_dir))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
