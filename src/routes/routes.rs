//! Defines routes for the WallPoll API.
//!
//! ## Structure
//! - **API endpoints**
//!   - `POST /api/login`: validate a user ID, create the user on first login
//!   - `GET  /api/users/{id}`: user status (upload, votes left)
//!   - `POST /api/upload`: multipart wallpaper upload, one per user
//!   - `POST /api/vote`: cast a vote
//!   - `GET  /api/gallery`: images ranked by votes
//!
//! - **Image payloads**
//!   - `GET /images/{*key}`: stored bytes with their content type
//!
//! - **Probes**: `GET /healthz`, `GET /readyz`
//!
//! Every other request falls through to the static asset directory when one
//! is configured. Anything left unmatched gets the JSON 404.

use crate::{
    errors::AppError,
    handlers::{
        auth_handlers::{login, user_status},
        gallery_handlers::gallery,
        health_handlers::{healthz, readyz},
        image_handlers::get_image,
        upload_handlers::upload,
        vote_handlers::vote,
    },
    services::wallpoll_service::WallPollService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    handler::HandlerWithoutStateExt,
    routing::{get, post},
};
use std::path::PathBuf;
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Knobs the router needs from configuration.
#[derive(Clone, Debug)]
pub struct RouteOptions {
    /// Directory of frontend assets, served for unmatched `GET`s.
    pub static_dir: Option<PathBuf>,
    /// Upper bound on an upload request body.
    pub max_upload_bytes: usize,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            static_dir: None,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

async fn not_found() -> AppError {
    AppError::not_found("Not Found")
}

/// Build the router. The router carries `WallPollService` as shared state.
pub fn routes(options: &RouteOptions) -> Router<WallPollService> {
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/login", post(login))
        .route("/api/users/{id}", get(user_status))
        .route(
            "/api/upload",
            post(upload).layer(DefaultBodyLimit::max(options.max_upload_bytes)),
        )
        .route("/api/vote", post(vote))
        .route("/api/gallery", get(gallery))
        .route("/images/{*key}", get(get_image));

    let router = match &options.static_dir {
        Some(dir) if dir.is_dir() => {
            tracing::info!("Serving static assets from {}", dir.display());
            let assets = ServeDir::new(dir)
                .call_fallback_on_method_not_allowed(true)
                .fallback(not_found.into_service());
            router.fallback_service(assets)
        }
        Some(dir) => {
            tracing::warn!("Static directory {} not found, assets disabled", dir.display());
            router.fallback(not_found)
        }
        None => router.fallback(not_found),
    };

    router.layer(TraceLayer::new_for_http())
}
