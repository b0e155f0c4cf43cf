//! axum handlers. Each one validates its request once, calls
//! `WallPollService`, and lets `AppError` map failures to status codes.

pub mod auth_handlers;
pub mod gallery_handlers;
pub mod health_handlers;
pub mod image_handlers;
pub mod upload_handlers;
pub mod vote_handlers;
