use crate::{errors::AppError, models::image::Image, services::wallpoll_service::WallPollService};
use axum::{Json, extract::State};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct GalleryEntry {
    #[serde(flatten)]
    pub image: Image,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct GalleryResponse {
    pub success: bool,
    pub gallery: Vec<GalleryEntry>,
}

/// `GET /api/gallery`: images ranked by votes, newest first among ties.
pub async fn gallery(
    State(service): State<WallPollService>,
) -> Result<Json<GalleryResponse>, AppError> {
    let gallery = service
        .gallery()
        .await?
        .into_iter()
        .map(|image| GalleryEntry {
            url: image.url(),
            image,
        })
        .collect();
    Ok(Json(GalleryResponse {
        success: true,
        gallery,
    }))
}
