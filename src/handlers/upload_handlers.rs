//! Multipart image upload.
//!
//! Expected fields: `userId` (text) and `image` (file). The payload is
//! buffered up to the router's body limit before admission runs, so field
//! order does not matter.

use crate::{
    errors::AppError,
    handlers::auth_handlers::RawUserId,
    services::wallpoll_service::WallPollService,
};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
};
use bytes::Bytes;
use serde::Serialize;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: &'static str,
    pub image_id: String,
    pub storage_key: String,
    pub url: String,
}

struct ImagePart {
    file_name: String,
    content_type: String,
    data: Bytes,
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::new(err.status(), "VALIDATION", err.body_text())
}

/// `POST /api/upload`
pub async fn upload(
    State(service): State<WallPollService>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let mut multipart = multipart.map_err(|_| {
        AppError::validation("Invalid Content-Type. Expected multipart/form-data.")
    })?;

    let mut user_field = None;
    let mut image_part = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("userId") => {
                user_field = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("image") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                image_part = Some(ImagePart {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => tracing::debug!(field = ?other, "ignoring unexpected multipart field"),
        }
    }

    let (Some(raw_user), Some(part)) = (user_field, image_part) else {
        return Err(AppError::validation(
            "Missing userId or image file in form data.",
        ));
    };
    let user_id = RawUserId::Text(raw_user).validate()?;

    let image = service
        .upload(user_id, &part.file_name, &part.content_type, part.data)
        .await?;

    Ok(Json(UploadResponse {
        success: true,
        message: "Upload successful!",
        url: image.url(),
        image_id: image.id,
        storage_key: image.storage_key,
    }))
}
