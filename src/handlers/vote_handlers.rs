use crate::{
    errors::AppError, handlers::auth_handlers::RawUserId,
    services::wallpoll_service::WallPollService,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub user_id: Option<RawUserId>,
    pub image_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub success: bool,
    pub message: &'static str,
    pub image_id: String,
    pub vote_count: u64,
    pub votes_remaining: u32,
}

/// `POST /api/vote`
pub async fn vote(
    State(service): State<WallPollService>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<VoteResponse>, AppError> {
    let Json(req) = payload?;
    let (Some(raw_user), Some(image_id)) = (req.user_id, req.image_id) else {
        return Err(AppError::validation(
            "Invalid userId or imageId in request body.",
        ));
    };
    let image_id = image_id.trim();
    if image_id.is_empty() {
        return Err(AppError::validation(
            "Invalid userId or imageId in request body.",
        ));
    }
    let user_id = raw_user.validate()?;

    let outcome = service.vote(user_id, image_id).await?;
    Ok(Json(VoteResponse {
        success: true,
        message: "Vote successful!",
        image_id: outcome.image_id,
        vote_count: outcome.vote_count,
        votes_remaining: outcome.votes_remaining,
    }))
}
