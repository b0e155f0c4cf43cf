//! Login and user status.

use crate::{
    errors::AppError,
    models::user::{User, UserId},
    services::{eligibility::votes_remaining, wallpoll_service::WallPollService},
};
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user ID as clients send it: the login form posts a string, the
/// gallery script posts a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawUserId {
    Number(i64),
    Text(String),
}

impl RawUserId {
    pub fn validate(&self) -> Result<UserId, AppError> {
        let parsed = match self {
            RawUserId::Number(n) => UserId::new(*n),
            RawUserId::Text(s) => UserId::parse(s),
        };
        parsed.map_err(|err| AppError::validation(format!("Invalid User ID: {}", err)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_id: Option<RawUserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub success: bool,
    pub user_id: UserId,
    pub uploaded_image_id: Option<String>,
    pub votes_cast: BTreeMap<String, u32>,
    pub votes_remaining: u32,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            success: true,
            votes_remaining: votes_remaining(&user),
            user_id: user.id,
            uploaded_image_id: user.uploaded_image_id,
            votes_cast: user.votes_cast,
        }
    }
}

/// `POST /api/login`
pub async fn login(
    State(service): State<WallPollService>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AppError> {
    let Json(req) = payload?;
    let user_id = req
        .user_id
        .as_ref()
        .ok_or_else(|| AppError::validation("Invalid User ID: missing userId"))?
        .validate()?;

    let user = service.login(user_id).await?;
    tracing::debug!(user_id = %user_id, "login");
    Ok(Json(user.into()))
}

/// `GET /api/users/{id}`
pub async fn user_status(
    State(service): State<WallPollService>,
    Path(raw_id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user_id = RawUserId::Text(raw_id).validate()?;
    let user = service.user_status(user_id).await?;
    Ok(Json(user.into()))
}
