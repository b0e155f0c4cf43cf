//! A voter, identified by an externally assigned numeric ID.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

/// Smallest accepted user ID.
pub const MIN_USER_ID: i64 = 1;
/// Largest accepted user ID.
pub const MAX_USER_ID: i64 = 59;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserIdError {
    #[error("user id {0} is outside 1..=59")]
    OutOfRange(i64),
    #[error("user id `{0}` is not a number")]
    NotANumber(String),
}

/// Validated user ID in `1..=59`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "i64", into = "i64")]
pub struct UserId(u8);

impl UserId {
    pub fn new(raw: i64) -> Result<Self, UserIdError> {
        if (MIN_USER_ID..=MAX_USER_ID).contains(&raw) {
            Ok(Self(raw as u8))
        } else {
            Err(UserIdError::OutOfRange(raw))
        }
    }

    /// Parse a decimal ID as typed into the login form.
    pub fn parse(raw: &str) -> Result<Self, UserIdError> {
        let trimmed = raw.trim();
        let value = trimmed
            .parse::<i64>()
            .map_err(|_| UserIdError::NotANumber(trimmed.to_string()))?;
        Self::new(value)
    }

    pub fn get(self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i64> for UserId {
    type Error = UserIdError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.get()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user record as stored under `user:{id}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Externally assigned ID.
    #[serde(rename = "userId")]
    pub id: UserId,

    /// The single image this user uploaded, if any. Never changes once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_image_id: Option<String>,

    /// Image ID -> votes this user gave that image.
    #[serde(default)]
    pub votes_cast: BTreeMap<String, u32>,
}

impl User {
    /// A user that has never uploaded or voted.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            uploaded_image_id: None,
            votes_cast: BTreeMap::new(),
        }
    }

    /// Total votes spent across all images.
    pub fn total_votes(&self) -> u32 {
        self.votes_cast
            .values()
            .fold(0u32, |sum, count| sum.saturating_add(*count))
    }

    /// Votes already given to `image_id`.
    pub fn votes_for(&self, image_id: &str) -> u32 {
        self.votes_cast.get(image_id).copied().unwrap_or(0)
    }

    pub fn record_key(&self) -> String {
        user_key(self.id)
    }
}

/// Key-value key of a user record.
pub fn user_key(id: UserId) -> String {
    format!("user:{}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_bounds() {
        assert!(UserId::new(1).is_ok());
        assert!(UserId::new(59).is_ok());
        assert_eq!(UserId::new(0), Err(UserIdError::OutOfRange(0)));
        assert_eq!(UserId::new(60), Err(UserIdError::OutOfRange(60)));
        assert_eq!(UserId::new(-3), Err(UserIdError::OutOfRange(-3)));
    }

    #[test]
    fn user_id_parse_accepts_padded_digits() {
        assert_eq!(UserId::parse(" 42 ").unwrap().get(), 42);
        assert!(matches!(
            UserId::parse("abc"),
            Err(UserIdError::NotANumber(_))
        ));
        assert!(matches!(
            UserId::parse("99"),
            Err(UserIdError::OutOfRange(99))
        ));
    }

    #[test]
    fn user_document_shape() {
        let mut user = User::new(UserId::new(7).unwrap());
        user.votes_cast.insert("img-2-1".into(), 1);
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "userId": 7, "votesCast": { "img-2-1": 1 } })
        );

        let parsed: User = serde_json::from_str(r#"{"userId":3,"uploadedImageId":"img-3-9"}"#)
            .unwrap();
        assert_eq!(parsed.uploaded_image_id.as_deref(), Some("img-3-9"));
        assert!(parsed.votes_cast.is_empty());
    }

    #[test]
    fn out_of_range_document_is_rejected() {
        let parsed = serde_json::from_str::<User>(r#"{"userId":77,"votesCast":{}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn total_votes_sums_counts() {
        let mut user = User::new(UserId::new(2).unwrap());
        user.votes_cast.insert("a".into(), 1);
        user.votes_cast.insert("b".into(), 1);
        assert_eq!(user.total_votes(), 2);
        assert_eq!(user.votes_for("a"), 1);
        assert_eq!(user.votes_for("c"), 0);
    }
}
