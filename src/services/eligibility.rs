//! Admission control over user records.
//!
//! Pure decisions: callers load the records, these functions decide, and
//! callers persist whatever comes back. Nothing here performs I/O.

use crate::models::{image::Image, user::User};
use std::fmt;
use thiserror::Error;

/// Votes a single user may cast across all images.
pub const MAX_VOTES_PER_USER: u32 = 2;

/// Why a vote was refused. Checked in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteRejection {
    SelfVote,
    QuotaExceeded,
    DuplicateVote,
}

impl VoteRejection {
    /// Stable machine-readable tag.
    pub fn tag(self) -> &'static str {
        match self {
            VoteRejection::SelfVote => "SELF_VOTE",
            VoteRejection::QuotaExceeded => "QUOTA_EXCEEDED",
            VoteRejection::DuplicateVote => "DUPLICATE_VOTE",
        }
    }
}

impl fmt::Display for VoteRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VoteRejection::SelfVote => "Cannot vote for your own image.",
            VoteRejection::QuotaExceeded => {
                "You have already cast the maximum number of votes (2)."
            }
            VoteRejection::DuplicateVote => "You have already voted for this image.",
        };
        f.write_str(msg)
    }
}

/// Outcome of [`evaluate_vote`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteDecision {
    /// The updated records to persist.
    Accepted { voter: User, image: Image },
    Rejected(VoteRejection),
}

/// The targeted ID does not name the supplied image record.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("vote targets `{requested}` but image record is `{actual}`")]
pub struct TargetMismatch {
    pub requested: String,
    pub actual: String,
}

/// Decide whether `voter` may vote for `target`.
///
/// Order: self vote, then quota, then duplicate.
pub fn evaluate_vote(
    voter: &User,
    target: &Image,
    image_id: &str,
) -> Result<VoteDecision, TargetMismatch> {
    if target.id != image_id {
        return Err(TargetMismatch {
            requested: image_id.to_string(),
            actual: target.id.clone(),
        });
    }

    if target.uploader_id == voter.id {
        return Ok(VoteDecision::Rejected(VoteRejection::SelfVote));
    }
    if voter.total_votes() >= MAX_VOTES_PER_USER {
        return Ok(VoteDecision::Rejected(VoteRejection::QuotaExceeded));
    }
    let already = voter.votes_for(image_id);
    if already > 0 {
        return Ok(VoteDecision::Rejected(VoteRejection::DuplicateVote));
    }

    let mut voter = voter.clone();
    voter.votes_cast.insert(image_id.to_string(), already + 1);
    let mut image = target.clone();
    image.vote_count += 1;
    Ok(VoteDecision::Accepted { voter, image })
}

/// Votes `user` can still cast.
pub fn votes_remaining(user: &User) -> u32 {
    MAX_VOTES_PER_USER - user.total_votes().min(MAX_VOTES_PER_USER)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadRejection {
    AlreadyUploaded,
}

impl UploadRejection {
    pub fn tag(self) -> &'static str {
        match self {
            UploadRejection::AlreadyUploaded => "ALREADY_UPLOADED",
        }
    }
}

impl fmt::Display for UploadRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadRejection::AlreadyUploaded => f.write_str("User has already uploaded an image."),
        }
    }
}

/// One upload per user.
pub fn admit_upload(user: &User) -> Result<(), UploadRejection> {
    match user.uploaded_image_id {
        Some(_) => Err(UploadRejection::AlreadyUploaded),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserId;

    fn user(id: i64, votes: &[(&str, u32)]) -> User {
        let mut user = User::new(UserId::new(id).unwrap());
        for (image, count) in votes {
            user.votes_cast.insert(image.to_string(), *count);
        }
        user
    }

    fn image(id: &str, uploader: i64, votes: u64) -> Image {
        Image {
            id: id.into(),
            uploader_id: UserId::new(uploader).unwrap(),
            storage_key: format!("{id}-wall.png"),
            upload_timestamp: 1_000,
            vote_count: votes,
        }
    }

    #[test]
    fn accepted_vote_advances_both_records() {
        let voter = user(2, &[]);
        let target = image("imgA", 5, 3);

        let (voter, image) = match evaluate_vote(&voter, &target, "imgA").unwrap() {
            VoteDecision::Accepted { voter, image } => (voter, image),
            other => panic!("expected acceptance, got {other:?}"),
        };
        assert_eq!(image.vote_count, 4);
        assert_eq!(voter.votes_for("imgA"), 1);
        assert_eq!(votes_remaining(&voter), 1);
        assert_eq!(image.uploader_id, target.uploader_id);
    }

    #[test]
    fn self_vote_wins_over_every_other_rule() {
        let histories: [&[(&str, u32)]; 3] =
            [&[], &[("imgA", 1)], &[("imgB", 1), ("imgC", 1)]];
        for history in histories {
            let voter = user(5, history);
            let target = image("imgA", 5, 0);
            assert_eq!(
                evaluate_vote(&voter, &target, "imgA").unwrap(),
                VoteDecision::Rejected(VoteRejection::SelfVote)
            );
        }
    }

    #[test]
    fn spent_quota_rejects_any_other_image() {
        let voter = user(2, &[("imgA", 1), ("imgB", 1)]);
        for target in [image("imgC", 9, 0), image("imgA", 3, 1)] {
            let id = target.id.clone();
            assert_eq!(
                evaluate_vote(&voter, &target, &id).unwrap(),
                VoteDecision::Rejected(VoteRejection::QuotaExceeded)
            );
        }
    }

    #[test]
    fn second_vote_on_same_image_is_duplicate() {
        let voter = user(2, &[("imgA", 1)]);
        let target = image("imgA", 5, 1);
        assert_eq!(
            evaluate_vote(&voter, &target, "imgA").unwrap(),
            VoteDecision::Rejected(VoteRejection::DuplicateVote)
        );
    }

    #[test]
    fn legacy_double_count_still_counts_against_quota() {
        let voter = user(2, &[("imgA", 2)]);
        let target = image("imgB", 5, 0);
        assert_eq!(
            evaluate_vote(&voter, &target, "imgB").unwrap(),
            VoteDecision::Rejected(VoteRejection::QuotaExceeded)
        );
        assert_eq!(votes_remaining(&voter), 0);
    }

    #[test]
    fn same_pre_state_gives_same_decision() {
        let voter = user(2, &[("imgZ", 1)]);
        let target = image("imgA", 7, 10);
        let first = evaluate_vote(&voter, &target, "imgA").unwrap();
        let second = evaluate_vote(&voter, &target, "imgA").unwrap();
        assert_eq!(first, second);
        assert_eq!(target.vote_count, 10);
        assert_eq!(voter.total_votes(), 1);
    }

    #[test]
    fn mismatched_target_is_reported() {
        let voter = user(2, &[]);
        let target = image("imgA", 5, 0);
        let err = evaluate_vote(&voter, &target, "imgB").unwrap_err();
        assert_eq!(err.requested, "imgB");
        assert_eq!(err.actual, "imgA");
    }

    #[test]
    fn upload_admission_allows_exactly_one() {
        let mut fresh = user(3, &[("imgA", 1)]);
        assert_eq!(admit_upload(&fresh), Ok(()));
        fresh.uploaded_image_id = Some("img-3-1".into());
        assert_eq!(admit_upload(&fresh), Err(UploadRejection::AlreadyUploaded));
    }

    #[test]
    fn rejection_tags_are_stable() {
        assert_eq!(VoteRejection::SelfVote.tag(), "SELF_VOTE");
        assert_eq!(VoteRejection::QuotaExceeded.tag(), "QUOTA_EXCEEDED");
        assert_eq!(VoteRejection::DuplicateVote.tag(), "DUPLICATE_VOTE");
        assert_eq!(UploadRejection::AlreadyUploaded.tag(), "ALREADY_UPLOADED");
    }
}
