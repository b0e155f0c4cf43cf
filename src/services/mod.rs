//! Domain services: pure admission rules plus the orchestration that loads
//! and persists records around them.

pub mod eligibility;
pub mod gallery;
pub mod wallpoll_service;

use crate::storage::StorageError;
use eligibility::{TargetMismatch, UploadRejection, VoteRejection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("image `{0}` not found")]
    ImageNotFound(String),
    #[error("object `{0}` not found")]
    BlobNotFound(String),
    #[error("{0}")]
    VoteRejected(VoteRejection),
    #[error("{0}")]
    UploadRejected(UploadRejection),
    #[error("too many concurrent updates to `{0}`, retry the request")]
    Contention(String),
    #[error(transparent)]
    Inconsistent(#[from] TargetMismatch),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
