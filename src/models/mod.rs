//! Core records of the WallPoll service.
//!
//! Users and images are persisted as JSON documents in the key-value store;
//! blob metadata describes the uploaded payload itself.

pub mod blob;
pub mod image;
pub mod user;
