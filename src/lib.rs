//! WallPoll, a small wallpaper voting service.
//!
//! Users `1..=59` upload one image each and spend up to two votes on other
//! users' images. Admission rules live in [`services::eligibility`]; the
//! rest of the crate loads and stores the records those rules decide over.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;
