//! Marquee Backend Library
//!
//! Accounts, session tokens and access control for a multi-profile media
//! catalog, plus the profile and watchlist routes they protect.

pub mod app;
pub mod auth;
pub mod config;
pub mod middleware;
pub mod profiles;

pub use app::{build_router, AppState};
pub use config::AppConfig;
