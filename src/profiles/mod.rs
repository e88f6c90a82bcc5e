//! Profiles Module
//! Mission: Per-account viewing profiles and their watchlists

pub mod api;
pub mod models;
pub mod store;

pub use api::ProfileState;
pub use models::Profile;
pub use store::ProfileStore;
