//! Authentication Module
//! Mission: Secure API access with JWT tokens, canonical roles and ownership checks

pub mod access;
pub mod api;
pub mod claims;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod user_store;

pub use access::{access_middleware, AccessPolicy, AccessRule, Grant, OwnershipResolver};
pub use api::AuthState;
pub use jwt::JwtHandler;
pub use middleware::auth_middleware;
pub use models::{Identity, Role};
pub use password::PasswordHasher;
pub use user_store::UserStore;
