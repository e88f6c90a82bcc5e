//! Router assembly
//!
//! Every protected route passes `auth_middleware` first, then its own
//! `access_middleware` policy, then the handler.

use crate::auth::{
    access::{access_middleware, AccessPolicy, AccessRule, OwnershipResolver},
    api::{self as auth_api, AuthState},
    auth_middleware,
};
use crate::middleware::request_logging;
use crate::profiles::{api as profile_api, ProfileState};
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Everything the router needs
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthState,
    pub profiles: ProfileState,
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn build_router(state: AppState) -> Router {
    let jwt_handler = state.auth.jwt_handler.clone();
    let account_owner: Arc<dyn OwnershipResolver> = state.auth.user_store.clone();
    let profile_owner: Arc<dyn OwnershipResolver> = state.profiles.store.clone();

    let admin_only = AccessPolicy::new(AccessRule::admin());
    let profile_owner_only =
        AccessPolicy::new(AccessRule::owner()).owned_by("id", profile_owner.clone());
    let profile_owner_or_admin =
        AccessPolicy::new(AccessRule::owner_or_admin()).owned_by("id", profile_owner);
    let account_owner_or_admin =
        AccessPolicy::new(AccessRule::owner_or_admin()).owned_by("account_id", account_owner);

    // Public auth routes
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/login", post(auth_api::login))
        .with_state(state.auth.clone());

    // Authenticated account routes
    let account_routes = Router::new()
        .route("/api/auth/me", get(auth_api::get_current_user))
        .route("/api/auth/verify", get(auth_api::get_current_user))
        .route("/api/auth/password", put(auth_api::change_password))
        .route(
            "/api/admin/users",
            get(auth_api::list_users).route_layer(middleware::from_fn_with_state(
                admin_only.clone(),
                access_middleware,
            )),
        )
        .route(
            "/api/admin/users/:id",
            delete(auth_api::delete_user).route_layer(middleware::from_fn_with_state(
                admin_only.clone(),
                access_middleware,
            )),
        )
        .route_layer(middleware::from_fn_with_state(
            jwt_handler.clone(),
            auth_middleware,
        ))
        .with_state(state.auth.clone());

    // Profile and watchlist routes
    let profile_routes = Router::new()
        .route(
            "/api/profiles",
            get(profile_api::list_my_profiles).post(profile_api::create_profile),
        )
        .route(
            "/api/profiles/all",
            get(profile_api::list_all_profiles).route_layer(middleware::from_fn_with_state(
                admin_only,
                access_middleware,
            )),
        )
        .route(
            "/api/profiles/user/:account_id",
            get(profile_api::list_account_profiles).route_layer(
                middleware::from_fn_with_state(account_owner_or_admin, access_middleware),
            ),
        )
        .route(
            "/api/profiles/:id",
            put(profile_api::update_profile).route_layer(middleware::from_fn_with_state(
                profile_owner_only.clone(),
                access_middleware,
            )),
        )
        .route(
            "/api/profiles/:id",
            delete(profile_api::delete_profile).route_layer(middleware::from_fn_with_state(
                profile_owner_or_admin,
                access_middleware,
            )),
        )
        .route(
            "/api/profiles/:id/watchlist",
            get(profile_api::get_watchlist)
                .post(profile_api::add_to_watchlist)
                .route_layer(middleware::from_fn_with_state(
                    profile_owner_only.clone(),
                    access_middleware,
                )),
        )
        .route(
            "/api/profiles/:id/watchlist/:item_id",
            delete(profile_api::remove_from_watchlist).route_layer(
                middleware::from_fn_with_state(profile_owner_only, access_middleware),
            ),
        )
        .route_layer(middleware::from_fn_with_state(jwt_handler, auth_middleware))
        .with_state(state.profiles);

    Router::new()
        .merge(public_routes)
        .merge(account_routes)
        .merge(profile_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
