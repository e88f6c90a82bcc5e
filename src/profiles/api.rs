//! Profile API Endpoints
//! Mission: Profile and watchlist handlers behind the access gate
//!
//! Ownership is enforced by the route's access policy before these handlers
//! run; handlers only deal with existence and validation.

use crate::auth::models::Identity;
use crate::profiles::{
    models::{validate_name, CreateProfileRequest, Profile, UpdateProfileRequest, WatchlistAddRequest},
    store::{ProfileStore, WatchlistAdd},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct ProfileState {
    pub store: Arc<ProfileStore>,
}

impl ProfileState {
    pub fn new(store: Arc<ProfileStore>) -> Self {
        Self { store }
    }
}

fn internal(e: anyhow::Error) -> ProfileApiError {
    error!("Profile storage error: {:#}", e);
    ProfileApiError::InternalError
}

fn parse_profile_id(raw: &str) -> Result<Uuid, ProfileApiError> {
    Uuid::parse_str(raw).map_err(|_| ProfileApiError::ProfileNotFound)
}

/// Create profile - POST /api/profiles
///
/// The owner is always the caller.
pub async fn create_profile(
    State(state): State<ProfileState>,
    identity: Identity,
    Json(payload): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), ProfileApiError> {
    let name = validate_name(&payload.name).ok_or(ProfileApiError::InvalidName)?;

    let profile = state
        .store
        .create_profile(&identity.subject_id(), &name, &payload)
        .map_err(internal)?;

    Ok((StatusCode::CREATED, Json(profile)))
}

/// Caller's own profiles - GET /api/profiles
pub async fn list_my_profiles(
    State(state): State<ProfileState>,
    identity: Identity,
) -> Result<Json<Vec<Profile>>, ProfileApiError> {
    let profiles = state
        .store
        .list_by_account(&identity.subject_id())
        .map_err(internal)?;
    Ok(Json(profiles))
}

/// Every profile - GET /api/profiles/all (Admin only)
pub async fn list_all_profiles(
    State(state): State<ProfileState>,
) -> Result<Json<Vec<Profile>>, ProfileApiError> {
    Ok(Json(state.store.list_all().map_err(internal)?))
}

/// Profiles of one account - GET /api/profiles/user/:account_id
pub async fn list_account_profiles(
    State(state): State<ProfileState>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<Profile>>, ProfileApiError> {
    let account_id = Uuid::parse_str(&account_id).map_err(|_| ProfileApiError::ProfileNotFound)?;
    let profiles = state
        .store
        .list_by_account(&account_id)
        .map_err(internal)?;
    Ok(Json(profiles))
}

/// Update profile - PUT /api/profiles/:id
pub async fn update_profile(
    State(state): State<ProfileState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ProfileApiError> {
    let id = parse_profile_id(&id)?;
    let name = match payload.name.as_deref() {
        Some(raw) => Some(validate_name(raw).ok_or(ProfileApiError::InvalidName)?),
        None => None,
    };

    state
        .store
        .update_profile(&id, name.as_deref(), &payload)
        .map_err(internal)?
        .map(Json)
        .ok_or(ProfileApiError::ProfileNotFound)
}

/// Delete profile - DELETE /api/profiles/:id
pub async fn delete_profile(
    State(state): State<ProfileState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<StatusCode, ProfileApiError> {
    let id = parse_profile_id(&id)?;

    if !state.store.delete_profile(&id).map_err(internal)? {
        return Err(ProfileApiError::ProfileNotFound);
    }

    info!("Profile {} deleted by {}", id, identity.subject_id());
    Ok(StatusCode::NO_CONTENT)
}

/// Add to watchlist - POST /api/profiles/:id/watchlist
pub async fn add_to_watchlist(
    State(state): State<ProfileState>,
    Path(id): Path<String>,
    Json(payload): Json<WatchlistAddRequest>,
) -> Result<Json<Profile>, ProfileApiError> {
    let id = parse_profile_id(&id)?;
    let item_id = payload.item_id.trim();
    if item_id.is_empty() {
        return Err(ProfileApiError::MissingItemId);
    }

    match state
        .store
        .add_to_watchlist(&id, item_id)
        .map_err(internal)?
    {
        WatchlistAdd::Added(profile) => Ok(Json(profile)),
        WatchlistAdd::AlreadyPresent => Err(ProfileApiError::AlreadyInWatchlist),
        WatchlistAdd::ProfileNotFound => Err(ProfileApiError::ProfileNotFound),
    }
}

/// Get watchlist - GET /api/profiles/:id/watchlist
pub async fn get_watchlist(
    State(state): State<ProfileState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ProfileApiError> {
    let id = parse_profile_id(&id)?;
    state
        .store
        .watchlist(&id)
        .map_err(internal)?
        .map(Json)
        .ok_or(ProfileApiError::ProfileNotFound)
}

/// Remove from watchlist - DELETE /api/profiles/:id/watchlist/:item_id
pub async fn remove_from_watchlist(
    State(state): State<ProfileState>,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<Json<Profile>, ProfileApiError> {
    let id = parse_profile_id(&id)?;
    state
        .store
        .remove_from_watchlist(&id, &item_id)
        .map_err(internal)?
        .map(Json)
        .ok_or(ProfileApiError::ProfileNotFound)
}

/// Profile API errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileApiError {
    InvalidName,
    MissingItemId,
    AlreadyInWatchlist,
    ProfileNotFound,
    InternalError,
}

impl IntoResponse for ProfileApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ProfileApiError::InvalidName => (
                StatusCode::BAD_REQUEST,
                "invalid_name",
                "Profile name must be 2 to 30 characters",
            ),
            ProfileApiError::MissingItemId => {
                (StatusCode::BAD_REQUEST, "missing_fields", "item_id is required")
            }
            ProfileApiError::AlreadyInWatchlist => (
                StatusCode::BAD_REQUEST,
                "already_in_watchlist",
                "Item is already in the watchlist",
            ),
            ProfileApiError::ProfileNotFound => {
                (StatusCode::NOT_FOUND, "resource_not_found", "Profile not found")
            }
            ProfileApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error",
            ),
        };

        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}
