//! Authentication API Endpoints
//! Mission: Registration, login, token introspection and account management

use crate::auth::{
    jwt::JwtHandler,
    models::{
        normalize_email, ChangePasswordRequest, Identity, IdentitySummary, LoginRequest,
        LoginResponse, RegisterRequest, RegisterResponse, RolePolicy, UserResponse,
    },
    user_store::{CreateUserError, UserStore},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shortest accepted password
pub const MIN_PASSWORD_LEN: usize = 6;

/// Data owned by an account that has to go when the account does
pub trait AccountCleanup: Send + Sync {
    /// Remove everything held for `account_id`; returns how many records went
    fn purge_account(&self, account_id: &Uuid) -> anyhow::Result<usize>;
}

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub user_store: Arc<UserStore>,
    pub jwt_handler: Arc<JwtHandler>,
    pub role_policy: Arc<RolePolicy>,
    pub cleanups: Vec<Arc<dyn AccountCleanup>>,
}

impl AuthState {
    pub fn new(
        user_store: Arc<UserStore>,
        jwt_handler: Arc<JwtHandler>,
        role_policy: RolePolicy,
    ) -> Self {
        Self {
            user_store,
            jwt_handler,
            role_policy: Arc::new(role_policy),
            cleanups: Vec::new(),
        }
    }

    /// Run `cleanup` whenever an admin deletes an account
    pub fn with_cleanup(mut self, cleanup: Arc<dyn AccountCleanup>) -> Self {
        self.cleanups.push(cleanup);
        self
    }

    /// Run a store call on the blocking pool. bcrypt and SQLite both block.
    async fn blocking<T, F>(&self, f: F) -> Result<T, AuthApiError>
    where
        F: FnOnce(&UserStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = self.user_store.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| {
                error!("User store task failed: {}", e);
                AuthApiError::InternalError
            })
    }
}

fn storage_error(context: &'static str) -> impl FnOnce(anyhow::Error) -> AuthApiError {
    move |e| {
        error!("{}: {:#}", context, e);
        AuthApiError::InternalError
    }
}

/// Register endpoint - POST /api/auth/register
pub async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthApiError> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AuthApiError::MissingFields);
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthApiError::WeakPassword);
    }

    let role = state.role_policy.role_for(&email);
    let user = {
        let email = email.clone();
        let password = payload.password;
        state
            .blocking(move |store| store.create_user(&email, &password, role))
            .await?
    }
    .map_err(|e| match e {
        CreateUserError::DuplicateEmail => {
            warn!("Registration for existing email: {}", email);
            AuthApiError::UserAlreadyExists
        }
        CreateUserError::Storage(e) => {
            error!("Failed to create user: {:#}", e);
            AuthApiError::InternalError
        }
    })?;

    let (token, expires_in) = state.jwt_handler.generate_token(&user).map_err(|e| {
        error!("Failed to issue token: {:#}", e);
        AuthApiError::InternalError
    })?;

    info!("✅ Registered: {} ({})", user.email, user.role.as_str());

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { token, expires_in }),
    ))
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthApiError> {
    info!("🔐 Login attempt: {}", payload.email);

    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AuthApiError::InvalidCredentials);
    }

    let user = {
        let email = payload.email.clone();
        let password = payload.password;
        state
            .blocking(move |store| store.verify_credentials(&email, &password))
            .await?
    }
    .map_err(storage_error("Credential lookup failed"))?
    .ok_or_else(|| {
        warn!("❌ Failed login attempt: {}", payload.email);
        AuthApiError::InvalidCredentials
    })?;

    let (token, expires_in) = state.jwt_handler.generate_token(&user).map_err(|e| {
        error!("Failed to issue token: {:#}", e);
        AuthApiError::InternalError
    })?;

    info!("✅ Login successful: {} ({})", user.email, user.role.as_str());

    Ok(Json(LoginResponse {
        token,
        expires_in,
        user: IdentitySummary {
            id: user.id.to_string(),
            email: Some(user.email.clone()),
            role: user.role,
            is_admin: user.is_admin(),
        },
    }))
}

/// Get current user info - GET /api/auth/me and GET /api/auth/verify
///
/// Built from the token alone; a role change or deletion after issuance shows
/// up only once the token expires.
pub async fn get_current_user(identity: Identity) -> Json<IdentitySummary> {
    Json(identity.summary())
}

/// Change password - PUT /api/auth/password
pub async fn change_password(
    State(state): State<AuthState>,
    identity: Identity,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AuthApiError> {
    if payload.current_password.is_empty() || payload.new_password.is_empty() {
        return Err(AuthApiError::MissingFields);
    }
    if payload.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthApiError::WeakPassword);
    }

    let subject_id = identity.subject_id();
    let ChangePasswordRequest {
        current_password,
        new_password,
    } = payload;

    // Re-checks the current secret against the stored account; a token for a
    // deleted account cannot change anything.
    let changed = state
        .blocking(move |store| -> anyhow::Result<bool> {
            let Some(user) = store.get_user_by_id(&subject_id)? else {
                return Ok(false);
            };
            if store
                .verify_credentials(&user.email, &current_password)?
                .is_none()
            {
                return Ok(false);
            }
            store.update_password(&user.id, &new_password)?;
            Ok(true)
        })
        .await?
        .map_err(storage_error("Failed to update password"))?;

    if !changed {
        return Err(AuthApiError::InvalidCredentials);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// List all users - GET /api/admin/users (Admin only)
pub async fn list_users(
    State(state): State<AuthState>,
) -> Result<Json<Vec<UserResponse>>, AuthApiError> {
    let users = state
        .blocking(|store| store.list_users())
        .await?
        .map_err(storage_error("Failed to list users"))?;

    let response: Vec<UserResponse> = users.iter().map(UserResponse::from_user).collect();

    Ok(Json(response))
}

/// Delete user - DELETE /api/admin/users/:id (Admin only)
///
/// Profiles and other account data registered through
/// [`AuthState::with_cleanup`] go with the account.
pub async fn delete_user(
    State(state): State<AuthState>,
    identity: Identity,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AuthApiError> {
    let uuid = Uuid::parse_str(&user_id).map_err(|_| AuthApiError::InvalidUserId)?;

    // Don't allow deleting yourself
    if uuid == identity.subject_id() {
        return Err(AuthApiError::CannotDeleteSelf);
    }

    let deleted = state
        .blocking(move |store| store.delete_user(&uuid))
        .await?
        .map_err(storage_error("Failed to delete user"))?;
    if !deleted {
        return Err(AuthApiError::UserNotFound);
    }

    let cleanups = state.cleanups.clone();
    let purged = tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
        let mut purged = 0;
        for cleanup in &cleanups {
            purged += cleanup.purge_account(&uuid)?;
        }
        Ok(purged)
    })
    .await
    .map_err(|e| {
        error!("Account cleanup task failed: {}", e);
        AuthApiError::InternalError
    })?
    .map_err(storage_error("Failed to purge account data"))?;

    info!("🗑️  User deleted: {} ({} owned records removed)", user_id, purged);

    Ok(StatusCode::NO_CONTENT)
}

/// Auth API errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthApiError {
    MissingFields,
    WeakPassword,
    /// Unknown email or wrong password; deliberately indistinguishable
    InvalidCredentials,
    UserAlreadyExists,
    UserNotFound,
    InvalidUserId,
    CannotDeleteSelf,
    InternalError,
}

impl AuthApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthApiError::MissingFields => "missing_fields",
            AuthApiError::WeakPassword => "weak_password",
            AuthApiError::InvalidCredentials => "invalid_credentials",
            AuthApiError::UserAlreadyExists => "duplicate_account",
            AuthApiError::UserNotFound => "not_found",
            AuthApiError::InvalidUserId => "invalid_user_id",
            AuthApiError::CannotDeleteSelf => "cannot_delete_self",
            AuthApiError::InternalError => "internal_error",
        }
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::MissingFields => {
                (StatusCode::BAD_REQUEST, "Email and password are required")
            }
            AuthApiError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                "Password must be at least 6 characters",
            ),
            AuthApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password")
            }
            AuthApiError::UserAlreadyExists => (StatusCode::CONFLICT, "Email already registered"),
            AuthApiError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            AuthApiError::InvalidUserId => (StatusCode::BAD_REQUEST, "Invalid user ID format"),
            AuthApiError::CannotDeleteSelf => {
                (StatusCode::BAD_REQUEST, "Cannot delete your own account")
            }
            AuthApiError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (
            status,
            Json(json!({ "error": self.kind(), "message": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{claims::normalize, models::Role, password::PasswordHasher};
    use tempfile::NamedTempFile;

    fn create_test_state(policy: RolePolicy) -> (AuthState, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = UserStore::new(
            temp_file.path().to_str().unwrap(),
            PasswordHasher::new(4).unwrap(),
        )
        .unwrap();
        let state = AuthState::new(
            Arc::new(store),
            Arc::new(JwtHandler::new("api-test-secret")),
            policy,
        );
        (state, temp_file)
    }

    fn register_request(email: &str, password: &str) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
    }

    fn login_request(email: &str, password: &str) -> Json<LoginRequest> {
        Json(LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        })
    }

    #[tokio::test]
    async fn test_register_then_login_round_trips_role() {
        let (state, _temp) = create_test_state(RolePolicy::new(["admin.com"]));

        for (email, expected) in [
            ("user1@x.com", Role::Standard),
            ("boss@admin.com", Role::Admin),
        ] {
            let (status, Json(registered)) =
                register(State(state.clone()), register_request(email, "secret123"))
                    .await
                    .unwrap();
            assert_eq!(status, StatusCode::CREATED);

            let claims = state.jwt_handler.validate_token(&registered.token).unwrap();
            assert_eq!(normalize(&claims).unwrap().role, expected);

            let Json(logged_in) = login(State(state.clone()), login_request(email, "secret123"))
                .await
                .unwrap();
            assert_eq!(logged_in.user.role, expected);

            let claims = state.jwt_handler.validate_token(&logged_in.token).unwrap();
            let canonical = normalize(&claims).unwrap();
            assert_eq!(canonical.role, expected);
            assert_eq!(canonical.subject_id.to_string(), logged_in.user.id);
        }
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (state, _temp) = create_test_state(RolePolicy::default());

        let missing = register(State(state.clone()), register_request("", "secret123")).await;
        assert_eq!(missing.unwrap_err(), AuthApiError::MissingFields);

        let missing = register(State(state.clone()), register_request("a@b.com", "")).await;
        assert_eq!(missing.unwrap_err(), AuthApiError::MissingFields);

        let weak = register(State(state.clone()), register_request("a@b.com", "12345")).await;
        assert_eq!(weak.unwrap_err(), AuthApiError::WeakPassword);
    }

    #[tokio::test]
    async fn test_register_duplicate_case_insensitive() {
        let (state, _temp) = create_test_state(RolePolicy::default());

        register(State(state.clone()), register_request("user1@x.com", "secret123"))
            .await
            .unwrap();
        let dup = register(State(state.clone()), register_request("USER1@x.com", "secret999")).await;
        assert_eq!(dup.unwrap_err(), AuthApiError::UserAlreadyExists);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (state, _temp) = create_test_state(RolePolicy::default());
        register(State(state.clone()), register_request("user1@x.com", "secret123"))
            .await
            .unwrap();

        let unknown = login(State(state.clone()), login_request("ghost@x.com", "secret123"))
            .await
            .unwrap_err();
        let wrong = login(State(state.clone()), login_request("user1@x.com", "wrong-secret"))
            .await
            .unwrap_err();

        assert_eq!(unknown, AuthApiError::InvalidCredentials);
        assert_eq!(unknown, wrong);
        assert_eq!(
            unknown.into_response().status(),
            wrong.into_response().status()
        );
    }

    #[test]
    fn test_auth_api_error_responses() {
        let invalid_creds = AuthApiError::InvalidCredentials.into_response();
        assert_eq!(invalid_creds.status(), StatusCode::UNAUTHORIZED);

        let missing = AuthApiError::MissingFields.into_response();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let not_found = AuthApiError::UserNotFound.into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let conflict = AuthApiError::UserAlreadyExists.into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }
}
