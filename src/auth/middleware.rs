//! Authentication Middleware
//! Mission: Turn a bearer token into a request-scoped Identity, or refuse

use crate::auth::{
    claims::normalize,
    jwt::{JwtHandler, TokenError},
    models::Identity,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bearer token from the `Authorization` header.
///
/// A missing header, another scheme or an empty token all read as "no
/// credential".
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Verify and normalize the request's credential. No database access: the
/// token's claims are trusted as of issuance.
pub fn authenticate(jwt_handler: &JwtHandler, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::Unauthenticated)?;

    let claims = jwt_handler.validate_token(&token).map_err(|e| {
        debug!("Rejected bearer token: {}", e);
        AuthError::from(e)
    })?;

    let canonical = normalize(&claims).map_err(|e| {
        warn!("Signed token with unusable claims: {}", e);
        AuthError::InvalidCredential
    })?;

    Ok(Identity::new(canonical.subject_id, canonical.role, claims))
}

/// Auth middleware that validates JWT tokens
pub async fn auth_middleware(
    State(jwt_handler): State<Arc<JwtHandler>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let identity = authenticate(&jwt_handler, req.headers())?;

    // Add identity to request extensions so handlers can access it
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Auth error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No bearer credential supplied
    Unauthenticated,
    ExpiredCredential,
    /// Malformed, forged, or carrying unusable claims
    InvalidCredential,
}

impl AuthError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::ExpiredCredential => "expired_credential",
            AuthError::InvalidCredential => "invalid_credential",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::ExpiredCredential,
            TokenError::Malformed | TokenError::SignatureMismatch => AuthError::InvalidCredential,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::Unauthenticated => "Missing authorization token. Use: Bearer {token}",
            AuthError::ExpiredCredential => "Token expired",
            AuthError::InvalidCredential => "Invalid token",
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": self.kind(), "message": message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{Claims, Role};
    use axum::http::{header::AUTHORIZATION, HeaderValue};
    use chrono::Duration;
    use serde_json::Map;
    use uuid::Uuid;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn legacy_claims(subject: Uuid) -> Claims {
        Claims {
            sub: subject.to_string(),
            role: None,
            is_admin: Some(true),
            email: None,
            iat: 0,
            exp: 0,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_auth_error_responses() {
        for err in [
            AuthError::Unauthenticated,
            AuthError::ExpiredCredential,
            AuthError::InvalidCredential,
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_missing_or_foreign_scheme_is_no_credential() {
        let handler = JwtHandler::new("gate-secret");

        assert_eq!(
            authenticate(&handler, &HeaderMap::new()).unwrap_err(),
            AuthError::Unauthenticated
        );
        assert_eq!(
            authenticate(&handler, &headers_with("Basic dXNlcjpwYXNz")).unwrap_err(),
            AuthError::Unauthenticated
        );
        assert_eq!(
            authenticate(&handler, &headers_with("Token abc")).unwrap_err(),
            AuthError::Unauthenticated
        );
    }

    #[test]
    fn test_garbage_bearer_is_invalid() {
        let handler = JwtHandler::new("gate-secret");
        assert_eq!(
            authenticate(&handler, &headers_with("Bearer not.a.jwt")).unwrap_err(),
            AuthError::InvalidCredential
        );
    }

    #[test]
    fn test_expired_bearer_is_distinguished() {
        let handler = JwtHandler::new("gate-secret");
        let (token, _) = handler
            .issue(legacy_claims(Uuid::new_v4()), Duration::minutes(-5))
            .unwrap();

        assert_eq!(
            authenticate(&handler, &headers_with(&format!("Bearer {}", token))).unwrap_err(),
            AuthError::ExpiredCredential
        );
    }

    #[test]
    fn test_non_uuid_subject_is_invalid() {
        let handler = JwtHandler::new("gate-secret");
        let mut claims = legacy_claims(Uuid::new_v4());
        claims.sub = "507f1f77bcf86cd799439011".to_string();
        let (token, _) = handler.issue(claims, Duration::minutes(5)).unwrap();

        assert_eq!(
            authenticate(&handler, &headers_with(&format!("Bearer {}", token))).unwrap_err(),
            AuthError::InvalidCredential
        );
    }

    #[test]
    fn test_valid_bearer_yields_normalized_identity() {
        let handler = JwtHandler::new("gate-secret");
        let subject = Uuid::new_v4();
        let (token, _) = handler
            .issue(legacy_claims(subject), Duration::minutes(5))
            .unwrap();

        let identity = authenticate(&handler, &headers_with(&format!("Bearer {}", token))).unwrap();
        assert_eq!(identity.subject_id(), subject);
        assert_eq!(identity.role(), Role::Admin);
        assert_eq!(identity.claims().is_admin, Some(true));
    }
}
