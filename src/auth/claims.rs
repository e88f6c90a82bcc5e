//! Claims Normalization
//! Mission: Collapse the `role` / `isAdmin` claim shapes into one canonical role

use crate::auth::models::{Claims, Role};
use serde_json::Map;
use std::fmt;
use uuid::Uuid;

/// Canonical view of a token's claims
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalClaims {
    pub subject_id: Uuid,
    pub role: Role,
}

impl CanonicalClaims {
    /// Re-express the canonical view as a claims set
    pub fn to_claims(&self) -> Claims {
        Claims {
            sub: self.subject_id.to_string(),
            role: Some(self.role.as_str().to_string()),
            is_admin: Some(self.role == Role::Admin),
            email: None,
            iat: 0,
            exp: 0,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimsError {
    MissingSubject,
    InvalidSubject,
}

impl fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimsError::MissingSubject => write!(f, "Token has no subject"),
            ClaimsError::InvalidSubject => write!(f, "Token subject is not an account id"),
        }
    }
}

impl std::error::Error for ClaimsError {}

/// Resolve the canonical role and subject of a claims set.
///
/// Priority: a recognised `role` string wins; otherwise `isAdmin: true` means
/// admin; otherwise standard. An unrecognised `role` falls through to the
/// `isAdmin` flag.
pub fn normalize(claims: &Claims) -> Result<CanonicalClaims, ClaimsError> {
    let sub = claims.sub.trim();
    if sub.is_empty() {
        return Err(ClaimsError::MissingSubject);
    }
    let subject_id = Uuid::parse_str(sub).map_err(|_| ClaimsError::InvalidSubject)?;

    let role = claims
        .role
        .as_deref()
        .and_then(Role::from_str)
        .unwrap_or(if claims.is_admin == Some(true) {
            Role::Admin
        } else {
            Role::Standard
        });

    Ok(CanonicalClaims { subject_id, role })
}
