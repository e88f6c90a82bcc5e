//! Authentication Models
//! Mission: Define account, claim and identity data structures

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Account record held by the credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: Role,
    pub created_at: String,
}

impl User {
    /// Legacy boolean view of the role. Always derived, never stored.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Canonical account role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "admin")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Admin => "admin",
        }
    }

    /// Parse a role string. `user` is the legacy spelling of `standard`.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "standard" | "user" => Some(Role::Standard),
            _ => None,
        }
    }
}

/// JWT claims payload, as signed and as decoded.
///
/// Tokens minted by older deployments carry `userId` instead of `sub` and may
/// carry only `isAdmin` or only `role`. The codec keeps both shapes verbatim;
/// [`crate::auth::claims::normalize`] is the only place that interprets them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    #[serde(alias = "userId")]
    pub sub: String,
    #[serde(
        default,
        deserialize_with = "string_or_absent",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<String>,
    #[serde(
        rename = "isAdmin",
        default,
        deserialize_with = "bool_or_absent",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_admin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub exp: i64,
    /// Unrecognised claims, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Legacy issuers wrote `role` and `isAdmin` with loose types. A value of the
// wrong type reads as absent so the normalizer can fall through to the other
// claim instead of the whole token failing to decode.
fn string_or_absent<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn bool_or_absent<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        _ => None,
    })
}

impl Claims {
    /// Claims for a freshly authenticated account. `role` and `isAdmin` are
    /// both written from the same canonical role so either reader agrees.
    pub fn for_user(user: &User) -> Self {
        Self {
            sub: user.id.to_string(),
            role: Some(user.role.as_str().to_string()),
            is_admin: Some(user.is_admin()),
            email: Some(user.email.clone()),
            iat: 0,
            exp: 0,
            extra: Map::new(),
        }
    }
}

/// Authenticated identity for the lifetime of one request.
///
/// Only the authentication gate can build one, so handlers receiving an
/// `Identity` know it came from a verified token.
#[derive(Debug, Clone)]
pub struct Identity {
    subject_id: Uuid,
    role: Role,
    claims: Claims,
}

impl Identity {
    pub(crate) fn new(subject_id: Uuid, role: Role, claims: Claims) -> Self {
        Self {
            subject_id,
            role,
            claims,
        }
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn email(&self) -> Option<&str> {
        self.claims.email.as_deref()
    }

    /// Raw claims as decoded from the token
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            id: self.subject_id.to_string(),
            email: self.email().map(str::to_string),
            role: self.role,
            is_admin: self.role == Role::Admin,
        }
    }
}

/// Which role a newly registered account receives.
///
/// Domain-based elevation is deployment policy: with no domains configured
/// every registration is `standard`.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    admin_email_domains: Vec<String>,
}

impl RolePolicy {
    pub fn new<I, S>(admin_email_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let admin_email_domains = admin_email_domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_start_matches('@').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            admin_email_domains,
        }
    }

    pub fn role_for(&self, email: &str) -> Role {
        let email = normalize_email(email);
        let Some((_, domain)) = email.rsplit_once('@') else {
            return Role::Standard;
        };
        if self.admin_email_domains.iter().any(|d| d == domain) {
            Role::Admin
        } else {
            Role::Standard
        }
    }
}

/// Case-fold and trim an email so lookups are case-insensitive
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Registration response
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub token: String,
    pub expires_in: usize,
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: usize, // seconds until expiration
    pub user: IdentitySummary,
}

/// Password change request body
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Identity as shown to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentitySummary {
    pub id: String,
    pub email: Option<String>,
    pub role: Role,
    pub is_admin: bool,
}

/// User response (sanitized)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub created_at: String,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at.clone(),
        }
    }
}
