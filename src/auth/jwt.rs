//! JWT Token Handler
//! Mission: Issue and verify stateless, signed session tokens

use crate::auth::models::{Claims, User};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use std::fmt;
use tracing::debug;

/// Why a token was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Not a token we can parse
    Malformed,
    /// Signature good, expiry elapsed
    Expired,
    /// Well-formed but not signed with our secret
    SignatureMismatch,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "Malformed token"),
            TokenError::Expired => write!(f, "Token expired"),
            TokenError::SignatureMismatch => write!(f, "Token signature mismatch"),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
            _ => TokenError::Malformed,
        }
    }
}

/// JWT Handler for token operations.
///
/// Each handler owns its signing secret, so several signing contexts can live
/// side by side.
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiration: Duration,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expiration: Duration::hours(24), // 24-hour tokens by default
        }
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    /// Sign `claims` with `iat = now` and `exp = now + ttl`.
    ///
    /// Returns the token and its lifetime in seconds.
    pub fn issue(&self, mut claims: Claims, ttl: Duration) -> Result<(String, usize)> {
        let now = Utc::now();
        let expiration = now.checked_add_signed(ttl).context("Invalid timestamp")?;

        claims.iat = now.timestamp();
        claims.exp = expiration.timestamp();

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to generate JWT")?;

        let expires_in = ttl.num_seconds().max(0) as usize;
        Ok((token, expires_in))
    }

    /// Generate a JWT token for a user
    pub fn generate_token(&self, user: &User) -> Result<(String, usize)> {
        debug!(
            "Generating JWT for user {} ({}), expires in {}h",
            user.email,
            user.id,
            self.expiration.num_hours()
        );
        self.issue(Claims::for_user(user), self.expiration)
    }

    /// Validate a JWT token and extract claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, TokenError> {
        let decoded = decode::<Claims>(token, &self.decoding_key, &self.validation)?;

        debug!("Validated JWT for subject {}", decoded.claims.sub);

        Ok(decoded.claims)
    }
}
