//! Access Control
//! Mission: Role- and ownership-based authorization for every protected route
//!
//! A route declares an [`AccessRule`] (the grants that admit a caller) and,
//! for owner-scoped routes, which path parameter names the resource and which
//! [`OwnershipResolver`] knows its owner. New resource types only need a new
//! resolver.

use crate::auth::{
    middleware::AuthError,
    models::{Identity, Role},
};
use async_trait::async_trait;
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Maps a resource id to the account that owns it
#[async_trait]
pub trait OwnershipResolver: Send + Sync {
    /// `Ok(None)` when the resource does not exist
    async fn owner_of(&self, resource_id: &str) -> anyhow::Result<Option<Uuid>>;
}

/// One way of being admitted by a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grant {
    Role(Role),
    /// The caller owns the targeted resource
    Owner,
}

impl Grant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grant::Role(role) => role.as_str(),
            Grant::Owner => "owner",
        }
    }
}

/// Set of grants a route accepts. Empty admits any authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRule {
    grants: Vec<Grant>,
}

impl AccessRule {
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn new<I>(grants: I) -> Self
    where
        I: IntoIterator<Item = Grant>,
    {
        let mut rule = Self::default();
        for grant in grants {
            if !rule.grants.contains(&grant) {
                rule.grants.push(grant);
            }
        }
        rule
    }

    pub fn admin() -> Self {
        Self::new([Grant::Role(Role::Admin)])
    }

    pub fn owner() -> Self {
        Self::new([Grant::Owner])
    }

    pub fn owner_or_admin() -> Self {
        Self::new([Grant::Owner, Grant::Role(Role::Admin)])
    }

    pub fn is_open(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn admits_role(&self, role: Role) -> bool {
        self.grants.contains(&Grant::Role(role))
    }

    pub fn admits_owner(&self) -> bool {
        self.grants.contains(&Grant::Owner)
    }

    pub fn required(&self) -> Vec<&'static str> {
        self.grants.iter().map(Grant::as_str).collect()
    }
}

/// Resource whose ownership should be checked, and who can tell
#[derive(Clone, Copy)]
pub struct OwnershipCheck<'a> {
    pub resolver: &'a dyn OwnershipResolver,
    pub resource_id: &'a str,
}

/// Authorization failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    InsufficientPermissions {
        required: Vec<&'static str>,
        actual: Role,
    },
    /// Ownership target absent, or its owner could not be determined
    ResourceNotFound,
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::InsufficientPermissions { required, actual } => write!(
                f,
                "Insufficient permissions: requires one of [{}], have {}",
                required.join(", "),
                actual.as_str()
            ),
            AccessError::ResourceNotFound => write!(f, "Resource not found"),
        }
    }
}

impl std::error::Error for AccessError {}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        match self {
            AccessError::InsufficientPermissions { required, actual } => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "insufficient_permissions",
                    "message": "Insufficient permissions",
                    "required": required,
                    "actual": actual,
                })),
            )
                .into_response(),
            AccessError::ResourceNotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": "resource_not_found",
                    "message": "Resource not found",
                })),
            )
                .into_response(),
        }
    }
}

/// Decide whether `identity` may proceed under `rule`.
///
/// Admins get no implicit bypass: they pass on role only when the rule names
/// `admin`. Resolver failures deny as not-found.
pub async fn authorize(
    identity: &Identity,
    rule: &AccessRule,
    ownership: Option<OwnershipCheck<'_>>,
) -> Result<(), AccessError> {
    if rule.is_open() || rule.admits_role(identity.role()) {
        return Ok(());
    }

    let denied = || AccessError::InsufficientPermissions {
        required: rule.required(),
        actual: identity.role(),
    };

    if !rule.admits_owner() {
        return Err(denied());
    }
    let Some(check) = ownership else {
        return Err(denied());
    };

    match check.resolver.owner_of(check.resource_id).await {
        Ok(Some(owner)) if owner == identity.subject_id() => Ok(()),
        Ok(Some(_)) => {
            debug!(
                "Subject {} does not own resource {}",
                identity.subject_id(),
                check.resource_id
            );
            Err(denied())
        }
        Ok(None) => Err(AccessError::ResourceNotFound),
        Err(e) => {
            warn!(
                "Ownership lookup failed for resource {}: {:#}",
                check.resource_id, e
            );
            Err(AccessError::ResourceNotFound)
        }
    }
}

/// Per-route authorization requirement
#[derive(Clone)]
pub struct AccessPolicy {
    rule: AccessRule,
    resource: Option<(&'static str, Arc<dyn OwnershipResolver>)>,
}

impl AccessPolicy {
    pub fn new(rule: AccessRule) -> Self {
        Self {
            rule,
            resource: None,
        }
    }

    /// Check ownership of the resource named by path parameter `param`
    pub fn owned_by(mut self, param: &'static str, resolver: Arc<dyn OwnershipResolver>) -> Self {
        self.resource = Some((param, resolver));
        self
    }

    pub async fn check(
        &self,
        identity: &Identity,
        params: &HashMap<String, String>,
    ) -> Result<(), AccessError> {
        let ownership = match &self.resource {
            Some((param, resolver)) => match params.get(*param) {
                Some(resource_id) => Some(OwnershipCheck {
                    resolver: resolver.as_ref(),
                    resource_id: resource_id.as_str(),
                }),
                None => {
                    warn!("Route is missing ownership parameter '{}'", param);
                    None
                }
            },
            None => None,
        };

        authorize(identity, &self.rule, ownership).await
    }
}

/// Access middleware. Must run inside `auth_middleware`.
pub async fn access_middleware(
    State(policy): State<AccessPolicy>,
    params: Option<Path<HashMap<String, String>>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(identity) = req.extensions().get::<Identity>().cloned() else {
        return AuthError::Unauthenticated.into_response();
    };

    let params = params.map(|Path(p)| p).unwrap_or_default();
    if let Err(e) = policy.check(&identity, &params).await {
        debug!(
            "Denied {} {} for subject {}: {}",
            req.method(),
            req.uri().path(),
            identity.subject_id(),
            e
        );
        return e.into_response();
    }

    next.run(req).await
}
