//! End-to-end tests for registration, login, token handling and
//! ownership-gated profile routes, driven through the assembled router.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use marquee_backend::{
    auth::{
        models::{Claims, RolePolicy},
        AuthState, JwtHandler, PasswordHasher, UserStore,
    },
    build_router,
    profiles::{ProfileState, ProfileStore},
    AppState,
};
use serde_json::{json, Value};
use std::{
    sync::Arc,
    time::{Duration as StdDuration, Instant},
};
use tempfile::NamedTempFile;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret";

struct TestApp {
    router: Router,
    jwt: Arc<JwtHandler>,
    users: Arc<UserStore>,
    _db: NamedTempFile,
}

fn test_app() -> TestApp {
    test_app_with(PasswordHasher::new(4).unwrap())
}

fn test_app_with(hasher: PasswordHasher) -> TestApp {
    let db = NamedTempFile::new().unwrap();
    let path = db.path().to_str().unwrap();

    let users = Arc::new(UserStore::new(path, hasher).unwrap());
    let profiles = Arc::new(ProfileStore::new(path).unwrap());
    let jwt = Arc::new(JwtHandler::new(SECRET));

    let router = build_router(AppState {
        auth: AuthState::new(users.clone(), jwt.clone(), RolePolicy::new(["admin.com"]))
            .with_cleanup(profiles.clone()),
        profiles: ProfileState::new(profiles),
    });

    TestApp {
        router,
        jwt,
        users,
        _db: db,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn register(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {}: {}", email, body);
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_profile(&self, token: &str, name: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/profiles",
                Some(token),
                Some(json!({ "name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create profile: {}", body);
        body
    }

    fn subject_of(&self, token: &str) -> String {
        self.jwt.validate_token(token).unwrap().sub
    }
}

fn flip_signature_char(token: &str) -> String {
    let (head, sig) = token.rsplit_once('.').unwrap();
    let mut sig: Vec<char> = sig.chars().collect();
    let mid = sig.len() / 2;
    sig[mid] = if sig[mid] == 'A' { 'B' } else { 'A' };
    format!("{}.{}", head, sig.into_iter().collect::<String>())
}

#[tokio::test]
async fn test_profile_owner_is_token_subject_and_others_cannot_delete() {
    let app = test_app();

    let t1 = app.register("user1@x.com", "secret123").await;
    let profile = app.create_profile(&t1, "Vilma").await;
    assert_eq!(profile["account_id"], app.subject_of(&t1));

    let profile_uri = format!("/api/profiles/{}", profile["id"].as_str().unwrap());

    let t2 = app.register("user2@x.com", "secret456").await;
    let (status, body) = app.call(Method::DELETE, &profile_uri, Some(&t2), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "insufficient_permissions");
    assert_eq!(body["actual"], "standard");

    // still there for its owner
    let (status, body) = app.call(Method::GET, "/api/profiles", Some(&t1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = app.call(Method::DELETE, &profile_uri, Some(&t1), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.call(Method::DELETE, &profile_uri, Some(&t1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "resource_not_found");
}

#[tokio::test]
async fn test_watchlist_is_owner_only_even_for_admins() {
    let app = test_app();

    let owner = app.register("user1@x.com", "secret123").await;
    let admin = app.register("boss@admin.com", "secret123").await;
    let profile = app.create_profile(&owner, "Melina").await;
    let id = profile["id"].as_str().unwrap();
    let watchlist_uri = format!("/api/profiles/{}/watchlist", id);

    let (status, body) = app
        .call(
            Method::POST,
            &watchlist_uri,
            Some(&owner),
            Some(json!({ "movieId": "movie-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["watchlist"], json!(["movie-1"]));

    let (status, body) = app
        .call(
            Method::POST,
            &watchlist_uri,
            Some(&owner),
            Some(json!({ "item_id": "movie-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "already_in_watchlist");

    let (status, _) = app.call(Method::GET, &watchlist_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // admin is admitted where the rule names admin
    let (status, _) = app
        .call(Method::DELETE, &format!("/api/profiles/{}", id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_watchlist_remove_and_list() {
    let app = test_app();
    let owner = app.register("user1@x.com", "secret123").await;
    let profile = app.create_profile(&owner, "Marcos").await;
    let watchlist_uri = format!("/api/profiles/{}/watchlist", profile["id"].as_str().unwrap());

    for item in ["m-1", "m-2"] {
        app.call(
            Method::POST,
            &watchlist_uri,
            Some(&owner),
            Some(json!({ "item_id": item })),
        )
        .await;
    }

    let (status, body) = app
        .call(Method::DELETE, &format!("{}/m-1", watchlist_uri), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["watchlist"], json!(["m-2"]));

    let (status, body) = app.call(Method::GET, &watchlist_uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["m-2"]));
}

#[tokio::test]
async fn test_ownership_target_missing_is_not_found() {
    let app = test_app();
    let token = app.register("user1@x.com", "secret123").await;

    for uri in [
        format!("/api/profiles/{}/watchlist", uuid::Uuid::new_v4()),
        "/api/profiles/507f1f77bcf86cd799439011/watchlist".to_string(),
    ] {
        let (status, body) = app.call(Method::GET, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["error"], "resource_not_found");
    }
}

#[tokio::test]
async fn test_account_profile_listing() {
    let app = test_app();
    let t1 = app.register("user1@x.com", "secret123").await;
    let t2 = app.register("user2@x.com", "secret123").await;
    let admin = app.register("boss@admin.com", "secret123").await;
    app.create_profile(&t1, "Vilma").await;

    let uri = format!("/api/profiles/user/{}", app.subject_of(&t1));

    let (status, body) = app.call(Method::GET, &uri, Some(&t1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = app.call(Method::GET, &uri, Some(&t2), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(Method::GET, "/api/profiles/all", Some(&t1), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .call(Method::GET, "/api/profiles/all", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_login_failures_share_one_error() {
    let app = test_app();
    app.register("user1@x.com", "secret123").await;

    let (s1, b1) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "ghost@x.com", "password": "secret123" })),
        )
        .await;
    let (s2, b2) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "user1@x.com", "password": "wrong" })),
        )
        .await;

    assert_eq!(s1, StatusCode::UNAUTHORIZED);
    assert_eq!((s1, &b1), (s2, &b2));
    assert_eq!(b1["error"], "invalid_credentials");
}

#[tokio::test]
async fn test_login_returns_identity_summary() {
    let app = test_app();
    app.register("Boss@Admin.com", "secret123").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "boss@admin.com", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");
    assert_eq!(body["user"]["is_admin"], true);
    assert_eq!(body["user"]["email"], "boss@admin.com");

    let token = body["token"].as_str().unwrap();
    let (status, me) = app.call(Method::GET, "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me, body["user"]);
}

#[tokio::test]
async fn test_register_errors() {
    let app = test_app();
    app.register("user1@x.com", "secret123").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "USER1@x.com", "password": "another1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_account");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "user3@x.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_fields");
}

#[tokio::test]
async fn test_credential_rejections() {
    let app = test_app();
    let token = app.register("user1@x.com", "secret123").await;

    let (status, body) = app.call(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");

    let (status, body) = app
        .call(Method::GET, "/api/auth/me", Some(&flip_signature_char(&token)), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credential");

    let foreign = JwtHandler::new("someone-elses-secret");
    let claims = app.jwt.validate_token(&token).unwrap();
    let (forged, _) = foreign.issue(claims.clone(), Duration::hours(1)).unwrap();
    let (status, body) = app.call(Method::GET, "/api/auth/me", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credential");

    let (expired, _) = app.jwt.issue(claims, Duration::hours(-1)).unwrap();
    let (status, body) = app.call(Method::GET, "/api/auth/me", Some(&expired), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "expired_credential");
}

#[tokio::test]
async fn test_non_bearer_scheme_is_no_credential() {
    let app = test_app();
    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn test_legacy_is_admin_token_is_honoured() {
    let app = test_app();
    let admin = app
        .users
        .create_user("legacy@x.com", "secret123", marquee_backend::auth::Role::Admin)
        .unwrap();

    // Older tokens carried only `userId` and `isAdmin`
    let claims: Claims = serde_json::from_value(json!({
        "userId": admin.id.to_string(),
        "isAdmin": true,
    }))
    .unwrap();
    let (token, _) = app.jwt.issue(claims, Duration::hours(1)).unwrap();

    let (status, _) = app
        .call(Method::GET, "/api/admin/users", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_token_outlives_account_changes_until_expiry() {
    let app = test_app();
    let token = app.register("user1@x.com", "secret123").await;
    let subject = uuid::Uuid::parse_str(&app.subject_of(&token)).unwrap();

    // Identity comes from the token, not a live lookup: deleting the account
    // does not revoke tokens already issued.
    assert!(app.users.delete_user(&subject).unwrap());

    let (status, body) = app.call(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], subject.to_string());
}

#[tokio::test]
async fn test_concurrent_logins_do_not_invalidate_each_other() {
    let app = test_app();
    app.register("user1@x.com", "secret123").await;

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let (_, body) = app
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "user1@x.com", "password": "secret123" })),
            )
            .await;
        tokens.push(body["token"].as_str().unwrap().to_string());
    }

    for token in &tokens {
        let (status, _) = app.call(Method::GET, "/api/auth/verify", Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_password_change() {
    let app = test_app();
    let token = app.register("user1@x.com", "secret123").await;

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/auth/password",
            Some(&token),
            Some(json!({ "current_password": "nope", "new_password": "fresh-secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credentials");

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/auth/password",
            Some(&token),
            Some(json!({ "current_password": "secret123", "new_password": "fresh-secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "user1@x.com", "password": "fresh-secret" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_user_management() {
    let app = test_app();
    let admin = app.register("boss@admin.com", "secret123").await;
    let user = app.register("user1@x.com", "secret123").await;
    let user_id = app.subject_of(&user);

    let (status, _) = app.call(Method::GET, "/api/admin/users", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.call(Method::GET, "/api/admin/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert!(body[0].get("password_hash").is_none());

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/admin/users/{}", app.subject_of(&admin)),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "cannot_delete_self");

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/admin/users/{}", user_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_admin_delete_removes_account_profiles() {
    let app = test_app();
    let admin = app.register("boss@admin.com", "secret123").await;
    let user = app.register("user1@x.com", "secret123").await;
    let profile = app.create_profile(&user, "Vilma").await;
    app.create_profile(&admin, "Melina").await;

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/admin/users/{}", app.subject_of(&user)),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .call(Method::GET, "/api/profiles/all", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let remaining = body.as_array().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_ne!(remaining[0]["id"], profile["id"]);

    let (status, body) = app
        .call(
            Method::DELETE,
            &format!("/api/admin/users/{}", app.subject_of(&user)),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_login_hashing_does_not_stall_other_requests() {
    let app = Arc::new(test_app_with(PasswordHasher::with_default_cost().unwrap()));

    let login_app = app.clone();
    let login = tokio::spawn(async move {
        login_app
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": "ghost@x.com", "password": "secret123" })),
            )
            .await
    });

    // With one worker, a login hashing on the runtime would hold every timer.
    let started = Instant::now();
    for _ in 0..5 {
        tokio::time::sleep(StdDuration::from_millis(1)).await;
    }
    let ticks = started.elapsed();

    let (status, body) = login.await.unwrap();
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_credentials");
    assert!(
        ticks < StdDuration::from_millis(150),
        "timers stalled for {:?} during login",
        ticks
    );
}

#[tokio::test]
async fn test_health_is_public() {
    let app = test_app();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
