//! Marquee - multi-profile media catalog API
//! Mission: Authenticated accounts, per-account profiles, per-profile watchlists

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marquee_backend::{
    auth::{models::RolePolicy, AuthState, JwtHandler, PasswordHasher, UserStore},
    build_router,
    profiles::{ProfileState, ProfileStore},
    AppConfig, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    let config = AppConfig::parse();

    info!("🚀 Marquee API starting");

    let hasher = PasswordHasher::new(config.bcrypt_cost)?;
    let user_store = Arc::new(UserStore::new(&config.db_path, hasher)?);
    let profile_store = Arc::new(ProfileStore::new(&config.db_path)?);
    let jwt_handler =
        Arc::new(JwtHandler::new(&config.signing_secret()).with_expiration(config.token_ttl()));

    if let Some((email, password)) = config.bootstrap_admin() {
        user_store.ensure_admin(email, password)?;
    }

    info!("🔐 Authentication initialized at: {}", config.db_path);

    let state = AppState {
        auth: AuthState::new(
            user_store,
            jwt_handler,
            RolePolicy::new(&config.admin_email_domains),
        )
        .with_cleanup(profile_store.clone()),
        profiles: ProfileState::new(profile_store),
    };

    let app = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_backend=debug,marquee=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate root
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
