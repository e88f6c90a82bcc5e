//! Service Configuration
//!
//! Every setting can come from a flag or the environment (`.env` is loaded
//! first by `main`).

use chrono::Duration;
use clap::Parser;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";

/// One year
const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

#[derive(Parser, Debug, Clone)]
#[command(name = "marquee")]
#[command(about = "Multi-profile media catalog API")]
pub struct AppConfig {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: String,

    /// SQLite database path (accounts and profiles)
    #[arg(long, env = "AUTH_DB_PATH", default_value = "marquee.db")]
    pub db_path: String,

    /// Token signing secret
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Session token lifetime in hours
    #[arg(
        long,
        env = "TOKEN_TTL_HOURS",
        default_value = "24",
        value_parser = clap::value_parser!(i64).range(1..=MAX_TOKEN_TTL_HOURS)
    )]
    pub token_ttl_hours: i64,

    /// Email domains whose registrations become admins (comma-separated)
    #[arg(long, env = "ADMIN_EMAIL_DOMAINS", value_delimiter = ',')]
    pub admin_email_domains: Vec<String>,

    /// bcrypt work factor
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Admin account created at startup when no admin exists
    #[arg(long, env = "BOOTSTRAP_ADMIN_EMAIL", requires = "bootstrap_admin_password")]
    pub bootstrap_admin_email: Option<String>,

    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD", hide_env_values = true)]
    pub bootstrap_admin_password: Option<String>,
}

impl AppConfig {
    /// Signing secret, falling back to a development value with a warning
    pub fn signing_secret(&self) -> String {
        match self.jwt_secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => {
                warn!("⚠️  JWT_SECRET not set, using development secret. SET IT IN PRODUCTION!");
                DEV_JWT_SECRET.to_string()
            }
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::hours(self.token_ttl_hours.clamp(1, MAX_TOKEN_TTL_HOURS))
    }

    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.bootstrap_admin_email, &self.bootstrap_admin_password) {
            (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
                Some((email.as_str(), password.as_str()))
            }
            _ => None,
        }
    }
}
