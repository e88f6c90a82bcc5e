//! User Storage
//! Mission: Store account credentials with SQLite

use crate::auth::{
    access::OwnershipResolver,
    models::{normalize_email, Role, User},
    password::PasswordHasher,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, types::Type, Connection, ErrorCode, Row};
use std::fmt;
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, role, created_at";

/// Account creation failures
#[derive(Debug)]
pub enum CreateUserError {
    DuplicateEmail,
    Storage(anyhow::Error),
}

impl fmt::Display for CreateUserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateUserError::DuplicateEmail => write!(f, "Email already registered"),
            CreateUserError::Storage(e) => write!(f, "Failed to store user: {:#}", e),
        }
    }
}

impl std::error::Error for CreateUserError {}

impl From<anyhow::Error> for CreateUserError {
    fn from(err: anyhow::Error) -> Self {
        CreateUserError::Storage(err)
    }
}

impl From<rusqlite::Error> for CreateUserError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                CreateUserError::DuplicateEmail
            }
            _ => CreateUserError::Storage(err.into()),
        }
    }
}

/// User storage with SQLite backend
#[derive(Clone)]
pub struct UserStore {
    db_path: String,
    hasher: PasswordHasher,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str, hasher: PasswordHasher) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            hasher,
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open auth database at {}", self.db_path))
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Create an admin account at startup when none exists yet
    pub fn ensure_admin(&self, email: &str, password: &str) -> Result<Option<User>> {
        let conn = self.connect()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for admin users")?;

        if count > 0 {
            return Ok(None);
        }

        let admin = self
            .create_user(email, password, Role::Admin)
            .map_err(|e| anyhow::anyhow!("Failed to create bootstrap admin: {}", e))?;
        info!("🔐 Bootstrap admin created: {}", admin.email);
        Ok(Some(admin))
    }

    /// Get user by email (case-insensitive)
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            &normalize_email(email),
        )
    }

    pub fn get_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        self.query_one(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            &id.to_string(),
        )
    }

    fn query_one(&self, sql: &str, key: &str) -> Result<Option<User>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;

        match stmt.query_row(params![key], row_to_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify email and password.
    ///
    /// Unknown email and wrong password both return `Ok(None)` after the same
    /// amount of hashing work.
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        match self.get_user_by_email(email)? {
            Some(user) if self.hasher.verify(password, &user.password_hash) => Ok(Some(user)),
            Some(_) => Ok(None),
            None => {
                self.hasher.verify_decoy(password);
                Ok(None)
            }
        }
    }

    /// Create a new user
    pub fn create_user(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, CreateUserError> {
        let password_hash = self.hasher.hash(password)?;

        let user = User {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash,
            role,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO users (id, email, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.email,
                user.password_hash,
                user.role.as_str(),
                user.created_at,
            ],
        )?;

        info!("✅ Created user: {} ({})", user.email, user.role.as_str());

        Ok(user)
    }

    /// Replace a user's password; the new secret is rehashed
    pub fn update_password(&self, user_id: &Uuid, new_password: &str) -> Result<()> {
        let password_hash = self.hasher.hash(new_password)?;
        let conn = self.connect()?;

        let rows_affected = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user_id.to_string()],
        )?;

        if rows_affected == 0 {
            anyhow::bail!("User not found");
        }

        info!("🔑 Password changed for user: {}", user_id);
        Ok(())
    }

    /// List all users (admin only)
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.connect()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM users ORDER BY created_at",
            USER_COLUMNS
        ))?;

        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Delete a user by ID (admin only). `false` when no such account.
    pub fn delete_user(&self, user_id: &Uuid) -> Result<bool> {
        let conn = self.connect()?;

        let rows_affected = conn
            .execute(
                "DELETE FROM users WHERE id = ?1",
                params![user_id.to_string()],
            )
            .context("Failed to delete user")?;

        if rows_affected > 0 {
            info!("🗑️  Deleted user: {}", user_id);
        }
        Ok(rows_affected > 0)
    }
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let role_str: String = row.get(3)?;
    Ok(User {
        id: Uuid::parse_str(&id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
        })?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: Role::from_str(&role_str).unwrap_or(Role::Standard),
        created_at: row.get(4)?,
    })
}

/// An account owns itself. Used for routes scoped to an account id.
#[async_trait]
impl OwnershipResolver for UserStore {
    async fn owner_of(&self, resource_id: &str) -> Result<Option<Uuid>> {
        let Ok(id) = Uuid::parse_str(resource_id) else {
            return Ok(None);
        };
        let store = self.clone();
        let user = tokio::task::spawn_blocking(move || store.get_user_by_id(&id))
            .await
            .context("Account lookup task failed")??;
        Ok(user.map(|u| u.id))
    }
}
