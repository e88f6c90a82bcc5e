//! Profile Storage
//! Mission: Persist profiles and their watchlists with SQLite

use crate::auth::{access::OwnershipResolver, api::AccountCleanup};
use crate::profiles::models::{
    dedup_restrictions, image_url_or_default, CreateProfileRequest, Profile, Restriction,
    UpdateProfileRequest,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

const PROFILE_COLUMNS: &str =
    "id, account_id, name, image_url, is_child, restrictions, created_at, updated_at";

/// Result of adding an item to a watchlist
#[derive(Debug, PartialEq)]
pub enum WatchlistAdd {
    Added(Profile),
    AlreadyPresent,
    ProfileNotFound,
}

/// Profile storage with SQLite backend
#[derive(Clone)]
pub struct ProfileStore {
    db_path: String,
}

impl ProfileStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .with_context(|| format!("Failed to open profile database at {}", self.db_path))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                name TEXT NOT NULL,
                image_url TEXT NOT NULL,
                is_child INTEGER NOT NULL DEFAULT 0,
                restrictions TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_profiles_account ON profiles(account_id);
            CREATE TABLE IF NOT EXISTS watchlist_items (
                profile_id TEXT NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                item_id TEXT NOT NULL,
                added_at TEXT NOT NULL,
                PRIMARY KEY (profile_id, item_id)
            );",
        )
        .context("Failed to initialise profile schema")?;

        Ok(())
    }

    /// Create a profile owned by `account_id`. `name` must already be validated.
    pub fn create_profile(
        &self,
        account_id: &Uuid,
        name: &str,
        request: &CreateProfileRequest,
    ) -> Result<Profile> {
        let now = Utc::now().to_rfc3339();
        let profile = Profile {
            id: Uuid::new_v4(),
            account_id: *account_id,
            name: name.to_string(),
            image_url: image_url_or_default(request.image_url.as_deref()),
            is_child: request.is_child,
            restrictions: dedup_restrictions(request.restrictions.clone()),
            watchlist: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        };

        let conn = self.connect()?;
        conn.execute(
            &format!(
                "INSERT INTO profiles ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                PROFILE_COLUMNS
            ),
            params![
                profile.id.to_string(),
                profile.account_id.to_string(),
                profile.name,
                profile.image_url,
                profile.is_child,
                serde_json::to_string(&profile.restrictions)?,
                profile.created_at,
                profile.updated_at,
            ],
        )
        .context("Failed to insert profile")?;

        info!(
            "✅ Created profile {} for account {}",
            profile.id, profile.account_id
        );
        Ok(profile)
    }

    pub fn get_profile(&self, id: &Uuid) -> Result<Option<Profile>> {
        let conn = self.connect()?;
        let profile = conn
            .query_row(
                &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
                params![id.to_string()],
                row_to_profile,
            )
            .optional()?;

        match profile {
            Some(mut profile) => {
                profile.watchlist = load_watchlist(&conn, &profile.id)?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    pub fn list_by_account(&self, account_id: &Uuid) -> Result<Vec<Profile>> {
        self.list_where("WHERE account_id = ?1", Some(account_id.to_string()))
    }

    /// All profiles (admin only)
    pub fn list_all(&self) -> Result<Vec<Profile>> {
        self.list_where("", None)
    }

    fn list_where(&self, clause: &str, key: Option<String>) -> Result<Vec<Profile>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM profiles {} ORDER BY created_at",
            PROFILE_COLUMNS, clause
        ))?;

        let mut profiles = match key {
            Some(key) => stmt.query_map(params![key], row_to_profile)?,
            None => stmt.query_map([], row_to_profile)?,
        }
        .collect::<Result<Vec<_>, _>>()?;

        for profile in &mut profiles {
            profile.watchlist = load_watchlist(&conn, &profile.id)?;
        }
        Ok(profiles)
    }

    /// Apply the present fields of `update`. `None` if the profile is gone.
    pub fn update_profile(
        &self,
        id: &Uuid,
        name: Option<&str>,
        update: &UpdateProfileRequest,
    ) -> Result<Option<Profile>> {
        let Some(mut profile) = self.get_profile(id)? else {
            return Ok(None);
        };

        if let Some(name) = name {
            profile.name = name.to_string();
        }
        if update.image_url.is_some() {
            profile.image_url = image_url_or_default(update.image_url.as_deref());
        }
        if let Some(is_child) = update.is_child {
            profile.is_child = is_child;
        }
        if let Some(restrictions) = &update.restrictions {
            profile.restrictions = dedup_restrictions(restrictions.clone());
        }
        profile.updated_at = Utc::now().to_rfc3339();

        let conn = self.connect()?;
        conn.execute(
            "UPDATE profiles
             SET name = ?1, image_url = ?2, is_child = ?3, restrictions = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                profile.name,
                profile.image_url,
                profile.is_child,
                serde_json::to_string(&profile.restrictions)?,
                profile.updated_at,
                profile.id.to_string(),
            ],
        )
        .context("Failed to update profile")?;

        Ok(Some(profile))
    }

    /// `false` if there was nothing to delete
    pub fn delete_profile(&self, id: &Uuid) -> Result<bool> {
        let conn = self.connect()?;
        let rows_affected = conn.execute(
            "DELETE FROM profiles WHERE id = ?1",
            params![id.to_string()],
        )?;

        if rows_affected > 0 {
            info!("🗑️  Deleted profile: {}", id);
        }
        Ok(rows_affected > 0)
    }

    /// Drop every profile of an account; watchlists cascade
    pub fn delete_by_account(&self, account_id: &Uuid) -> Result<usize> {
        let conn = self.connect()?;
        let rows_affected = conn
            .execute(
                "DELETE FROM profiles WHERE account_id = ?1",
                params![account_id.to_string()],
            )
            .context("Failed to delete account profiles")?;

        info!(
            "🗑️  Deleted {} profile(s) of account {}",
            rows_affected, account_id
        );
        Ok(rows_affected)
    }

    pub fn add_to_watchlist(&self, id: &Uuid, item_id: &str) -> Result<WatchlistAdd> {
        let conn = self.connect()?;
        if !profile_exists(&conn, id)? {
            return Ok(WatchlistAdd::ProfileNotFound);
        }

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO watchlist_items (profile_id, item_id, added_at)
             VALUES (?1, ?2, ?3)",
            params![id.to_string(), item_id, Utc::now().to_rfc3339()],
        )?;
        if inserted == 0 {
            return Ok(WatchlistAdd::AlreadyPresent);
        }

        debug!("Added {} to watchlist of profile {}", item_id, id);
        match self.get_profile(id)? {
            Some(profile) => Ok(WatchlistAdd::Added(profile)),
            None => Ok(WatchlistAdd::ProfileNotFound),
        }
    }

    /// Removing an absent item is not an error. `None` if the profile is gone.
    pub fn remove_from_watchlist(&self, id: &Uuid, item_id: &str) -> Result<Option<Profile>> {
        let conn = self.connect()?;
        if !profile_exists(&conn, id)? {
            return Ok(None);
        }

        conn.execute(
            "DELETE FROM watchlist_items WHERE profile_id = ?1 AND item_id = ?2",
            params![id.to_string(), item_id],
        )?;
        self.get_profile(id)
    }

    pub fn watchlist(&self, id: &Uuid) -> Result<Option<Vec<String>>> {
        let conn = self.connect()?;
        if !profile_exists(&conn, id)? {
            return Ok(None);
        }
        Ok(Some(load_watchlist(&conn, id)?))
    }

    /// Owning account of a profile
    pub fn owner_of_profile(&self, id: &Uuid) -> Result<Option<Uuid>> {
        let conn = self.connect()?;
        let owner: Option<String> = conn
            .query_row(
                "SELECT account_id FROM profiles WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        owner
            .map(|o| Uuid::parse_str(&o).context("Corrupt profile owner id"))
            .transpose()
    }
}

fn profile_exists(conn: &Connection, id: &Uuid) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM profiles WHERE id = ?1",
            params![id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn load_watchlist(conn: &Connection, id: &Uuid) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT item_id FROM watchlist_items WHERE profile_id = ?1 ORDER BY added_at, rowid",
    )?;
    let items = stmt
        .query_map(params![id.to_string()], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(items)
}

fn parse_uuid(idx: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    let id: String = row.get(0)?;
    let account_id: String = row.get(1)?;
    let restrictions: String = row.get(5)?;
    let restrictions: Vec<Restriction> = serde_json::from_str(&restrictions)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Profile {
        id: parse_uuid(0, &id)?,
        account_id: parse_uuid(1, &account_id)?,
        name: row.get(2)?,
        image_url: row.get(3)?,
        is_child: row.get(4)?,
        restrictions,
        watchlist: Vec::new(),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[async_trait]
impl OwnershipResolver for ProfileStore {
    async fn owner_of(&self, resource_id: &str) -> Result<Option<Uuid>> {
        // A malformed id names no profile
        let Ok(id) = Uuid::parse_str(resource_id) else {
            return Ok(None);
        };
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.owner_of_profile(&id))
            .await
            .context("Profile owner lookup task failed")?
    }
}

impl AccountCleanup for ProfileStore {
    fn purge_account(&self, account_id: &Uuid) -> Result<usize> {
        self.delete_by_account(account_id)
    }
}
