//! Profile Models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_IMAGE_URL: &str = "/images/profiles/default-profile.png";
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 30;

/// Viewing profile under an account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,
    /// Owning account, fixed at creation
    pub account_id: Uuid,
    pub name: String,
    pub image_url: String,
    pub is_child: bool,
    pub restrictions: Vec<Restriction>,
    pub watchlist: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Content a profile is shielded from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Restriction {
    Violence,
    Nudity,
    Language,
}

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(default, alias = "isChild")]
    pub is_child: bool,
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    #[serde(alias = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(alias = "isChild")]
    pub is_child: Option<bool>,
    pub restrictions: Option<Vec<Restriction>>,
}

#[derive(Debug, Deserialize)]
pub struct WatchlistAddRequest {
    #[serde(default, alias = "movieId")]
    pub item_id: String,
}

/// Trim a profile name and check its length
pub fn validate_name(name: &str) -> Option<String> {
    let name = name.trim();
    let len = name.chars().count();
    (NAME_MIN_LEN..=NAME_MAX_LEN)
        .contains(&len)
        .then(|| name.to_string())
}

/// Empty or blank image URLs fall back to the default picture
pub fn image_url_or_default(image_url: Option<&str>) -> String {
    match image_url.map(str::trim) {
        Some(url) if !url.is_empty() => url.to_string(),
        _ => DEFAULT_IMAGE_URL.to_string(),
    }
}

/// Sorted, without repeats
pub fn dedup_restrictions(mut restrictions: Vec<Restriction>) -> Vec<Restriction> {
    restrictions.sort_by_key(|r| *r as u8);
    restrictions.dedup();
    restrictions
}
