/// Database row types. These map directly to SQLite rows and stay distinct
/// from the wishlist-types models so the storage layer can evolve on its own.
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use wishlist_types::models::UserProfile;

use crate::StoreError;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

impl UserRow {
    pub fn user_id(&self) -> Result<Uuid, StoreError> {
        parse_id(&self.id)
    }

    pub fn profile(&self) -> Result<UserProfile, StoreError> {
        Ok(UserProfile {
            id: self.user_id()?,
            username: self.username.clone(),
            email: self.email.clone(),
        })
    }
}

/// A product about to be appended to a wishlist.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub image_url: String,
    pub price: f64,
    pub added_by: Uuid,
}

/// `id, username, email` columns of a joined `users` row.
pub(crate) struct ProfileRow {
    pub id: String,
    pub username: String,
    pub email: String,
}

impl ProfileRow {
    pub fn read(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            username: row.get(offset + 1)?,
            email: row.get(offset + 2)?,
        })
    }

    pub fn into_profile(self) -> Result<UserProfile, StoreError> {
        Ok(UserProfile {
            id: parse_id(&self.id)?,
            username: self.username,
            email: self.email,
        })
    }
}

pub(crate) struct WishlistRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub creator: ProfileRow,
}

pub(crate) struct ProductRow {
    pub id: String,
    pub name: String,
    pub image_url: String,
    pub price: f64,
    pub added_by: ProfileRow,
}

pub(crate) struct CommentRow {
    pub product_id: String,
    pub id: String,
    pub text: String,
    pub created_at: String,
    pub user: ProfileRow,
}

pub(crate) struct ReactionRow {
    pub product_id: String,
    pub emoji: String,
    pub user: ProfileRow,
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Corrupt(format!("id '{raw}': {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; it is UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}
