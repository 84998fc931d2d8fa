use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display attributes of a user, resolved from the user directory.
/// Every identity embedded in a wishlist view carries these so clients never
/// need a second round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// Fully populated wishlist as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wishlist {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub creator: UserProfile,
    pub members: Vec<UserProfile>,
    pub products: Vec<Product>,
    pub created_at: DateTime<Utc>,
}

impl Wishlist {
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.iter().any(|m| m.id == user_id)
    }

    pub fn is_creator(&self, user_id: Uuid) -> bool {
        self.creator.id == user_id
    }

    pub fn product(&self, product_id: Uuid) -> Option<&Product> {
        self.products.iter().find(|p| p.id == product_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub price: f64,
    pub added_by: UserProfile,
    pub comments: Vec<Comment>,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub text: String,
    pub user: UserProfile,
    pub created_at: DateTime<Utc>,
}

/// At most one per (product, user); a newer reaction replaces the older one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub user: UserProfile,
}
