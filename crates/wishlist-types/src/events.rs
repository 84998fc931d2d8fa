use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Product, UserProfile};

/// Events pushed from the server to clients over the websocket gateway.
///
/// Receivers treat every room event as a hint to merge or re-fetch; the
/// store stays authoritative and no ordering across events is promised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum RoomEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, username: String },

    /// Another viewer asked everyone in the room to re-fetch
    RefreshWishlist { wishlist_id: Uuid },

    ProductAdded { wishlist_id: Uuid, product: Product },

    ProductDeleted { wishlist_id: Uuid, product_id: Uuid },

    MemberAdded { wishlist_id: Uuid, member: UserProfile },

    /// Generic change (comments, reactions)
    WishlistUpdated { wishlist_id: Uuid },

    WishlistDeleted { wishlist_id: Uuid },
}

impl RoomEvent {
    /// Returns the room this event belongs to. `Ready` is connection-scoped.
    pub fn wishlist_id(&self) -> Option<Uuid> {
        match self {
            Self::Ready { .. } => None,
            Self::RefreshWishlist { wishlist_id }
            | Self::ProductAdded { wishlist_id, .. }
            | Self::ProductDeleted { wishlist_id, .. }
            | Self::MemberAdded { wishlist_id, .. }
            | Self::WishlistUpdated { wishlist_id }
            | Self::WishlistDeleted { wishlist_id } => Some(*wishlist_id),
        }
    }
}

/// Commands sent FROM client TO server over the websocket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum RoomCommand {
    /// Authenticate the websocket connection
    Identify { token: String },

    /// Start receiving events for a wishlist the caller is viewing
    JoinWishlist { wishlist_id: Uuid },

    LeaveWishlist { wishlist_id: Uuid },

    /// Manual refresh trigger; peers in the room get `refresh-wishlist`
    WishlistUpdated { wishlist_id: Uuid },
}
