use std::collections::HashMap;

use uuid::Uuid;

use wishlist_types::events::RoomEvent;
use wishlist_types::models::Wishlist;

struct Entry {
    wishlist: Wishlist,
    stale: bool,
}

/// Local read-through cache of wishlists keyed by id.
///
/// Never authoritative: room events merge optimistically into a cached entry
/// but always mark it stale, so the next read goes back to the server.
#[derive(Default)]
pub struct WishlistCache {
    entries: HashMap<Uuid, Entry>,
}

impl WishlistCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh entry, if any. Stale entries are not served.
    pub fn get(&self, id: Uuid) -> Option<&Wishlist> {
        self.entries
            .get(&id)
            .filter(|entry| !entry.stale)
            .map(|entry| &entry.wishlist)
    }

    /// The entry regardless of freshness, e.g. for optimistic display.
    pub fn peek(&self, id: Uuid) -> Option<&Wishlist> {
        self.entries.get(&id).map(|entry| &entry.wishlist)
    }

    pub fn is_stale(&self, id: Uuid) -> bool {
        self.entries.get(&id).is_some_and(|entry| entry.stale)
    }

    pub fn insert(&mut self, wishlist: Wishlist) {
        self.entries.insert(
            wishlist.id,
            Entry {
                wishlist,
                stale: false,
            },
        );
    }

    pub fn invalidate(&mut self, id: Uuid) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.stale = true;
        }
    }

    pub fn evict(&mut self, id: Uuid) {
        self.entries.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn apply(&mut self, event: &RoomEvent) {
        let Some(wishlist_id) = event.wishlist_id() else {
            return;
        };
        if let RoomEvent::WishlistDeleted { .. } = event {
            self.evict(wishlist_id);
            return;
        }
        let Some(entry) = self.entries.get_mut(&wishlist_id) else {
            return;
        };

        let wishlist = &mut entry.wishlist;
        match event {
            RoomEvent::ProductAdded { product, .. } => {
                if wishlist.product(product.id).is_none() {
                    wishlist.products.push(product.clone());
                }
            }
            RoomEvent::ProductDeleted { product_id, .. } => {
                wishlist.products.retain(|p| p.id != *product_id);
            }
            RoomEvent::MemberAdded { member, .. } => {
                if !wishlist.is_member(member.id) {
                    wishlist.members.push(member.clone());
                }
            }
            _ => {}
        }
        entry.stale = true;
    }
}
