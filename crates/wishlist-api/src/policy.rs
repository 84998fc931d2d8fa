//! Membership and authorization rules. Pure functions over a wishlist
//! snapshot and the caller id; callers must pass a freshly fetched wishlist.

use uuid::Uuid;

use wishlist_types::models::{Product, Wishlist};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }

    /// A denial is always a distinct `Forbidden`, never silent success.
    pub fn into_result(self) -> Result<(), ApiError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(ApiError::Forbidden(reason.to_string())),
        }
    }
}

fn member(wishlist: &Wishlist, caller: Uuid, reason: &'static str) -> Decision {
    if wishlist.is_member(caller) {
        Decision::Allow
    } else {
        Decision::Deny(reason)
    }
}

pub fn can_view(wishlist: &Wishlist, caller: Uuid) -> Decision {
    member(wishlist, caller, "Not authorized to view this wishlist")
}

pub fn can_add_product(wishlist: &Wishlist, caller: Uuid) -> Decision {
    member(wishlist, caller, "Not authorized to add to this wishlist")
}

/// Only the creator invites.
pub fn can_add_member(wishlist: &Wishlist, caller: Uuid) -> Decision {
    if wishlist.is_member(caller) && wishlist.is_creator(caller) {
        Decision::Allow
    } else {
        Decision::Deny("Only the creator can add members")
    }
}

pub fn can_delete_wishlist(wishlist: &Wishlist, caller: Uuid) -> Decision {
    if wishlist.is_creator(caller) {
        Decision::Allow
    } else {
        Decision::Deny("Only the creator can delete this wishlist")
    }
}

/// The wishlist creator or whoever added the product.
pub fn can_delete_product(wishlist: &Wishlist, product: &Product, caller: Uuid) -> Decision {
    if !wishlist.is_member(caller) {
        return Decision::Deny("Not authorized to modify this wishlist");
    }
    if wishlist.is_creator(caller) || product.added_by.id == caller {
        Decision::Allow
    } else {
        Decision::Deny("Not authorized to delete this product")
    }
}

// Any member may comment on or react to any product.

pub fn can_comment(wishlist: &Wishlist, caller: Uuid) -> Decision {
    member(wishlist, caller, "Not authorized to comment on this wishlist")
}

pub fn can_react(wishlist: &Wishlist, caller: Uuid) -> Decision {
    member(wishlist, caller, "Not authorized to react on this wishlist")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wishlist_types::models::UserProfile;

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            username: name.into(),
            email: format!("{name}@example.com"),
        }
    }

    fn product(added_by: &UserProfile) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: "Lamp".into(),
            image_url: "http://img".into(),
            price: 29.99,
            added_by: added_by.clone(),
            comments: vec![],
            reactions: vec![],
        }
    }

    /// creator X, members X, Y, Z; outsider O. Y added the only product.
    fn fixture() -> (Wishlist, [UserProfile; 4]) {
        let [x, y, z, o] = ["x", "y", "z", "o"].map(profile);
        let wishlist = Wishlist {
            id: Uuid::new_v4(),
            name: "Birthday".into(),
            description: None,
            creator: x.clone(),
            members: vec![x.clone(), y.clone(), z.clone()],
            products: vec![product(&y)],
            created_at: Utc::now(),
        };
        (wishlist, [x, y, z, o])
    }

    #[test]
    fn members_view_and_add_outsiders_do_not() {
        let (w, [x, y, _, o]) = fixture();
        assert!(can_view(&w, x.id).is_allowed());
        assert!(can_view(&w, y.id).is_allowed());
        assert!(can_add_product(&w, y.id).is_allowed());
        assert!(can_comment(&w, y.id).is_allowed());
        assert!(can_react(&w, y.id).is_allowed());

        assert!(!can_view(&w, o.id).is_allowed());
        assert!(!can_add_product(&w, o.id).is_allowed());
        assert!(!can_comment(&w, o.id).is_allowed());
        assert!(!can_react(&w, o.id).is_allowed());
    }

    #[test]
    fn only_creator_invites_and_deletes_wishlist() {
        let (w, [x, y, _, o]) = fixture();
        assert!(can_add_member(&w, x.id).is_allowed());
        assert_eq!(can_add_member(&w, y.id), Decision::Deny("Only the creator can add members"));
        assert!(!can_add_member(&w, o.id).is_allowed());

        assert!(can_delete_wishlist(&w, x.id).is_allowed());
        assert!(!can_delete_wishlist(&w, y.id).is_allowed());
    }

    #[test]
    fn product_deletion_is_creator_or_adder() {
        let (w, [x, y, z, o]) = fixture();
        let p = &w.products[0];
        assert!(can_delete_product(&w, p, x.id).is_allowed());
        assert!(can_delete_product(&w, p, y.id).is_allowed());
        assert_eq!(
            can_delete_product(&w, p, z.id),
            Decision::Deny("Not authorized to delete this product")
        );
        assert_eq!(
            can_delete_product(&w, p, o.id),
            Decision::Deny("Not authorized to modify this wishlist")
        );
    }

    #[test]
    fn deny_maps_to_forbidden() {
        let err = Decision::Deny("nope").into_result().unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(ref m) if m == "nope"));
        assert!(Decision::Allow.into_result().is_ok());
    }
}
