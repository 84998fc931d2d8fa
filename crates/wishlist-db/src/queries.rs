use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use wishlist_types::models::{Comment, Product, Reaction, Wishlist};

use crate::error::is_unique_violation;
use crate::models::{
    CommentRow, NewProduct, ProductRow, ProfileRow, ReactionRow, UserRow, WishlistRow, parse_id,
    parse_timestamp,
};
use crate::{Database, StoreError};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), username, email, password_hash],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::UserExists
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    // -- Wishlists --

    /// Creates a wishlist whose creator is also its first member.
    pub fn create_wishlist(
        &self,
        name: &str,
        description: Option<&str>,
        creator_id: Uuid,
    ) -> Result<Wishlist, StoreError> {
        let id = Uuid::new_v4().to_string();
        let creator = creator_id.to_string();

        self.with_tx(|tx| {
            ensure_user(tx, &creator)?;
            tx.execute(
                "INSERT INTO wishlists (id, name, description, creator_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, name, description, creator, Utc::now().to_rfc3339()],
            )?;
            tx.execute(
                "INSERT INTO wishlist_members (wishlist_id, user_id) VALUES (?1, ?2)",
                params![id, creator],
            )?;
            load_wishlist(tx, &id)
        })
    }

    pub fn get_wishlist(&self, id: Uuid) -> Result<Wishlist, StoreError> {
        self.with_conn(|conn| load_wishlist(conn, &id.to_string()))
    }

    /// Wishlists where `user_id` is a member, newest first.
    pub fn list_for_member(&self, user_id: Uuid) -> Result<Vec<Wishlist>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT w.id FROM wishlists w
                 JOIN wishlist_members m ON m.wishlist_id = w.id
                 WHERE m.user_id = ?1
                 ORDER BY w.created_at DESC, w.rowid DESC",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            ids.iter().map(|id| load_wishlist(conn, id)).collect()
        })
    }

    pub fn is_member(&self, wishlist_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM wishlist_members WHERE wishlist_id = ?1 AND user_id = ?2",
                    params![wishlist_id.to_string(), user_id.to_string()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Deletes the wishlist together with its members, products, comments and reactions.
    pub fn delete_wishlist(&self, id: Uuid) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            let removed = tx.execute("DELETE FROM wishlists WHERE id = ?1", [id.to_string()])?;
            if removed == 0 {
                return Err(StoreError::WishlistNotFound);
            }
            debug!("Deleted wishlist {}", id);
            Ok(())
        })
    }

    // -- Members --

    pub fn append_member(&self, wishlist_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let wid = wishlist_id.to_string();
        let uid = user_id.to_string();

        self.with_tx(|tx| {
            ensure_wishlist(tx, &wid)?;
            ensure_user(tx, &uid)?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO wishlist_members (wishlist_id, user_id) VALUES (?1, ?2)",
                params![wid, uid],
            )?;
            if inserted == 0 {
                return Err(StoreError::AlreadyMember);
            }
            Ok(())
        })
    }

    // -- Products --

    /// Appends a product and returns its new id.
    pub fn append_product(
        &self,
        wishlist_id: Uuid,
        product: &NewProduct,
    ) -> Result<Uuid, StoreError> {
        let wid = wishlist_id.to_string();
        let product_id = Uuid::new_v4();

        self.with_tx(|tx| {
            ensure_wishlist(tx, &wid)?;
            tx.execute(
                "INSERT INTO products (id, wishlist_id, name, image_url, price, added_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    product_id.to_string(),
                    wid,
                    product.name,
                    product.image_url,
                    product.price,
                    product.added_by.to_string()
                ],
            )?;
            Ok(product_id)
        })
    }

    /// Removes a product. A second removal of the same id reports `ProductNotFound`
    /// and leaves the wishlist untouched.
    pub fn remove_product(&self, wishlist_id: Uuid, product_id: Uuid) -> Result<(), StoreError> {
        let wid = wishlist_id.to_string();

        self.with_tx(|tx| {
            ensure_wishlist(tx, &wid)?;
            let removed = tx.execute(
                "DELETE FROM products WHERE id = ?1 AND wishlist_id = ?2",
                params![product_id.to_string(), wid],
            )?;
            if removed == 0 {
                return Err(StoreError::ProductNotFound);
            }
            Ok(())
        })
    }

    // -- Comments & reactions --

    pub fn append_comment(
        &self,
        wishlist_id: Uuid,
        product_id: Uuid,
        user_id: Uuid,
        text: &str,
    ) -> Result<Uuid, StoreError> {
        let comment_id = Uuid::new_v4();
        let pid = product_id.to_string();

        self.with_tx(|tx| {
            ensure_product(tx, &wishlist_id.to_string(), &pid)?;
            tx.execute(
                "INSERT INTO comments (id, product_id, user_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    comment_id.to_string(),
                    pid,
                    user_id.to_string(),
                    text,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(comment_id)
        })
    }

    /// Replaces the user's reaction on a product: drop any previous one, then append.
    /// The other reactions keep their order; the user's moves to the end.
    pub fn upsert_reaction(
        &self,
        wishlist_id: Uuid,
        product_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<(), StoreError> {
        let pid = product_id.to_string();
        let uid = user_id.to_string();

        self.with_tx(|tx| {
            ensure_product(tx, &wishlist_id.to_string(), &pid)?;
            tx.execute(
                "DELETE FROM reactions WHERE product_id = ?1 AND user_id = ?2",
                params![pid, uid],
            )?;
            tx.execute(
                "INSERT INTO reactions (product_id, user_id, emoji) VALUES (?1, ?2, ?3)",
                params![pid, uid, emoji],
            )?;
            Ok(())
        })
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>, StoreError> {
    let row = conn
        .query_row(
            "SELECT id, username, email, password, created_at FROM users WHERE email = ?1",
            [email],
            |row| {
                Ok(UserRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    password: row.get(3)?,
                    created_at: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn exists(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<bool, StoreError> {
    Ok(conn.query_row(sql, params, |_| Ok(())).optional()?.is_some())
}

fn ensure_user(conn: &Connection, id: &str) -> Result<(), StoreError> {
    if !exists(conn, "SELECT 1 FROM users WHERE id = ?1", [id])? {
        return Err(StoreError::UserNotFound);
    }
    Ok(())
}

fn ensure_wishlist(conn: &Connection, id: &str) -> Result<(), StoreError> {
    if !exists(conn, "SELECT 1 FROM wishlists WHERE id = ?1", [id])? {
        return Err(StoreError::WishlistNotFound);
    }
    Ok(())
}

fn ensure_product(conn: &Connection, wishlist_id: &str, product_id: &str) -> Result<(), StoreError> {
    ensure_wishlist(conn, wishlist_id)?;
    if !exists(
        conn,
        "SELECT 1 FROM products WHERE id = ?1 AND wishlist_id = ?2",
        [product_id, wishlist_id],
    )? {
        return Err(StoreError::ProductNotFound);
    }
    Ok(())
}

/// Reads one wishlist with every nested identity resolved to a profile.
fn load_wishlist(conn: &Connection, id: &str) -> Result<Wishlist, StoreError> {
    let head = conn
        .query_row(
            "SELECT w.id, w.name, w.description, w.created_at, u.id, u.username, u.email
             FROM wishlists w
             JOIN users u ON u.id = w.creator_id
             WHERE w.id = ?1",
            [id],
            |row| {
                Ok(WishlistRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                    creator: ProfileRow::read(row, 4)?,
                })
            },
        )
        .optional()?
        .ok_or(StoreError::WishlistNotFound)?;

    let members = conn
        .prepare(
            "SELECT u.id, u.username, u.email
             FROM wishlist_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.wishlist_id = ?1
             ORDER BY m.seq",
        )?
        .query_map([id], |row| ProfileRow::read(row, 0))?
        .collect::<Result<Vec<_>, _>>()?;

    let product_rows = conn
        .prepare(
            "SELECT p.id, p.name, p.image_url, p.price, u.id, u.username, u.email
             FROM products p
             JOIN users u ON u.id = p.added_by
             WHERE p.wishlist_id = ?1
             ORDER BY p.seq",
        )?
        .query_map([id], |row| {
            Ok(ProductRow {
                id: row.get(0)?,
                name: row.get(1)?,
                image_url: row.get(2)?,
                price: row.get(3)?,
                added_by: ProfileRow::read(row, 4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let comment_rows = conn
        .prepare(
            "SELECT c.product_id, c.id, c.text, c.created_at, u.id, u.username, u.email
             FROM comments c
             JOIN products p ON p.id = c.product_id
             JOIN users u ON u.id = c.user_id
             WHERE p.wishlist_id = ?1
             ORDER BY c.seq",
        )?
        .query_map([id], |row| {
            Ok(CommentRow {
                product_id: row.get(0)?,
                id: row.get(1)?,
                text: row.get(2)?,
                created_at: row.get(3)?,
                user: ProfileRow::read(row, 4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let reaction_rows = conn
        .prepare(
            "SELECT r.product_id, r.emoji, u.id, u.username, u.email
             FROM reactions r
             JOIN products p ON p.id = r.product_id
             JOIN users u ON u.id = r.user_id
             WHERE p.wishlist_id = ?1
             ORDER BY r.seq",
        )?
        .query_map([id], |row| {
            Ok(ReactionRow {
                product_id: row.get(0)?,
                emoji: row.get(1)?,
                user: ProfileRow::read(row, 2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    // Group children by product_id (rows are already in seq order)
    let mut comments: HashMap<String, Vec<Comment>> = HashMap::new();
    for row in comment_rows {
        comments.entry(row.product_id).or_default().push(Comment {
            id: parse_id(&row.id)?,
            text: row.text,
            user: row.user.into_profile()?,
            created_at: parse_timestamp(&row.created_at)?,
        });
    }

    let mut reactions: HashMap<String, Vec<Reaction>> = HashMap::new();
    for row in reaction_rows {
        reactions.entry(row.product_id).or_default().push(Reaction {
            emoji: row.emoji,
            user: row.user.into_profile()?,
        });
    }

    let products = product_rows
        .into_iter()
        .map(|row| {
            Ok(Product {
                id: parse_id(&row.id)?,
                comments: comments.remove(&row.id).unwrap_or_default(),
                reactions: reactions.remove(&row.id).unwrap_or_default(),
                name: row.name,
                image_url: row.image_url,
                price: row.price,
                added_by: row.added_by.into_profile()?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(Wishlist {
        id: parse_id(&head.id)?,
        name: head.name,
        description: head.description,
        creator: head.creator.into_profile()?,
        members: members
            .into_iter()
            .map(ProfileRow::into_profile)
            .collect::<Result<_, _>>()?,
        products,
        created_at: parse_timestamp(&head.created_at)?,
    })
}
