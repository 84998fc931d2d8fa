use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Products, comments and reactions are owned children of a wishlist:
/// deleting the wishlist cascades through all of them. `seq` keeps
/// insertion order for the nested sequences.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS wishlists (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL CHECK (length(trim(name)) > 0),
            description TEXT,
            creator_id  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS wishlist_members (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            wishlist_id TEXT NOT NULL REFERENCES wishlists(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            UNIQUE(wishlist_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_members_user
            ON wishlist_members(user_id);

        CREATE TABLE IF NOT EXISTS products (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            wishlist_id TEXT NOT NULL REFERENCES wishlists(id) ON DELETE CASCADE,
            name        TEXT NOT NULL CHECK (length(trim(name)) > 0),
            image_url   TEXT NOT NULL,
            price       REAL NOT NULL CHECK (price >= 0),
            added_by    TEXT NOT NULL REFERENCES users(id)
        );

        CREATE INDEX IF NOT EXISTS idx_products_wishlist
            ON products(wishlist_id, seq);

        CREATE TABLE IF NOT EXISTS comments (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            product_id  TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_comments_product
            ON comments(product_id, seq);

        CREATE TABLE IF NOT EXISTS reactions (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id  TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            emoji       TEXT NOT NULL,
            UNIQUE(product_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_product
            ON reactions(product_id, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
