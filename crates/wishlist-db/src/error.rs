use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("wishlist not found")]
    WishlistNotFound,
    #[error("product not found")]
    ProductNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("user is already a member of this wishlist")]
    AlreadyMember,
    #[error("a user with that username or email already exists")]
    UserExists,
    #[error("database lock poisoned")]
    Poisoned,
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
