pub mod cache;
pub mod http;

pub use cache::WishlistCache;
pub use http::{ClientError, WishlistClient};
