pub mod auth;
pub mod error;
pub mod middleware;
pub mod notifier;
pub mod policy;
pub mod routes;
pub mod service;
pub mod wishlists;

use std::sync::Arc;

use wishlist_types::identity::JwtVerifier;

use crate::service::WishlistService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub service: WishlistService,
    pub jwt: Arc<JwtVerifier>,
}
