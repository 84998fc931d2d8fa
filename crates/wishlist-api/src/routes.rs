use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::middleware::require_auth;
use crate::{AppState, auth, wishlists};

/// Public auth routes plus the bearer-protected wishlist surface.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/wishlists", get(wishlists::list).post(wishlists::create))
        .route("/wishlists/{id}", get(wishlists::get).delete(wishlists::delete))
        .route("/wishlists/{id}/products", post(wishlists::add_product))
        .route("/wishlists/{id}/members", post(wishlists::add_member))
        .route("/wishlists/{id}/products/{product_id}", delete(wishlists::delete_product))
        .route(
            "/wishlists/{id}/products/{product_id}/comments",
            post(wishlists::add_comment),
        )
        .route(
            "/wishlists/{id}/products/{product_id}/reactions",
            post(wishlists::react),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
