use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use wishlist_types::identity::{IdentityVerifier, bearer_token};

use crate::AppState;
use crate::error::ApiError;

/// Verify the bearer credential from the Authorization header and expose the
/// caller as an `Identity` extension. Runs before any policy check.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = bearer_token(auth_header)?;
    let identity = state.jwt.verify(token)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
