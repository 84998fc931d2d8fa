use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use uuid::Uuid;

use wishlist_types::api::{AuthResponse, LoginRequest, RegisterRequest};

use crate::AppState;
use crate::error::ApiError;

const BAD_CREDENTIALS: &str = "Invalid email or password";

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let req = req.validate()?;

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();

    let user_id = Uuid::new_v4();
    let (username, email) = (req.username.clone(), req.email.clone());
    state
        .service
        .store(move |db| db.create_user(user_id, &username, &email, &password_hash))
        .await?;

    let token = state.jwt.issue(user_id, &req.username)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            username: req.username,
            email: req.email,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let email = req.email.trim().to_lowercase();

    let user = state
        .service
        .store(move |db| db.user_by_email(&email))
        .await?
        .ok_or_else(|| ApiError::Unauthenticated(BAD_CREDENTIALS.into()))?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored hash for {} unreadable: {e}", user.id))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthenticated(BAD_CREDENTIALS.into()))?;

    let user_id = user.user_id()?;
    let token = state.jwt.issue(user_id, &user.username)?;

    Ok(Json(AuthResponse {
        user_id,
        username: user.username,
        email: user.email,
        token,
    }))
}
