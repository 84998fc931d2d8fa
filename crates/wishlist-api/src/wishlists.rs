use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use wishlist_types::api::{
    AddCommentRequest, AddMemberRequest, AddProductRequest, CreateWishlistRequest, ReactRequest,
};
use wishlist_types::identity::Identity;

use crate::AppState;
use crate::error::ApiError;

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    payload: Result<Json<CreateWishlistRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let wishlist = state.service.create_wishlist(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(wishlist)))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.list_wishlists(&caller).await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.get_wishlist(&caller, id).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.delete_wishlist(&caller, id).await?))
}

pub async fn add_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Identity>,
    payload: Result<Json<AddProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    Ok(Json(state.service.add_product(&caller, id, req).await?))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(caller): Extension<Identity>,
    payload: Result<Json<AddMemberRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    Ok(Json(state.service.add_member(&caller, id, req).await?))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
    Extension(caller): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.delete_product(&caller, id, product_id).await?))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
    Extension(caller): Extension<Identity>,
    payload: Result<Json<AddCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    Ok(Json(state.service.add_comment(&caller, id, product_id, req).await?))
}

pub async fn react(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(Uuid, Uuid)>,
    Extension(caller): Extension<Identity>,
    payload: Result<Json<ReactRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    Ok(Json(state.service.react(&caller, id, product_id, req).await?))
}
