use std::sync::{Mutex, MutexGuard};

use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use wishlist_types::api::{
    AddCommentRequest, AddMemberRequest, AddMemberResponse, AddProductRequest, AuthResponse,
    CreateWishlistRequest, MessageResponse, ReactRequest,
};
use wishlist_types::events::RoomEvent;
use wishlist_types::models::Wishlist;

use crate::cache::WishlistCache;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Typed HTTP client for the wishlist API with a local read-through cache.
/// Every successful response that carries a wishlist refreshes the cache.
pub struct WishlistClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    cache: Mutex<WishlistCache>,
}

impl WishlistClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            cache: Mutex::new(WishlistCache::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, WishlistCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let message = resp
            .json::<MessageResponse>()
            .await
            .map(|body| body.message)
            .unwrap_or_else(|_| status.to_string());
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn remember(&self, wishlist: Wishlist) -> Wishlist {
        self.cache().insert(wishlist.clone());
        wishlist
    }

    // -- Auth --

    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ClientError> {
        let req = self
            .request(Method::POST, "/auth/register")
            .json(&json!({ "username": username, "email": email, "password": password }));
        let auth: AuthResponse = self.send(req).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let req = self
            .request(Method::POST, "/auth/login")
            .json(&json!({ "email": email, "password": password }));
        let auth: AuthResponse = self.send(req).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    // -- Wishlists --

    pub async fn create_wishlist(&self, req: &CreateWishlistRequest) -> Result<Wishlist, ClientError> {
        let wishlist = self
            .send(self.request(Method::POST, "/wishlists").json(req))
            .await?;
        Ok(self.remember(wishlist))
    }

    pub async fn list_wishlists(&self) -> Result<Vec<Wishlist>, ClientError> {
        let wishlists: Vec<Wishlist> = self.send(self.request(Method::GET, "/wishlists")).await?;
        let mut cache = self.cache();
        for wishlist in &wishlists {
            cache.insert(wishlist.clone());
        }
        Ok(wishlists)
    }

    /// Always asks the server.
    pub async fn get_wishlist(&self, id: Uuid) -> Result<Wishlist, ClientError> {
        let wishlist = self
            .send(self.request(Method::GET, &format!("/wishlists/{id}")))
            .await?;
        Ok(self.remember(wishlist))
    }

    /// Serves a fresh cache entry, otherwise fetches and caches.
    pub async fn get_cached(&self, id: Uuid) -> Result<Wishlist, ClientError> {
        if let Some(wishlist) = self.cache().get(id).cloned() {
            return Ok(wishlist);
        }
        debug!("Cache miss for wishlist {}", id);
        self.get_wishlist(id).await
    }

    pub async fn delete_wishlist(&self, id: Uuid) -> Result<MessageResponse, ClientError> {
        let resp = self
            .send(self.request(Method::DELETE, &format!("/wishlists/{id}")))
            .await?;
        self.cache().evict(id);
        Ok(resp)
    }

    pub async fn add_product(&self, id: Uuid, req: &AddProductRequest) -> Result<Wishlist, ClientError> {
        let wishlist = self
            .send(self.request(Method::POST, &format!("/wishlists/{id}/products")).json(req))
            .await?;
        Ok(self.remember(wishlist))
    }

    pub async fn add_member(&self, id: Uuid, req: &AddMemberRequest) -> Result<AddMemberResponse, ClientError> {
        let resp: AddMemberResponse = self
            .send(self.request(Method::POST, &format!("/wishlists/{id}/members")).json(req))
            .await?;
        self.cache().insert(resp.wishlist.clone());
        Ok(resp)
    }

    pub async fn delete_product(&self, id: Uuid, product_id: Uuid) -> Result<Wishlist, ClientError> {
        let wishlist = self
            .send(self.request(Method::DELETE, &format!("/wishlists/{id}/products/{product_id}")))
            .await?;
        Ok(self.remember(wishlist))
    }

    pub async fn add_comment(
        &self,
        id: Uuid,
        product_id: Uuid,
        req: &AddCommentRequest,
    ) -> Result<Wishlist, ClientError> {
        let path = format!("/wishlists/{id}/products/{product_id}/comments");
        let wishlist = self.send(self.request(Method::POST, &path).json(req)).await?;
        Ok(self.remember(wishlist))
    }

    pub async fn react(&self, id: Uuid, product_id: Uuid, req: &ReactRequest) -> Result<Wishlist, ClientError> {
        let path = format!("/wishlists/{id}/products/{product_id}/reactions");
        let wishlist = self.send(self.request(Method::POST, &path).json(req)).await?;
        Ok(self.remember(wishlist))
    }

    /// Feed a room event received over the gateway into the cache.
    pub fn apply_event(&self, event: &RoomEvent) {
        self.cache().apply(event);
    }

    pub fn is_cached_fresh(&self, id: Uuid) -> bool {
        self.cache().get(id).is_some()
    }
}
