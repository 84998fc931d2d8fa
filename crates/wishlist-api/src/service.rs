use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use wishlist_db::{Database, NewProduct, StoreError};
use wishlist_gateway::Dispatcher;
use wishlist_types::api::{
    AddCommentRequest, AddMemberRequest, AddMemberResponse, AddProductRequest,
    CreateWishlistRequest, MessageResponse, ReactRequest,
};
use wishlist_types::events::RoomEvent;
use wishlist_types::identity::Identity;
use wishlist_types::models::Wishlist;

use crate::error::ApiError;
use crate::notifier::{Invitation, InvitationNotifier};
use crate::policy;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the web app; invitation links point at `{app_url}/wishlist/{id}`.
    pub app_url: String,
    /// Upper bound on a single store call.
    pub store_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:5173".into(),
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// What the room hears about a write that committed after its request
/// already timed out.
struct LateCommit {
    event: RoomEvent,
    invitation: Option<Invitation>,
}

impl LateCommit {
    fn event(event: RoomEvent) -> Self {
        Self {
            event,
            invitation: None,
        }
    }

    fn updated(wishlist_id: Uuid) -> Self {
        Self::event(RoomEvent::WishlistUpdated { wishlist_id })
    }
}

/// Application-level wishlist operations.
///
/// Every mutation follows the same shape: fetch the current wishlist, run the
/// policy against that snapshot, apply one atomic store write, re-fetch the
/// populated wishlist and only then notify the room. Requests against the same
/// wishlist are not serialized against each other.
#[derive(Clone)]
pub struct WishlistService {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    notifier: Arc<dyn InvitationNotifier>,
    config: ServiceConfig,
}

impl WishlistService {
    pub fn new(
        db: Arc<Database>,
        dispatcher: Dispatcher,
        notifier: Arc<dyn InvitationNotifier>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            db,
            dispatcher,
            notifier,
            config,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn spawn_store<F, T>(&self, f: F) -> JoinHandle<Result<T, StoreError>>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
    }

    fn joined<T>(joined: Result<Result<T, StoreError>, JoinError>) -> Result<T, ApiError> {
        match joined {
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                Err(ApiError::Internal(anyhow!("store task failed: {e}")))
            }
            Ok(result) => Ok(result?),
        }
    }

    /// Runs a store call on the blocking pool, bounded by the store timeout.
    /// A timed-out read is not aborted; its result is discarded.
    pub async fn store<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::time::timeout(self.config.store_timeout, self.spawn_store(f)).await {
            Err(_) => Err(ApiError::Timeout),
            Ok(joined) => Self::joined(joined),
        }
    }

    /// Like `store`, for a write to one wishlist. If the write outlives the
    /// timeout the caller still gets `Timeout`, but the write keeps running
    /// and `late` is delivered to the room once it commits.
    async fn write<F, T>(&self, wishlist_id: Uuid, f: F, late: LateCommit) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let mut task = self.spawn_store(f);
        match tokio::time::timeout(self.config.store_timeout, &mut task).await {
            Ok(joined) => Self::joined(joined),
            Err(_) => {
                warn!("Write to wishlist {} exceeded the store timeout", wishlist_id);
                let service = self.clone();
                tokio::spawn(async move {
                    match task.await {
                        Ok(Ok(_)) => service.announce_late(wishlist_id, late).await,
                        Ok(Err(e)) => debug!("Late write to {} failed: {}", wishlist_id, e),
                        Err(e) => error!("spawn_blocking join error: {}", e),
                    }
                });
                Err(ApiError::Timeout)
            }
        }
    }

    async fn announce_late(&self, wishlist_id: Uuid, late: LateCommit) {
        info!("Write to wishlist {} committed after its request timed out", wishlist_id);
        let closes_room = matches!(late.event, RoomEvent::WishlistDeleted { .. });
        self.dispatcher.broadcast(wishlist_id, late.event).await;
        if closes_room {
            self.dispatcher.close_room(wishlist_id).await;
        }
        if let Some(invitation) = late.invitation {
            self.send_invitation(invitation);
        }
    }

    async fn fetch(&self, wishlist_id: Uuid) -> Result<Wishlist, ApiError> {
        self.store(move |db| db.get_wishlist(wishlist_id)).await
    }

    pub async fn create_wishlist(
        &self,
        caller: &Identity,
        req: CreateWishlistRequest,
    ) -> Result<Wishlist, ApiError> {
        let req = req.validate()?;
        let creator = caller.user_id;
        let wishlist = self
            .store(move |db| db.create_wishlist(&req.name, req.description.as_deref(), creator))
            .await?;
        info!("{} created wishlist {} ({})", caller.username, wishlist.name, wishlist.id);
        Ok(wishlist)
    }

    pub async fn list_wishlists(&self, caller: &Identity) -> Result<Vec<Wishlist>, ApiError> {
        let user_id = caller.user_id;
        self.store(move |db| db.list_for_member(user_id)).await
    }

    pub async fn get_wishlist(&self, caller: &Identity, wishlist_id: Uuid) -> Result<Wishlist, ApiError> {
        let wishlist = self.fetch(wishlist_id).await?;
        policy::can_view(&wishlist, caller.user_id).into_result()?;
        Ok(wishlist)
    }

    pub async fn add_product(
        &self,
        caller: &Identity,
        wishlist_id: Uuid,
        req: AddProductRequest,
    ) -> Result<Wishlist, ApiError> {
        let req = req.validate()?;
        let wishlist = self.fetch(wishlist_id).await?;
        policy::can_add_product(&wishlist, caller.user_id).into_result()?;

        let new_product = NewProduct {
            name: req.name,
            image_url: req.image_url,
            price: req.price,
            added_by: caller.user_id,
        };
        let product_id = self
            .write(
                wishlist_id,
                move |db| db.append_product(wishlist_id, &new_product),
                LateCommit::updated(wishlist_id),
            )
            .await?;

        let wishlist = self.fetch(wishlist_id).await?;
        if let Some(product) = wishlist.product(product_id) {
            self.dispatcher
                .broadcast(
                    wishlist_id,
                    RoomEvent::ProductAdded {
                        wishlist_id,
                        product: product.clone(),
                    },
                )
                .await;
        }
        debug!("{} added product {} to {}", caller.username, product_id, wishlist_id);
        Ok(wishlist)
    }

    /// Adds a registered user by email. The invitation email goes out on a
    /// detached task; its failure never undoes the membership.
    pub async fn add_member(
        &self,
        caller: &Identity,
        wishlist_id: Uuid,
        req: AddMemberRequest,
    ) -> Result<AddMemberResponse, ApiError> {
        let req = req.validate()?;
        let wishlist = self.fetch(wishlist_id).await?;
        policy::can_add_member(&wishlist, caller.user_id).into_result()?;

        let email = req.email.clone();
        let invitee = self
            .store(move |db| db.user_by_email(&email))
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(
                    "User not found. Please make sure the user is registered.".into(),
                )
            })?
            .profile()?;

        if wishlist.is_member(invitee.id) {
            return Err(StoreError::AlreadyMember.into());
        }

        let invitation = Invitation {
            to_email: invitee.email.clone(),
            wishlist_name: wishlist.name.clone(),
            inviter_name: caller.username.clone(),
            join_link: format!("{}/wishlist/{}", self.config.app_url.trim_end_matches('/'), wishlist_id),
        };

        let invitee_id = invitee.id;
        self.write(
            wishlist_id,
            move |db| db.append_member(wishlist_id, invitee_id),
            LateCommit {
                event: RoomEvent::WishlistUpdated { wishlist_id },
                invitation: Some(invitation.clone()),
            },
        )
        .await?;

        let wishlist = self.fetch(wishlist_id).await?;
        self.dispatcher
            .broadcast(
                wishlist_id,
                RoomEvent::MemberAdded {
                    wishlist_id,
                    member: invitee.clone(),
                },
            )
            .await;
        info!("{} added {} to wishlist {}", caller.username, invitee.username, wishlist_id);

        self.send_invitation(invitation);

        Ok(AddMemberResponse {
            wishlist,
            message: "Member added successfully".into(),
        })
    }

    fn send_invitation(&self, invitation: Invitation) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if !notifier.notify(&invitation).await {
                warn!("Invitation to {} could not be delivered", invitation.to_email);
            }
        });
    }

    pub async fn add_comment(
        &self,
        caller: &Identity,
        wishlist_id: Uuid,
        product_id: Uuid,
        req: AddCommentRequest,
    ) -> Result<Wishlist, ApiError> {
        let req = req.validate()?;
        let wishlist = self.fetch(wishlist_id).await?;
        policy::can_comment(&wishlist, caller.user_id).into_result()?;

        let user_id = caller.user_id;
        self.write(
            wishlist_id,
            move |db| db.append_comment(wishlist_id, product_id, user_id, &req.text),
            LateCommit::updated(wishlist_id),
        )
        .await?;

        self.refetch_and_announce(wishlist_id).await
    }

    /// Sets the caller's reaction on a product, replacing any earlier one.
    pub async fn react(
        &self,
        caller: &Identity,
        wishlist_id: Uuid,
        product_id: Uuid,
        req: ReactRequest,
    ) -> Result<Wishlist, ApiError> {
        let req = req.validate()?;
        let wishlist = self.fetch(wishlist_id).await?;
        policy::can_react(&wishlist, caller.user_id).into_result()?;

        let user_id = caller.user_id;
        self.write(
            wishlist_id,
            move |db| db.upsert_reaction(wishlist_id, product_id, user_id, &req.emoji),
            LateCommit::updated(wishlist_id),
        )
        .await?;

        self.refetch_and_announce(wishlist_id).await
    }

    async fn refetch_and_announce(&self, wishlist_id: Uuid) -> Result<Wishlist, ApiError> {
        let wishlist = self.fetch(wishlist_id).await?;
        self.dispatcher
            .broadcast(wishlist_id, RoomEvent::WishlistUpdated { wishlist_id })
            .await;
        Ok(wishlist)
    }

    pub async fn delete_wishlist(
        &self,
        caller: &Identity,
        wishlist_id: Uuid,
    ) -> Result<MessageResponse, ApiError> {
        let wishlist = self.fetch(wishlist_id).await?;
        policy::can_delete_wishlist(&wishlist, caller.user_id).into_result()?;

        self.write(
            wishlist_id,
            move |db| db.delete_wishlist(wishlist_id),
            LateCommit::event(RoomEvent::WishlistDeleted { wishlist_id }),
        )
        .await?;

        self.dispatcher
            .broadcast(wishlist_id, RoomEvent::WishlistDeleted { wishlist_id })
            .await;
        self.dispatcher.close_room(wishlist_id).await;
        info!("{} deleted wishlist {}", caller.username, wishlist_id);

        Ok(MessageResponse::new("Wishlist deleted successfully"))
    }

    /// Authorizes against a wishlist fetched in this call, never a cached one.
    /// A concurrent delete of the same product makes the loser see `NotFound`.
    pub async fn delete_product(
        &self,
        caller: &Identity,
        wishlist_id: Uuid,
        product_id: Uuid,
    ) -> Result<Wishlist, ApiError> {
        let wishlist = self.fetch(wishlist_id).await?;
        policy::can_view(&wishlist, caller.user_id).into_result()?;

        let product = wishlist
            .product(product_id)
            .ok_or(StoreError::ProductNotFound)?;
        policy::can_delete_product(&wishlist, product, caller.user_id).into_result()?;

        self.write(
            wishlist_id,
            move |db| db.remove_product(wishlist_id, product_id),
            LateCommit::event(RoomEvent::ProductDeleted {
                wishlist_id,
                product_id,
            }),
        )
        .await?;

        let wishlist = self.fetch(wishlist_id).await?;
        self.dispatcher
            .broadcast(
                wishlist_id,
                RoomEvent::ProductDeleted {
                    wishlist_id,
                    product_id,
                },
            )
            .await;
        debug!("{} deleted product {} from {}", caller.username, product_id, wishlist_id);
        Ok(wishlist)
    }
}
