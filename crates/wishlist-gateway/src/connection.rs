use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use wishlist_db::Database;
use wishlist_types::events::{RoomCommand, RoomEvent};
use wishlist_types::identity::{Identity, IdentityVerifier};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a connection needs besides its socket.
#[derive(Clone)]
pub struct GatewayContext {
    pub dispatcher: Dispatcher,
    pub db: Arc<Database>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

/// Handle a single websocket connection: `identify`, then relay room events
/// until either side goes away. Disconnecting leaves every joined room.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    accept(socket, ctx, IDENTIFY_TIMEOUT).await
}

async fn accept(socket: WebSocket, ctx: GatewayContext, identify_timeout: Duration) {
    let (mut sender, mut receiver) = socket.split();

    let verifier = ctx.verifier.as_ref();
    let identity = match wait_for_identify(&mut receiver, verifier, identify_timeout).await {
        Some(identity) => identity,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", identity.username, identity.user_id);

    let ready = RoomEvent::Ready {
        user_id: identity.user_id,
        username: identity.username.clone(),
    };
    if !send_event(&mut sender, &ready).await {
        return;
    }

    run_connection_loop(sender, receiver, ctx, identity).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    ctx: GatewayContext,
    identity: Identity,
) {
    let (conn_id, mut room_rx) = ctx.dispatcher.register(identity.user_id).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = room_rx.recv() => {
                    let Some(event) = event else { break };
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RoomCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, conn_id, &recv_identity, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            recv_identity.username,
                            recv_identity.user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    ctx.dispatcher.unregister(conn_id).await;
    info!("{} ({}) disconnected from gateway", identity.username, identity.user_id);
}

async fn wait_for_identify(
    receiver: &mut SplitStream<WebSocket>,
    verifier: &dyn IdentityVerifier,
    identify_timeout: Duration,
) -> Option<Identity> {
    let identify = async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(RoomCommand::Identify { token }) = serde_json::from_str(&text) {
                    return verifier.verify(&token).ok();
                }
            }
        }
        None
    };

    tokio::time::timeout(identify_timeout, identify)
        .await
        .ok()
        .flatten()
}

async fn handle_command(ctx: &GatewayContext, conn_id: Uuid, identity: &Identity, cmd: RoomCommand) {
    match cmd {
        RoomCommand::Identify { .. } => {} // Already handled

        RoomCommand::JoinWishlist { wishlist_id } => {
            if !may_view(ctx, wishlist_id, identity.user_id).await {
                warn!(
                    "{} ({}) denied join of wishlist {}",
                    identity.username, identity.user_id, wishlist_id
                );
                return;
            }
            ctx.dispatcher.join(conn_id, wishlist_id).await;
            // The wishlist may have been deleted, and its room closed, since the check.
            if !may_view(ctx, wishlist_id, identity.user_id).await {
                ctx.dispatcher.leave(conn_id, wishlist_id).await;
                return;
            }
            info!("{} joined wishlist {}", identity.username, wishlist_id);
        }

        RoomCommand::LeaveWishlist { wishlist_id } => {
            ctx.dispatcher.leave(conn_id, wishlist_id).await;
            info!("{} left wishlist {}", identity.username, wishlist_id);
        }

        RoomCommand::WishlistUpdated { wishlist_id } => {
            if !ctx.dispatcher.in_room(conn_id, wishlist_id).await {
                return;
            }
            ctx.dispatcher
                .broadcast_except(wishlist_id, RoomEvent::RefreshWishlist { wishlist_id }, conn_id)
                .await;
        }
    }
}

/// Membership lookup on the blocking pool. Any store failure denies.
async fn may_view(ctx: &GatewayContext, wishlist_id: Uuid, user_id: Uuid) -> bool {
    let db = ctx.db.clone();
    match tokio::task::spawn_blocking(move || db.is_member(wishlist_id, user_id)).await {
        Ok(Ok(member)) => member,
        Ok(Err(e)) => {
            warn!("Membership lookup for {} failed: {}", wishlist_id, e);
            false
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            false
        }
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &RoomEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize room event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(text.into())).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, extract::WebSocketUpgrade, routing::get};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;
    use wishlist_types::identity::JwtVerifier;

    struct Fixture {
        ctx: GatewayContext,
        jwt: Arc<JwtVerifier>,
        xavier: Identity,
        yasmin: Identity,
        olga: Identity,
        wishlist_id: Uuid,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let [xavier, yasmin, olga] = ["xavier", "yasmin", "olga"].map(|name| {
            let user_id = Uuid::new_v4();
            db.create_user(user_id, name, &format!("{name}@example.com"), "hash")
                .unwrap();
            Identity {
                user_id,
                username: name.into(),
            }
        });
        let wishlist_id = db.create_wishlist("Birthday", None, xavier.user_id).unwrap().id;
        db.append_member(wishlist_id, yasmin.user_id).unwrap();

        let jwt = Arc::new(JwtVerifier::new("gateway-test-secret"));
        Fixture {
            ctx: GatewayContext {
                dispatcher: Dispatcher::new(),
                db,
                verifier: jwt.clone(),
            },
            jwt,
            xavier,
            yasmin,
            olga,
            wishlist_id,
        }
    }

    fn join(wishlist_id: Uuid) -> RoomCommand {
        RoomCommand::JoinWishlist { wishlist_id }
    }

    #[tokio::test]
    async fn join_requires_membership() {
        let f = fixture();
        let (member, _rx_member) = f.ctx.dispatcher.register(f.xavier.user_id).await;
        let (outsider, _rx_outsider) = f.ctx.dispatcher.register(f.olga.user_id).await;

        handle_command(&f.ctx, member, &f.xavier, join(f.wishlist_id)).await;
        handle_command(&f.ctx, outsider, &f.olga, join(f.wishlist_id)).await;

        assert!(f.ctx.dispatcher.in_room(member, f.wishlist_id).await);
        assert!(!f.ctx.dispatcher.in_room(outsider, f.wishlist_id).await);
        assert_eq!(f.ctx.dispatcher.room_size(f.wishlist_id).await, 1);
    }

    #[tokio::test]
    async fn join_of_deleted_wishlist_leaves_no_room() {
        let f = fixture();
        let (member, _rx) = f.ctx.dispatcher.register(f.xavier.user_id).await;
        f.ctx.db.delete_wishlist(f.wishlist_id).unwrap();

        handle_command(&f.ctx, member, &f.xavier, join(f.wishlist_id)).await;
        handle_command(&f.ctx, member, &f.xavier, join(Uuid::new_v4())).await;

        assert_eq!(f.ctx.dispatcher.room_size(f.wishlist_id).await, 0);
    }

    #[tokio::test]
    async fn wishlist_updated_refreshes_peers_only() {
        let f = fixture();
        let (sender, mut rx_sender) = f.ctx.dispatcher.register(f.xavier.user_id).await;
        let (peer, mut rx_peer) = f.ctx.dispatcher.register(f.yasmin.user_id).await;
        handle_command(&f.ctx, sender, &f.xavier, join(f.wishlist_id)).await;
        handle_command(&f.ctx, peer, &f.yasmin, join(f.wishlist_id)).await;

        let updated = RoomCommand::WishlistUpdated {
            wishlist_id: f.wishlist_id,
        };
        handle_command(&f.ctx, sender, &f.xavier, updated).await;

        assert_eq!(
            rx_peer.try_recv().unwrap(),
            RoomEvent::RefreshWishlist {
                wishlist_id: f.wishlist_id
            }
        );
        assert!(rx_sender.try_recv().is_err());
    }

    #[tokio::test]
    async fn wishlist_updated_outside_room_is_ignored() {
        let f = fixture();
        let (peer, mut rx_peer) = f.ctx.dispatcher.register(f.yasmin.user_id).await;
        let (outsider, _rx) = f.ctx.dispatcher.register(f.olga.user_id).await;
        handle_command(&f.ctx, peer, &f.yasmin, join(f.wishlist_id)).await;

        let updated = RoomCommand::WishlistUpdated {
            wishlist_id: f.wishlist_id,
        };
        handle_command(&f.ctx, outsider, &f.olga, updated).await;

        assert!(rx_peer.try_recv().is_err());
    }

    // -- Over a real socket --

    async fn serve(ctx: GatewayContext, identify_timeout: Duration) -> String {
        let app = Router::new().route(
            "/gateway",
            get(move |ws: WebSocketUpgrade| {
                let ctx = ctx.clone();
                async move { ws.on_upgrade(move |socket| accept(socket, ctx, identify_timeout)) }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("ws://{addr}/gateway")
    }

    fn command(cmd: &RoomCommand) -> ClientMessage {
        ClientMessage::text(serde_json::to_string(cmd).unwrap())
    }

    async fn wait_for_room_size(dispatcher: &Dispatcher, wishlist_id: Uuid, expected: usize) {
        for _ in 0..100 {
            if dispatcher.room_size(wishlist_id).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("room {wishlist_id} never reached {expected} connections");
    }

    #[tokio::test]
    async fn identify_join_and_disconnect() {
        let f = fixture();
        let url = serve(f.ctx.clone(), IDENTIFY_TIMEOUT).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();

        let token = f.jwt.issue(f.xavier.user_id, "xavier").unwrap();
        ws.send(command(&RoomCommand::Identify { token })).await.unwrap();

        match ws.next().await {
            Some(Ok(ClientMessage::Text(text))) => {
                let ready: RoomEvent = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(
                    ready,
                    RoomEvent::Ready {
                        user_id: f.xavier.user_id,
                        username: "xavier".into(),
                    }
                );
            }
            other => panic!("expected ready, got {other:?}"),
        }

        ws.send(command(&join(f.wishlist_id))).await.unwrap();
        wait_for_room_size(&f.ctx.dispatcher, f.wishlist_id, 1).await;

        ws.close(None).await.unwrap();
        wait_for_room_size(&f.ctx.dispatcher, f.wishlist_id, 0).await;
    }

    async fn assert_dropped_without_ready(url: String, first: Option<RoomCommand>) {
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        if let Some(cmd) = first {
            ws.send(command(&cmd)).await.unwrap();
        }
        let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("connection was left open");
        assert!(
            !matches!(next, Some(Ok(ClientMessage::Text(_)))),
            "unexpected frame {next:?}"
        );
    }

    #[tokio::test]
    async fn bad_token_closes_connection() {
        let f = fixture();
        let url = serve(f.ctx.clone(), IDENTIFY_TIMEOUT).await;
        let identify = RoomCommand::Identify {
            token: "not-a-token".into(),
        };
        assert_dropped_without_ready(url, Some(identify)).await;
    }

    #[tokio::test]
    async fn silent_client_is_dropped_after_identify_timeout() {
        let f = fixture();
        let url = serve(f.ctx.clone(), Duration::from_millis(200)).await;
        assert_dropped_without_ready(url, None).await;
    }
}
