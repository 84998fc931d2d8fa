mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use wishlist_api::notifier::{InvitationNotifier, LogNotifier, SmtpNotifier};
use wishlist_api::routes;
use wishlist_api::service::{ServiceConfig, WishlistService};
use wishlist_api::AppStateInner;
use wishlist_db::Database;
use wishlist_gateway::connection::{self, GatewayContext};
use wishlist_gateway::Dispatcher;
use wishlist_types::identity::JwtVerifier;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wishlist=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    let notifier: Arc<dyn InvitationNotifier> = match &config.smtp {
        Some(smtp) => {
            info!("Sending invitations through {}", smtp.host);
            Arc::new(SmtpNotifier::new(&smtp.host, &smtp.username, &smtp.password, &smtp.from)?)
        }
        None => {
            info!("SMTP_HOST not set, invitations will only be logged");
            Arc::new(LogNotifier)
        }
    };

    // Shared state
    let dispatcher = Dispatcher::new();
    let jwt = Arc::new(JwtVerifier::new(&config.jwt_secret));
    let service = WishlistService::new(
        db.clone(),
        dispatcher.clone(),
        notifier,
        ServiceConfig {
            app_url: config.app_url.clone(),
            store_timeout: config.store_timeout,
        },
    );
    let app_state = Arc::new(AppStateInner {
        service,
        jwt: jwt.clone(),
    });

    let gateway = GatewayContext {
        dispatcher,
        db,
        verifier: jwt,
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway);

    let app = routes::router(app_state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_addr()?;
    info!("Wishlist server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(gateway): State<GatewayContext>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway))
}
