//! WebSocket feed + REST endpoints over the order registry and bot pool.
//!
//! Clients get a full `sync` frame on connect and then every engine event as
//! it is published. A lagging client is re-synced instead of disconnected.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::bots::{BotKind, BotPool, BotSnapshot};
use crate::error::ServerError;
use crate::orders::{Order, OrderEvent, OrderKind};

/// Frames sent to WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Full state: `snapshot_all` order plus every bot.
    Sync {
        orders: Vec<Order>,
        bots: Vec<BotSnapshot>,
    },
    /// One engine event, forwarded as published.
    Event { event: OrderEvent },
}

/// Frames accepted from WebSocket clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    NewOrder {
        #[serde(default)]
        kind: OrderKind,
    },
    AddBot {
        #[serde(default)]
        kind: BotKind,
    },
    RemoveBot,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<BotPool>,
}

/// Build the Axum router with the WebSocket feed and REST routes.
pub fn routes(pool: Arc<BotPool>) -> Router {
    let state = AppState { pool };

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/bots", get(list_bots).post(add_bot).delete(remove_bot))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `0.0.0.0:port` and serve until the listener fails.
pub async fn serve(port: u16, pool: Arc<BotPool>) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind {
            addr,
            reason: e.to_string(),
        })?;
    info!(port, "Observer server started");
    axum::serve(listener, routes(pool))
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))
}

fn sync_message(pool: &BotPool) -> WsMessage {
    WsMessage::Sync {
        orders: pool.registry().snapshot_all(),
        bots: pool.snapshots(),
    }
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "order-bots",
        "bots": state.pool.len(),
        "orders": state.pool.registry().stats(),
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state.pool))
}

async fn handle_socket(mut socket: WebSocket, pool: Arc<BotPool>) {
    info!("WebSocket client connected");

    // Subscribe before the sync so nothing published in between is missed.
    let mut rx = pool.registry().watch();

    if send_json(&mut socket, &sync_message(&pool)).await.is_err() {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if send_json(&mut socket, &WsMessage::Event { event }).await.is_err() {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind event feed");
                        if send_json(&mut socket, &sync_message(&pool)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Event channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => handle_client_message(&text, &pool),
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

async fn send_json(socket: &mut WebSocket, msg: &WsMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize WS message");
            Ok(())
        }
    }
}

fn handle_client_message(text: &str, pool: &BotPool) {
    match serde_json::from_str::<ClientAction>(text) {
        Ok(ClientAction::NewOrder { kind }) => {
            let order = pool.registry().create_item(kind);
            info!(order_id = order.id, kind = %kind, "Order created via WS");
        }
        Ok(ClientAction::AddBot { kind }) => {
            let bot = pool.scale_up(kind);
            info!(bot_id = bot.id(), kind = %kind, "Bot added via WS");
        }
        Ok(ClientAction::RemoveBot) => match pool.scale_down() {
            Some(bot) => info!(bot_id = bot.id(), "Bot removed via WS"),
            None => debug!("Remove requested on empty pool"),
        },
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
        }
    }
}

// ── REST Endpoints ──────────────────────────────────────────────────────

async fn list_orders(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.pool.registry();
    Json(serde_json::json!({
        "pending": registry.pending(),
        "completed": registry.completed(),
        "stats": registry.stats(),
    }))
}

#[derive(Deserialize)]
struct NewOrderRequest {
    #[serde(default)]
    kind: OrderKind,
}

async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<NewOrderRequest>,
) -> impl IntoResponse {
    let order = state.pool.registry().create_item(body.kind);
    (StatusCode::CREATED, Json(order))
}

async fn list_bots(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pool.snapshots())
}

#[derive(Deserialize)]
struct AddBotRequest {
    #[serde(default)]
    kind: BotKind,
}

async fn add_bot(
    State(state): State<AppState>,
    Json(body): Json<AddBotRequest>,
) -> impl IntoResponse {
    let bot = state.pool.scale_up(body.kind);
    (StatusCode::CREATED, Json(bot.snapshot()))
}

async fn remove_bot(State(state): State<AppState>) -> impl IntoResponse {
    match state.pool.scale_down() {
        Some(bot) => (StatusCode::OK, Json(serde_json::json!(bot.snapshot()))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No bots to remove"})),
        ),
    }
}
