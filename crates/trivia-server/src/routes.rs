//! HTTP and WebSocket route handlers.

use crate::ticket::TicketStore;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use trivia_gateway::connection::{Connection, ConnectionConfig};
use trivia_gateway::manager::EventManager;

/// Close code for an upgrade that failed authentication (Scenario S6).
const CLOSE_AUTH_FAILED: u16 = 4001;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<EventManager>,
    pub tickets: Arc<TicketStore>,
    pub connection_config: ConnectionConfig,
}

#[derive(Deserialize)]
pub struct IssueTicketRequest {
    pub user_id: String,
}

pub async fn issue_ticket(
    State(state): State<AppState>,
    Json(request): Json<IssueTicketRequest>,
) -> impl IntoResponse {
    let token = state.tickets.issue(request.user_id);
    Json(serde_json::json!({ "ticket": token }))
}

#[derive(Deserialize)]
pub struct UpgradeQuery {
    pub token: Option<String>,
}

/// Pull the bearer token out of whichever of the three accepted sources
/// (spec.md §6) carried it: an `Authorization: Bearer <token>` header, an
/// `access_token` cookie, or the `?token=` query parameter — in that
/// priority order, since a header or cookie is harder for an attacker to
/// smuggle into a shared link than a query string.
fn extract_token(headers: &HeaderMap, query: &UpgradeQuery) -> Option<String> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.to_owned());
            }
        }
    }

    if let Some(cookie_header) = headers.get(axum::http::header::COOKIE) {
        if let Ok(cookie_header) = cookie_header.to_str() {
            for pair in cookie_header.split(';') {
                let pair = pair.trim();
                if let Some(value) = pair.strip_prefix("access_token=") {
                    return Some(value.to_owned());
                }
            }
        }
    }

    query.token.clone()
}

pub async fn upgrade_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UpgradeQuery>,
) -> Response {
    let user_id = extract_token(&headers, &query).and_then(|token| state.tickets.redeem(&token));

    let Some(user_id) = user_id else {
        warn!("websocket upgrade rejected: missing, invalid or expired token");
        state.manager.hub().metrics().record_connection_error();
        return ws.on_upgrade(|socket| async move {
            let _ = reject_with_close(socket).await;
        });
    };

    info!(user_id = %user_id, "websocket upgrade accepted");

    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, user_id, state).await;
    })
}

async fn reject_with_close(mut socket: WebSocket) {
    use futures_util::SinkExt;
    let _ = socket
        .send(WsMessage::Close(Some(CloseFrame {
            code: CLOSE_AUTH_FAILED,
            reason: "authentication failed".into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, user_id: String, state: AppState) {
    let send_buffer = state.connection_config.send_buffer();
    let (connection, outbound_rx) = Connection::new(user_id.clone(), send_buffer);
    connection.subscribe_quiz_lifecycle();

    let hub = state.manager.hub();
    let (unregister_tx, mut unregister_rx) = tokio::sync::mpsc::unbounded_channel();

    hub.register(user_id.clone(), connection.clone());

    let (read_handle, write_handle) = trivia_gateway::connection::io::spawn_io_loops(
        socket,
        connection.clone(),
        outbound_rx,
        state.connection_config.clone(),
        state.manager.clone(),
        unregister_tx,
    );

    if let Some(connection_id) = unregister_rx.recv().await {
        debug_assert_eq!(connection_id, connection.id());
        hub.handle_disconnect(&user_id, &connection).await;
    }

    let _ = read_handle.await;
    let _ = write_handle.await;
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.manager.hub().refresh_shard_metrics();
    Json(state.manager.hub().metrics().snapshot())
}

/// Degraded once any shard is at or above its emergency-hot load ratio;
/// down is reserved for a future liveness check this crate doesn't yet
/// have a signal for (spec.md §6).
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.manager.hub();
    let status = if hub.is_emergency_hot() { "degraded" } else { "ok" };
    Json(serde_json::json!({
        "status": status,
        "active_connections": hub.total_clients(),
        "shards": hub.shard_count(),
    }))
}

pub async fn shards(State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.manager.hub();
    let shards: Vec<_> = (0..hub.shard_count())
        .map(|id| {
            let shard = hub.shard(id);
            serde_json::json!({
                "id": id,
                "clients": shard.client_count(),
                "load_ratio": shard.load_ratio(),
            })
        })
        .collect();
    Json(serde_json::json!({ "shards": shards }))
}
