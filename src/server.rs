//! HTTP surface for the UI: static page, WebSocket push channel, health.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::{Html, IntoResponse},
    routing::get,
};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::channels::MessageRecord;
use crate::notify::{NotificationEvent, Notifier};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub notifier: Arc<Notifier>,
}

/// Build the Axum router.
pub fn routes(notifier: Arc<Notifier>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(AppState { notifier })
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mail-responder"
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state.notifier))
}

/// Replaces the client's whole list. Sent after the client lagged and may
/// have missed a removal.
#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum SyncFrame {
    Sync(Vec<MessageRecord>),
}

async fn send_event<T: Serialize>(socket: &mut WebSocket, event: &T) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize notification");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, notifier: Arc<Notifier>) {
    info!("WebSocket client connected");

    // Subscribe before replaying so nothing falls between the two
    let mut rx = notifier.subscribe();

    for record in notifier.visible() {
        if !send_event(&mut socket, &NotificationEvent::NewEmail(record)).await {
            debug!("Client disconnected during replay");
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_event(&mut socket, &event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                        // Re-sync with the current unresolved list
                        let sync = SyncFrame::Sync(notifier.visible());
                        if !send_event(&mut socket, &sync).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
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
