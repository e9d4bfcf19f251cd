use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;

use crate::router::Resolution;
use crate::session::SessionView;
use crate::AppState;

/// Pushed to the client on connect and after every session change.
#[derive(Debug, Serialize)]
struct SessionUpdate {
    session: SessionView,
    route: Resolution,
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn snapshot(state: &AppState, session: SessionView) -> Option<String> {
    let route = state.view_router.lock().await.render(&session);
    match serde_json::to_string(&SessionUpdate { session, route }) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode session update");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.session.watch();

    tracing::debug!("WebSocket connection established");

    let mut send_task = tokio::spawn(async move {
        // Current state first, then one message per change.
        let mut current = rx.borrow_and_update().clone();
        loop {
            if let Some(text) = snapshot(&state, current).await {
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            if rx.changed().await.is_err() {
                break;
            }
            current = rx.borrow_and_update().clone();
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    tracing::debug!(message = %text, "WebSocket message ignored");
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!("WebSocket connection closed");
}
