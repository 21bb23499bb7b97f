// src/server/ws.rs
//! WebSocket command channel
//!
//! Clients authenticate with `Authorization: Bearer <token>` on the upgrade
//! request, then send text commands. `refresh` runs a refresh cycle and
//! streams its progress lines back.

use crate::server::ServerState;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, header::AUTHORIZATION},
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A command read from the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Unknown,
}

impl Command {
    pub fn parse(text: &str) -> Self {
        match text.trim() {
            "refresh" => Command::Refresh,
            _ => Command::Unknown,
        }
    }
}

/// Upgrade handler for `/ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    let authorized = state.authorize(authorization);

    ws.on_upgrade(move |socket| handle_socket(socket, state, authorized))
}

async fn send_text(socket: &mut WebSocket, text: impl Into<String>) -> bool {
    socket.send(Message::Text(text.into())).await.is_ok()
}

async fn handle_socket(mut socket: WebSocket, state: Arc<ServerState>, authorized: bool) {
    if !authorized {
        warn!("Rejected unauthorized control connection");
        if send_text(&mut socket, "unauthorized").await {
            let _ = socket.send(Message::Close(None)).await;
        }
        return;
    }

    debug!("Control connection opened");

    while let Some(Ok(message)) = socket.recv().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match Command::parse(&text) {
            Command::Refresh => {
                let Some(mut progress) = state.start_refresh() else {
                    if !send_text(&mut socket, "refresh already running").await {
                        return;
                    }
                    continue;
                };

                info!("Refresh requested over control channel");
                while let Some(line) = progress.recv().await {
                    if !send_text(&mut socket, line).await {
                        return;
                    }
                }
            }
            Command::Unknown => {
                if !send_text(&mut socket, "unknown command").await {
                    return;
                }
            }
        }
    }

    debug!("Control connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("refresh"), Command::Refresh);
        assert_eq!(Command::parse(" refresh\n"), Command::Refresh);
        assert_eq!(Command::parse("REFRESH"), Command::Unknown);
        assert_eq!(Command::parse("status"), Command::Unknown);
    }
}
