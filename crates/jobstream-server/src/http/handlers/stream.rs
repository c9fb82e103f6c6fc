//! WebSocket streaming handler.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use tracing::{debug, info};

use crate::protocol::ServerMessage;
use crate::session::{ClientConnection, StreamSession, TransportError};
use crate::state::AppState;

/// Upgrade to a WebSocket and run one streaming session on it.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let service = Arc::clone(&state.service);
        let report = StreamSession::new(WsConnection::new(socket), service)
            .run()
            .await;
        info!(
            session_id = %report.session_id,
            job_id = report.job_id.as_ref().map(|id| id.as_str()),
            state = %report.final_state,
            events_forwarded = report.events_forwarded,
            client_disconnected = report.client_disconnected,
            "WebSocket session closed"
        );
    })
}

/// [`ClientConnection`] over an axum WebSocket.
pub struct WsConnection {
    socket: WebSocket,
}

impl WsConnection {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl ClientConnection for WsConnection {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.socket.recv().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    return String::from_utf8(bytes)
                        .map(Some)
                        .map_err(|e| TransportError::Protocol(e.to_string()));
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
            }
        }
    }

    async fn send(&mut self, message: &ServerMessage) -> Result<(), TransportError> {
        let text = message.to_json()?;
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.socket.send(Message::Close(None)).await {
            debug!(error = %e, "WebSocket close frame not delivered");
        }
    }
}
