//! WebSocket upgrade handler.

use std::future;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};

use lumen_core::types::ClientInstanceId;
use lumen_realtime::{ClientFrame, ConnectionIdentity, OutboundFrame, RealtimeEngine};

use crate::error::ApiError;
use crate::extractors::AuthSession;
use crate::state::AppState;

/// Query parameters of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Device or tab label; generated when absent.
    pub instance: Option<String>,
}

/// GET /ws?token={credential}&instance={label}
///
/// The guard has already authorized the request (header or `token` query).
pub async fn ws_upgrade(
    State(state): State<AppState>,
    session: AuthSession,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let instance = match query.instance {
        Some(raw) => ClientInstanceId::new(raw)?,
        None => ClientInstanceId::generate(),
    };
    let identity = ConnectionIdentity {
        subject_id: session.subject_id,
        instance,
        credential_id: session.credential_id,
        guard: session.guard,
    };

    let engine = state.engine.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(engine, identity, socket)))
}

async fn handle_socket(engine: RealtimeEngine, identity: ConnectionIdentity, mut socket: WebSocket) {
    let (handle, rx) = match engine.open_connection(identity).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!(error = %e, "Failed to register connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: "try again later".into(),
                })))
                .await;
            return;
        }
    };

    let (ws_tx, ws_rx) = socket.split();
    let sink = ws_tx
        .with(|frame: OutboundFrame| future::ready(Ok::<_, axum::Error>(to_message(frame))));
    let stream = ws_rx.map(|msg| match msg {
        Ok(Message::Text(text)) => ClientFrame::Text(text.as_str().to_owned()),
        Ok(Message::Close(_)) => ClientFrame::Close,
        Ok(_) => ClientFrame::Activity,
        Err(e) => {
            debug!(error = %e, "WebSocket read error");
            ClientFrame::Close
        }
    });

    engine
        .serve_connection(handle, rx, sink, stream)
        .await;
}

fn to_message(frame: OutboundFrame) -> Message {
    match frame {
        OutboundFrame::Text(text) => Message::text(text.to_string()),
        OutboundFrame::Ping => Message::Ping(Bytes::new()),
        OutboundFrame::Close(reason) => {
            let code = if reason == "shutdown" {
                close_code::AWAY
            } else if reason == "client_closed" || reason == "replaced" {
                close_code::NORMAL
            } else {
                close_code::POLICY
            };
            Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            }))
        }
    }
}
