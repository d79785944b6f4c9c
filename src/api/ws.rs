//! WebSocket push channel
//!
//! Each upgraded socket is one hub client: the session registers on
//! connect, hub events drain to the socket through a writer task, and
//! incoming JSON frames are translated into subscribe/unsubscribe/ping
//! calls. Socket close, write failure and idle pruning all end in
//! `Hub::remove_client`.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::AppState;
use crate::hub::{
    ClientId, ClientMessage, ClientTransport, Hub, ServerEvent, TransportError,
};

/// Connection parameters: owning user identity and the initial bearer
/// token. Token possession is the only authorization the hub enforces.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user: String,
    pub token: String,
}

/// Outgoing socket frames: hub events plus protocol-level errors raised
/// by this endpoint itself.
pub(crate) enum OutFrame {
    Event(ServerEvent),
    Error { code: String, message: String },
}

/// Transport handing hub events to this socket's writer task.
struct WsTransport {
    tx: mpsc::UnboundedSender<OutFrame>,
}

impl ClientTransport for WsTransport {
    fn send(&self, event: ServerEvent) -> Result<(), TransportError> {
        self.tx
            .send(OutFrame::Event(event))
            .map_err(|_| TransportError::Closed)
    }
}

/// WebSocket endpoint handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub, query))
}

async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, query: WsQuery) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutFrame>();
    let transport = Arc::new(WsTransport { tx: tx.clone() });

    let Some(client_id) = hub.register(&query.user, &query.token, transport) else {
        warn!(user = %query.user, "refusing session, client cap reached");
        let frame = json!({
            "event": "error",
            "code": "CAPACITY_EXCEEDED",
            "message": "client capacity reached",
        });
        let _ = sink.send(Message::Text(frame.to_string())).await;
        let _ = sink.send(Message::Close(None)).await;
        return;
    };

    info!(client_id = %client_id, user = %query.user, "session started");

    // Writer task: the socket sink is owned here; the hub reaches it only
    // through the channel.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match encode_frame(&frame) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "failed to encode outgoing frame");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!(client_id = %client_id, error = %e, "socket error");
                break;
            }
        };

        match message {
            Message::Text(text) => handle_client_frame(&hub, client_id, &text, &tx),
            Message::Binary(_) => {
                let _ = tx.send(OutFrame::Error {
                    code: "UNSUPPORTED".to_string(),
                    message: "binary frames are not supported".to_string(),
                });
            }
            Message::Ping(_) => {
                // axum answers pongs itself
            }
            Message::Pong(_) => {
                hub.touch_client(client_id);
            }
            Message::Close(_) => {
                debug!(client_id = %client_id, "client closed socket");
                break;
            }
        }
    }

    info!(client_id = %client_id, "session ended");
    writer.abort();
    hub.remove_client(client_id);
}

/// Translate one incoming JSON frame into a hub call. Subscribe errors go
/// back to this session only.
fn handle_client_frame(
    hub: &Arc<Hub>,
    client_id: ClientId,
    text: &str,
    tx: &mpsc::UnboundedSender<OutFrame>,
) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { token, target }) => {
            // every subscribe refreshes the stored bearer token
            hub.update_token(client_id, token);
            if let Err(err) = hub.subscribe(client_id, &target) {
                let _ = tx.send(OutFrame::Error {
                    code: err.error_code().to_string(),
                    message: err.to_string(),
                });
            }
        }
        Ok(ClientMessage::Unsubscribe { channel }) => {
            hub.unsubscribe(client_id, &channel);
        }
        Ok(ClientMessage::Ping { .. }) => {
            hub.touch_client(client_id);
        }
        Err(error) => {
            debug!(client_id = %client_id, %error, "unparseable client frame");
            let _ = tx.send(OutFrame::Error {
                code: "INVALID_MESSAGE".to_string(),
                message: format!("failed to parse frame: {}", error),
            });
        }
    }
}

fn encode_frame(frame: &OutFrame) -> serde_json::Result<String> {
    match frame {
        OutFrame::Event(event) => serde_json::to_string(event),
        OutFrame::Error { code, message } => serde_json::to_string(&json!({
            "event": "error",
            "code": code,
            "message": message,
        })),
    }
}
