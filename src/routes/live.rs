//! Live public count over WebSocket (`GET /api/pledges/live`)
//!
//! Each client is bound to the shared counter cell as one more display.
//! Server messages:
//! - `{"type":"count","count":n}` on connect (once a value is known) and on every change
//! - `{"type":"pong"}` in reply to `{"type":"ping"}`

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error_response;
use crate::counter::CounterCell;
use crate::types::{PledgeError, Result};

type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    Count { count: u64 },
    Pong,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
}

pub async fn handle_live_count(counter: Arc<CounterCell>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return error_response(PledgeError::BadRequest("WebSocket upgrade required".into()));
    }

    let (response, websocket) = match hyper_tungstenite::upgrade(req, None) {
        Ok(upgrade) => upgrade,
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            return error_response(PledgeError::WebSocket("WebSocket upgrade failed".into()));
        }
    };

    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                if let Err(e) = handle_live_connection(ws, counter).await {
                    warn!("Live count WebSocket error: {}", e);
                }
            }
            Err(e) => error!("WebSocket connection failed: {}", e),
        }
    });

    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}

/// Bind the counter as a display feeding this client until either side hangs up
async fn handle_live_connection(ws: HyperWebSocket, counter: Arc<CounterCell>) -> Result<()> {
    let client = Uuid::new_v4();
    let (mut sender, mut receiver) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let display = counter.bind(format!("live-{}", client), move |count| {
        let _ = tx.send(count);
    });
    info!("Live count client {} connected ({} displays)", client, counter.display_count());

    let result: Result<()> = async {
        loop {
            tokio::select! {
                count = rx.recv() => {
                    let Some(count) = count else { break };
                    sender.send(WsMessage::Text(encode(&LiveMessage::Count { count })?)).await?;
                }

                msg = receiver.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!("Live client {} sent: {}", client, text);
                        if let Ok(ClientMessage::Ping) = serde_json::from_str::<ClientMessage>(&text) {
                            sender.send(WsMessage::Text(encode(&LiveMessage::Pong)?)).await?;
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        sender.send(WsMessage::Pong(data)).await?;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => return Err(PledgeError::from(e)),
                    Some(Ok(_)) => {}
                },
            }
        }
        Ok(())
    }
    .await;

    counter.unbind(display);
    info!("Live count client {} disconnected", client);
    result
}

fn encode(message: &LiveMessage) -> Result<String> {
    serde_json::to_string(message)
        .map_err(|e| PledgeError::Internal(format!("Failed to encode live message: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            encode(&LiveMessage::Count { count: 42 }).unwrap(),
            r#"{"type":"count","count":42}"#
        );
        assert_eq!(encode(&LiveMessage::Pong).unwrap(), r#"{"type":"pong"}"#);
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#),
            Ok(ClientMessage::Ping)
        ));
    }
}
