// WebSocket push transport: the controller streams a snapshot per interval

use super::{EventSink, SnapshotTransport, TransportEvent};
use crate::api::ApiConfig;
use crate::backends::{BackendCapabilities, BackendPriority};
use crate::snapshot::decode_snapshot;
use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl SnapshotTransport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Better
    }

    fn is_available() -> bool {
        true
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities { push: true }
    }

    fn spawn(self: Box<Self>, api: ApiConfig, sink: EventSink) -> JoinHandle<()> {
        tokio::spawn(stream_loop(api, sink))
    }
}

fn build_request(api: &ApiConfig) -> Result<Request> {
    let url = api.connections_ws_url()?;
    let mut request = url
        .as_str()
        .into_client_request()
        .context("Failed to build WebSocket request")?;

    if let Some(bearer) = api.bearer() {
        request.headers_mut().insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).context("Secret is not a valid header value")?,
        );
    }
    Ok(request)
}

async fn stream_loop(api: ApiConfig, sink: EventSink) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        let request = match build_request(&api) {
            Ok(request) => request,
            Err(e) => {
                // Configuration problem, retrying won't help
                log::error!("WebSocket transport stopped: {:#}", e);
                let _ = sink.send(TransportEvent::Error(format!("{:#}", e)));
                return;
            }
        };

        let mut ws = match connect_async(request).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                log::warn!("WebSocket connect to {} failed: {}", api.base_url, e);
                if sink
                    .send(TransportEvent::Error(format!("Connect failed: {}", e)))
                    .is_err()
                {
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };

        backoff = INITIAL_BACKOFF;
        log::info!("WebSocket connected to {}", api.base_url);
        if sink.send(TransportEvent::Connected).is_err() {
            return;
        }

        while let Some(message) = ws.next().await {
            let event = match message {
                Ok(Message::Text(text)) => match decode_snapshot(&text) {
                    Ok(snapshot) => TransportEvent::Snapshot(snapshot),
                    Err(e) => {
                        log::warn!("Dropping malformed snapshot: {:#}", e);
                        TransportEvent::Error(format!("{:#}", e))
                    }
                },
                Ok(Message::Close(frame)) => {
                    log::info!("WebSocket closed by controller: {:?}", frame);
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("WebSocket read error: {}", e);
                    break;
                }
            };

            if sink.send(event).is_err() {
                return;
            }
        }

        if sink.send(TransportEvent::Disconnected).is_err() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}
