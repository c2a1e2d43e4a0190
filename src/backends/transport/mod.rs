// Snapshot transport trait and implementations

use super::{BackendCapabilities, BackendPriority};
use crate::api::ApiConfig;
use crate::snapshot::Snapshot;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[cfg(feature = "transport-poll")]
pub mod poll;
#[cfg(feature = "transport-websocket")]
pub mod websocket;

/// Events delivered from a transport to the tick handler
#[derive(Debug)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Snapshot(Snapshot),
    /// Payload or connection failure; the tick is skipped
    Error(String),
}

pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// Snapshot transport trait
pub trait SnapshotTransport: Send + Sync {
    /// Transport name (e.g., "websocket", "poll")
    fn name(&self) -> &'static str;

    /// Transport priority for auto-selection
    fn priority(&self) -> BackendPriority;

    /// Check if this transport can be used in this build
    fn is_available() -> bool
    where
        Self: Sized;

    fn capabilities(&self) -> BackendCapabilities;

    /// Start delivering events until the task is aborted or the sink closes
    fn spawn(self: Box<Self>, api: ApiConfig, sink: EventSink) -> JoinHandle<()>;
}

/// Handle to a running transport. Dropping it stops future ticks.
pub struct Subscription {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn transport_name(&self) -> &'static str {
        self.name
    }

    pub fn unsubscribe(self) {
        log::info!("Unsubscribing from {} transport", self.name);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start `transport` against the controller described by `api`
pub fn subscribe(
    transport: Box<dyn SnapshotTransport>,
    api: ApiConfig,
    sink: EventSink,
) -> Subscription {
    let name = transport.name();
    log::info!("Subscribing to {} via {} transport", api.base_url, name);

    Subscription {
        name,
        handle: transport.spawn(api, sink),
    }
}

/// Transport metadata for selection
#[derive(Debug, Clone)]
pub struct TransportInfo {
    pub name: &'static str,
    pub priority: BackendPriority,
    pub available: bool,
}

/// Detect all transports compiled into this build
pub fn detect_available_transports() -> Vec<TransportInfo> {
    let mut transports = Vec::new();

    #[cfg(feature = "transport-websocket")]
    {
        transports.push(TransportInfo {
            name: "websocket",
            priority: BackendPriority::Better,
            available: websocket::WebSocketTransport::is_available(),
        });
    }

    #[cfg(feature = "transport-poll")]
    {
        transports.push(TransportInfo {
            name: "poll",
            priority: BackendPriority::Fallback,
            available: poll::PollTransport::is_available(),
        });
    }

    transports
}

/// Auto-select best available transport
pub fn select_transport(
    preference: Option<&str>,
    poll_interval: Duration,
) -> Result<Box<dyn SnapshotTransport>> {
    if let Some(name) = preference {
        // User explicitly requested a transport
        return create_transport(name, poll_interval);
    }

    detect_available_transports()
        .iter()
        .filter(|t| t.available)
        .max_by_key(|t| t.priority)
        .and_then(|info| create_transport(info.name, poll_interval).ok())
        .ok_or_else(|| anyhow::anyhow!("No snapshot transport available"))
}

/// Create a transport by name
#[allow(unused_variables)]
fn create_transport(name: &str, poll_interval: Duration) -> Result<Box<dyn SnapshotTransport>> {
    match name {
        #[cfg(feature = "transport-websocket")]
        "websocket" | "ws" => Ok(Box::new(websocket::WebSocketTransport::new())),

        #[cfg(feature = "transport-poll")]
        "poll" | "http" => Ok(Box::new(poll::PollTransport::new(poll_interval))),

        _ => Err(anyhow::anyhow!("Unknown transport: {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_transport() {
        assert!(select_transport(Some("carrier-pigeon"), Duration::from_secs(1)).is_err());
    }

    #[cfg(all(feature = "transport-websocket", feature = "transport-poll"))]
    #[test]
    fn test_auto_selection_prefers_push() {
        let transport = select_transport(None, Duration::from_secs(1)).unwrap();
        assert_eq!(transport.name(), "websocket");
        assert!(transport.capabilities().push);

        let transport = select_transport(Some("poll"), Duration::from_secs(1)).unwrap();
        assert_eq!(transport.name(), "poll");
        assert!(!transport.capabilities().push);
    }

    #[test]
    fn test_detected_transports_are_available() {
        for info in detect_available_transports() {
            assert!(info.available, "{} should be available", info.name);
        }
    }
}
