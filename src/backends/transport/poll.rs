// HTTP poll transport: GET /connections on a fixed interval

use super::{EventSink, SnapshotTransport, TransportEvent};
use crate::api::{self, ApiConfig};
use crate::backends::{BackendCapabilities, BackendPriority};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

pub struct PollTransport {
    interval: Duration,
}

impl PollTransport {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl SnapshotTransport for PollTransport {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn priority(&self) -> BackendPriority {
        BackendPriority::Fallback
    }

    fn is_available() -> bool {
        true
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities { push: false }
    }

    fn spawn(self: Box<Self>, api: ApiConfig, sink: EventSink) -> JoinHandle<()> {
        tokio::spawn(poll_loop(api, self.interval, sink))
    }
}

async fn poll_loop(api: ApiConfig, period: Duration, sink: EventSink) {
    let client = match api::http_client() {
        Ok(client) => client,
        Err(e) => {
            log::error!("Poll transport stopped: {:#}", e);
            let _ = sink.send(TransportEvent::Error(format!("{:#}", e)));
            return;
        }
    };

    let mut ticker = interval(period);
    // A slow controller must not cause a burst of catch-up requests
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut connected = false;

    loop {
        ticker.tick().await;

        let mut events = Vec::with_capacity(2);
        match api::fetch_snapshot(&client, &api).await {
            Ok(snapshot) => {
                if !connected {
                    log::info!("Polling {} every {:?}", api.base_url, period);
                    connected = true;
                    events.push(TransportEvent::Connected);
                }
                events.push(TransportEvent::Snapshot(snapshot));
            }
            Err(e) => {
                log::warn!("Poll of {} failed: {:#}", api.base_url, e);
                if connected {
                    connected = false;
                    events.push(TransportEvent::Disconnected);
                }
                events.push(TransportEvent::Error(format!("{:#}", e)));
            }
        }

        for event in events {
            if sink.send(event).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_controller_reports_error() {
        let api = ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            secret: None,
        };
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let transport = Box::new(PollTransport::new(Duration::from_millis(100)));
        let subscription = super::super::subscribe(transport, api, tx);
        assert_eq!(subscription.transport_name(), "poll");

        assert!(matches!(rx.recv().await, Some(TransportEvent::Error(_))));
        drop(subscription);
    }

    #[tokio::test]
    async fn test_closed_sink_stops_loop() {
        let api = ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            secret: None,
        };
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);

        let handle = Box::new(PollTransport::new(Duration::from_millis(10))).spawn(api, tx);
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("poll loop should exit once the receiver is gone")
            .unwrap();
    }
}
