//! Live-update broadcast channel.
//!
//! Samplers emit [`MonitorEvent`]s; every connected dashboard client receives
//! every event as a JSON text message.
//!
//! # Example
//!
//! ```ignore
//! let broadcaster = Broadcaster::new();
//! let mut client = broadcaster.subscribe();
//!
//! broadcaster.emit(&MonitorEvent::slow_query("p1", "SELECT 1", 1500.0, Utc::now()));
//!
//! while let Some(text) = client.recv().await {
//!     socket.send(text).await?;
//! }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Maximum number of messages buffered per client before it starts lagging.
const EVENT_BUFFER_SIZE: usize = 256;

/// Round to the two decimals the dashboard displays.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn iso_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// An event pushed to live-update clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    ResourceUpdate {
        #[serde(rename = "projectId")]
        project_id: String,
        data: ResourceUpdate,
    },
    DatabaseUpdate {
        #[serde(rename = "projectId")]
        project_id: String,
        data: DatabaseUpdate,
    },
    SlowQueryDetected {
        #[serde(rename = "projectId")]
        project_id: String,
        data: SlowQueryDetected,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceUpdate {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUpdate {
    pub size: f64,
    pub connections: i64,
    pub slow_queries: i64,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowQueryDetected {
    pub query: String,
    pub execution_time: f64,
    pub timestamp: String,
}

impl MonitorEvent {
    pub fn resource(
        project_id: &str,
        cpu: f64,
        memory: f64,
        disk: f64,
        at: DateTime<Utc>,
    ) -> Self {
        Self::ResourceUpdate {
            project_id: project_id.to_string(),
            data: ResourceUpdate {
                cpu: round2(cpu),
                memory: round2(memory),
                disk: round2(disk),
                timestamp: iso_timestamp(at),
            },
        }
    }

    pub fn database(
        project_id: &str,
        size_mb: f64,
        connections: i64,
        slow_queries: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self::DatabaseUpdate {
            project_id: project_id.to_string(),
            data: DatabaseUpdate {
                size: round2(size_mb),
                connections,
                slow_queries,
                timestamp: iso_timestamp(at),
            },
        }
    }

    pub fn slow_query(project_id: &str, query: &str, execution_time_ms: f64, at: DateTime<Utc>) -> Self {
        Self::SlowQueryDetected {
            project_id: project_id.to_string(),
            data: SlowQueryDetected {
                query: query.to_string(),
                execution_time: execution_time_ms,
                timestamp: iso_timestamp(at),
            },
        }
    }

    /// The `type` discriminator as sent on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResourceUpdate { .. } => "resource_update",
            Self::DatabaseUpdate { .. } => "database_update",
            Self::SlowQueryDetected { .. } => "slow_query_detected",
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            Self::ResourceUpdate { project_id, .. }
            | Self::DatabaseUpdate { project_id, .. }
            | Self::SlowQueryDetected { project_id, .. } => project_id,
        }
    }
}

/// Fan-out of serialized events to every live client.
#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<Arc<str>>,
}

impl Broadcaster {
    /// Create a broadcaster with no clients.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    /// Serialize `event` once and deliver it to every connected client.
    ///
    /// Returns the number of clients the message was queued for. Having no
    /// clients is not an error.
    pub fn emit(&self, event: &MonitorEvent) -> usize {
        let text: Arc<str> = match serde_json::to_string(event) {
            Ok(text) => text.into(),
            Err(e) => {
                warn!(event_type = event.kind(), error = %e, "Failed to serialize event");
                return 0;
            }
        };

        metrics::counter!("sonken_broadcast_messages_total", "type" => event.kind()).increment(1);
        debug!(event_type = event.kind(), project_id = event.project_id(), "Broadcasting event");

        // Err only means nobody is listening.
        self.sender.send(text).unwrap_or(0)
    }

    /// Register a new live client.
    pub fn subscribe(&self) -> LiveClient {
        metrics::gauge!("sonken_broadcast_clients").increment(1.0);
        LiveClient { receiver: self.sender.subscribe() }
    }

    /// Get the number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// One live client's view of the channel. Dropping it disconnects the client.
pub struct LiveClient {
    receiver: broadcast::Receiver<Arc<str>>,
}

impl LiveClient {
    /// Receive the next message, or `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        loop {
            match self.receiver.recv().await {
                Ok(text) => return Some(text),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Live client lagged by {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        metrics::gauge!("sonken_broadcast_clients").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn next(client: &mut LiveClient) -> serde_json::Value {
        let text = tokio::time::timeout(Duration::from_millis(100), client.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_emit_reaches_every_client() {
        let broadcaster = Broadcaster::new();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        let delivered =
            broadcaster.emit(&MonitorEvent::resource("p1", 12.346, 50.0, 70.0, Utc::now()));
        assert_eq!(delivered, 2);

        for client in [&mut a, &mut b] {
            let msg = next(client).await;
            assert_eq!(msg["type"], "resource_update");
            assert_eq!(msg["projectId"], "p1");
            assert_eq!(msg["data"]["cpu"], 12.35);
        }
    }

    #[tokio::test]
    async fn test_emit_without_clients_is_fine() {
        let broadcaster = Broadcaster::new();
        assert_eq!(broadcaster.emit(&MonitorEvent::slow_query("p1", "q", 1.0, Utc::now())), 0);
    }

    #[tokio::test]
    async fn test_disconnected_client_does_not_block_others() {
        let broadcaster = Broadcaster::new();
        let mut stays = broadcaster.subscribe();
        let leaves = broadcaster.subscribe();
        assert_eq!(broadcaster.client_count(), 2);

        drop(leaves);
        assert_eq!(broadcaster.client_count(), 1);

        let delivered = broadcaster.emit(&MonitorEvent::database("p1", 3.14159, 4, 1, Utc::now()));
        assert_eq!(delivered, 1);

        let msg = next(&mut stays).await;
        assert_eq!(msg["type"], "database_update");
        assert_eq!(msg["data"]["size"], 3.14);
        assert_eq!(msg["data"]["connections"], 4);
        assert_eq!(msg["data"]["slowQueries"], 1);
    }

    #[test]
    fn test_slow_query_wire_format() {
        let event = MonitorEvent::slow_query("p1", "SELECT * FROM t", 1500.0, Utc::now());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "slow_query_detected");
        assert_eq!(value["data"]["query"], "SELECT * FROM t");
        assert_eq!(value["data"]["executionTime"], 1500.0);
        assert!(value["data"]["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(event.kind(), "slow_query_detected");
    }
}
