//! Update channel abstraction: the push side of the tracking server.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::EnvError;
use crate::types::{BatchUpdate, ChannelEvent, Cleanup, FlightId, FlightSnapshot, LogMessage};

/// Stream of server-pushed events.
///
/// # Event Flow
///
/// ```text
/// Server                     Channel                    Dashboard
///   |                           |                          |
///   |-- batch-update ---------->|                          |
///   |-- cleanup --------------->|                          |
///   |                           |-- recv() -> event ------>| (fully applied)
///   |                           |-- recv() -> event ------>| (fully applied)
/// ```
///
/// Events are delivered in send order; the receiver applies each one to
/// completion before asking for the next.
#[async_trait]
pub trait UpdateChannel: Send + 'static {
    /// Receives the next event.
    ///
    /// # Returns
    /// * `Some(event)` - An event was received
    /// * `None` - The channel was closed (disconnect)
    async fn recv(&mut self) -> Option<ChannelEvent>;
}

/// Decodes one raw `{"event": ..., "data": ...}` frame.
pub fn decode_event(frame: &str) -> Result<ChannelEvent, EnvError> {
    Ok(serde_json::from_str(frame)?)
}

/// Creates a bounded in-process update channel.
pub fn update_channel(capacity: usize) -> (UpdateSender, MpscUpdateChannel) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UpdateSender { tx }, MpscUpdateChannel { rx })
}

/// Producer half of the in-process channel.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::Sender<ChannelEvent>,
}

impl UpdateSender {
    /// Sends an event, waiting for capacity.
    pub async fn send(&self, event: ChannelEvent) -> Result<(), EnvError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| EnvError::transport("Update channel closed"))
    }

    /// Sends an event without waiting; fails when the buffer is full.
    pub fn try_send(&self, event: ChannelEvent) -> Result<(), EnvError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnvError::transport("Update channel full"),
            mpsc::error::TrySendError::Closed(_) => EnvError::transport("Update channel closed"),
        })
    }

    pub async fn send_batch(&self, flights: Vec<FlightSnapshot>) -> Result<(), EnvError> {
        self.send(ChannelEvent::BatchUpdate(BatchUpdate { flights })).await
    }

    pub async fn send_cleanup(&self, flight_ids: Vec<FlightId>) -> Result<(), EnvError> {
        self.send(ChannelEvent::Cleanup(Cleanup { flight_ids })).await
    }

    pub async fn send_log(&self, message: impl Into<String>) -> Result<(), EnvError> {
        self.send(ChannelEvent::Log(LogMessage {
            message: message.into(),
        }))
        .await
    }
}

/// Consumer half of the in-process channel.
#[derive(Debug)]
pub struct MpscUpdateChannel {
    rx: mpsc::Receiver<ChannelEvent>,
}

#[async_trait]
impl UpdateChannel for MpscUpdateChannel {
    async fn recv(&mut self) -> Option<ChannelEvent> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_preserves_order() {
        let (tx, mut rx) = update_channel(8);
        tx.send_batch(vec![FlightSnapshot::new("X", vec![])]).await.unwrap();
        tx.send_cleanup(vec!["X".to_string()]).await.unwrap();
        drop(tx);

        assert_eq!(rx.recv().await.map(|e| e.kind()), Some("batch-update"));
        assert_eq!(rx.recv().await.map(|e| e.kind()), Some("cleanup"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_try_send_reports_full_buffer() {
        let (tx, _rx) = update_channel(1);
        tx.try_send(ChannelEvent::Cleanup(Cleanup::default())).unwrap();
        let err = tx.try_send(ChannelEvent::Cleanup(Cleanup::default())).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_decode_event_keeps_good_flights_beside_bad_points() {
        let frame = r#"{"event": "batch-update", "data": {"flights": [
            {"flight_id": "good", "points": [[1, 2, 3, -1, -1]]},
            {"flight_id": "short", "points": [[1, 2]]},
            {"flight_id": "untimed", "points": [[1, 2, null, -1, -1]]}
        ]}}"#;

        let flights = match decode_event(frame).unwrap() {
            ChannelEvent::BatchUpdate(batch) => batch.flights,
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(flights.len(), 3);
        assert_eq!(flights[0].flight_id.as_deref(), Some("good"));
        assert_eq!(flights[0].rejected_points, 0);
        assert_eq!(flights[1].rejected_points, 1);
        assert!(!flights[2].points[0].is_valid());
    }

    #[test]
    fn test_decode_event_rejects_garbage() {
        assert!(matches!(decode_event("{not json"), Err(EnvError::Serialization(_))));
        let event = decode_event(r#"{"event": "log", "data": {"message": "hi"}}"#).unwrap();
        assert_eq!(event.kind(), "log");
    }
}
