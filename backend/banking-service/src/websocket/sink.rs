use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The receiving end of a connection is gone.
#[derive(Debug, Error)]
#[error("connection sink closed")]
pub struct SinkClosed;

/// Transport handle the registry writes serialized notifications into.
///
/// The socket itself stays with the networking layer; the registry only
/// ever sees this sink.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), SinkClosed>;
}

#[async_trait]
impl NotificationSink for mpsc::UnboundedSender<String> {
    async fn send_text(&self, text: String) -> Result<(), SinkClosed> {
        self.send(text).map_err(|_| SinkClosed)
    }
}

#[async_trait]
impl NotificationSink for mpsc::Sender<String> {
    async fn send_text(&self, text: String) -> Result<(), SinkClosed> {
        self.send(text).await.map_err(|_| SinkClosed)
    }
}

/// Unique id of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A registered connection: its id plus the sink frames are written to.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    sink: Arc<dyn NotificationSink>,
}

impl Connection {
    pub fn new(sink: impl NotificationSink + 'static) -> Self {
        Self::with_id(ConnectionId::new(), sink)
    }

    pub fn with_id(id: ConnectionId, sink: impl NotificationSink + 'static) -> Self {
        Self {
            id,
            sink: Arc::new(sink),
        }
    }

    /// Connection backed by an unbounded channel, returning the receiving half.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub async fn send_text(&self, text: String) -> Result<(), SinkClosed> {
        self.sink.send_text(text).await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unbounded_sink_delivers() {
        let (conn, mut rx) = Connection::channel();
        conn.send_text("hello".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_dropped_receiver_reports_closed() {
        let (conn, rx) = Connection::channel();
        drop(rx);
        assert!(conn.send_text("hello".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_bounded_sink() {
        let (tx, mut rx) = mpsc::channel::<String>(4);
        let conn = Connection::new(tx);
        conn.send_text("a".to_string()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("a"));

        drop(rx);
        assert!(conn.send_text("b".to_string()).await.is_err());
    }
}
