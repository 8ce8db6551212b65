/// Notification payloads pushed over WebSocket connections
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Type tag of the frame sent right after a successful handshake.
pub const CONNECTION_STATUS: &str = "connection_status";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification type must not be empty")]
    EmptyType,

    #[error("notification data must be a JSON object")]
    DataNotObject,

    #[error("failed to encode notification: {0}")]
    Encode(String),
}

/// A typed, timestamped JSON event.
///
/// Wire shape: `{"type": "...", "data": {...}, "timestamp": "<RFC 3339>"}`.
/// Only constructed through [`Notification::new`], which guarantees a
/// non-empty type tag and an object payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    event_type: String,
    data: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

impl Notification {
    /// Create a notification stamped with the current time.
    pub fn new(event_type: impl Into<String>, data: Value) -> Result<Self, NotificationError> {
        Self::with_timestamp(event_type, data, Utc::now())
    }

    pub fn with_timestamp(
        event_type: impl Into<String>,
        data: Value,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, NotificationError> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(NotificationError::EmptyType);
        }

        let data = match data {
            Value::Object(map) => map,
            _ => return Err(NotificationError::DataNotObject),
        };

        Ok(Self {
            event_type,
            data,
            timestamp,
        })
    }

    /// Frame sent to a socket once it has been registered.
    pub fn connection_status(entity_id: i64) -> Self {
        Self {
            event_type: CONNECTION_STATUS.to_string(),
            data: match json!({ "status": "connected", "entity_id": entity_id }) {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Serialize to the text frame written on the socket.
    pub fn to_text(&self) -> Result<String, NotificationError> {
        serde_json::to_string(self).map_err(|e| NotificationError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_type() {
        let err = Notification::new("  ", json!({})).unwrap_err();
        assert_eq!(err, NotificationError::EmptyType);
    }

    #[test]
    fn test_rejects_non_object_data() {
        assert_eq!(
            Notification::new("deposit_completed", json!([1, 2])).unwrap_err(),
            NotificationError::DataNotObject
        );
        assert_eq!(
            Notification::new("deposit_completed", Value::Null).unwrap_err(),
            NotificationError::DataNotObject
        );
    }

    #[test]
    fn test_wire_shape() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let n = Notification::with_timestamp("deposit_completed", json!({"amount": 100.0}), ts)
            .unwrap();

        let value: Value = serde_json::from_str(&n.to_text().unwrap()).unwrap();
        assert_eq!(value["type"], "deposit_completed");
        assert_eq!(value["data"]["amount"], 100.0);
        assert_eq!(value["timestamp"], "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_connection_status_frame() {
        let n = Notification::connection_status(42);
        assert_eq!(n.event_type(), CONNECTION_STATUS);
        assert_eq!(n.data()["status"], "connected");
        assert_eq!(n.data()["entity_id"], 42);
    }
}
