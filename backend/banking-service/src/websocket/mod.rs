/// WebSocket real-time notification system
///
/// Architecture:
/// 1. ConnectionRegistry: tracks live connections per principal
/// 2. Connection / NotificationSink: channel handle the registry writes to
/// 3. WsSession: actix actor owning the socket and draining its channel
pub mod messages;
pub mod registry;
pub mod session;
pub mod sink;

pub use messages::{Notification, NotificationError, CONNECTION_STATUS};
pub use registry::ConnectionRegistry;
pub use session::WsSession;
pub use sink::{Connection, ConnectionId, NotificationSink, SinkClosed};
