//! Fire-and-forget event emission.
//!
//! Business code pushes events onto a bounded queue; a single dispatcher
//! task drains it into the [`ConnectionRegistry`]. Emission never blocks
//! and never fails the caller: when the queue is full or the dispatcher is
//! gone the event is dropped and logged.

pub mod banking;

use crate::metrics;
use crate::models::{IdentityKind, Principal};
use crate::websocket::{ConnectionRegistry, Notification};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use banking::{DepositCompleted, TransferCompleted, WithdrawalCompleted};

/// Who an event is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    User(i64),
    Admin(i64),
    Kind(IdentityKind),
    Everyone,
}

impl EventTarget {
    pub fn principal(principal: Principal) -> Self {
        match principal.kind {
            IdentityKind::User => EventTarget::User(principal.id),
            IdentityKind::Admin => EventTarget::Admin(principal.id),
        }
    }
}

#[derive(Debug)]
struct Event {
    target: EventTarget,
    notification: Notification,
}

/// Create a connected emitter/dispatcher pair.
pub fn channel(capacity: usize, registry: ConnectionRegistry) -> (EventEmitter, EventDispatcher) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventEmitter { tx }, EventDispatcher { rx, registry })
}

/// Producer side; cheap to clone.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<Event>,
}

impl EventEmitter {
    /// Queue a notification. Returns whether it was accepted.
    pub fn emit(&self, target: EventTarget, notification: Notification) -> bool {
        let event_type = notification.event_type().to_string();
        match self.tx.try_send(Event {
            target,
            notification,
        }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event = %event_type, ?target, "event queue full, dropping event");
                metrics::record_event_dropped("full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(event = %event_type, ?target, "event dispatcher stopped, dropping event");
                metrics::record_event_dropped("closed");
                false
            }
        }
    }

    /// `money_sent` to the sender and `money_received` to the receiver.
    pub fn transfer_completed(&self, transfer: &TransferCompleted) {
        self.emit_built(EventTarget::User(transfer.sender_id), banking::money_sent(transfer));
        self.emit_built(EventTarget::User(transfer.receiver_id), banking::money_received(transfer));
    }

    /// `deposit_completed` to the user and `deposit_processed` to all admins.
    pub fn deposit_completed(&self, deposit: &DepositCompleted) {
        self.emit_built(EventTarget::User(deposit.user_id), banking::deposit_completed(deposit));
        self.emit_built(
            EventTarget::Kind(IdentityKind::Admin),
            banking::deposit_processed(deposit),
        );
    }

    pub fn withdrawal_completed(&self, withdrawal: &WithdrawalCompleted) {
        self.emit_built(
            EventTarget::User(withdrawal.user_id),
            banking::atm_withdrawal_completed(withdrawal),
        );
    }

    fn emit_built(
        &self,
        target: EventTarget,
        notification: Result<Notification, crate::websocket::NotificationError>,
    ) {
        match notification {
            Ok(notification) => {
                self.emit(target, notification);
            }
            Err(e) => warn!(?target, error = %e, "failed to build event"),
        }
    }
}

/// Consumer side; run it on its own task.
pub struct EventDispatcher {
    rx: mpsc::Receiver<Event>,
    registry: ConnectionRegistry,
}

impl EventDispatcher {
    /// Deliver queued events in order until every emitter is dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            let delivered = match event.target {
                EventTarget::User(id) => {
                    self.registry
                        .notify(Principal::user(id), &event.notification)
                        .await
                }
                EventTarget::Admin(id) => {
                    self.registry
                        .notify(Principal::admin(id), &event.notification)
                        .await
                }
                EventTarget::Kind(kind) => {
                    self.registry.broadcast(kind, &event.notification).await
                }
                EventTarget::Everyone => self.registry.broadcast_all(&event.notification).await,
            };

            debug!(
                event = event.notification.event_type(),
                target = ?event.target,
                delivered,
                "event dispatched"
            );
        }

        debug!("event dispatcher finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::Connection;
    use serde_json::{json, Value};

    fn note(kind: &str) -> Notification {
        Notification::new(kind, json!({})).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_in_order() {
        let registry = ConnectionRegistry::new();
        let (conn, mut rx) = Connection::channel();
        registry.register(Principal::user(1), conn).await;

        let (emitter, dispatcher) = channel(16, registry.clone());
        assert!(emitter.emit(EventTarget::User(1), note("first")));
        assert!(emitter.emit(EventTarget::User(1), note("second")));
        assert!(emitter.emit(EventTarget::User(2), note("elsewhere")));
        drop(emitter);

        dispatcher.run().await;

        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["type"], "first");
        assert_eq!(second["type"], "second");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let (emitter, _dispatcher) = channel(1, ConnectionRegistry::new());
        assert!(emitter.emit(EventTarget::Everyone, note("a")));
        assert!(!emitter.emit(EventTarget::Everyone, note("b")));
    }

    #[tokio::test]
    async fn test_closed_queue_drops() {
        let (emitter, dispatcher) = channel(4, ConnectionRegistry::new());
        drop(dispatcher);
        assert!(!emitter.emit(EventTarget::Everyone, note("a")));
    }

    #[tokio::test]
    async fn test_deposit_reaches_user_and_admins() {
        let registry = ConnectionRegistry::new();
        let (user_conn, mut user_rx) = Connection::channel();
        let (admin_conn, mut admin_rx) = Connection::channel();
        registry.register(Principal::user(7), user_conn).await;
        registry.register(Principal::admin(1), admin_conn).await;

        let (emitter, dispatcher) = channel(16, registry);
        emitter.deposit_completed(&DepositCompleted {
            user_id: 7,
            admin_id: 1,
            amount: 250.0,
            balance: 1250.0,
            reference: "DEP-001".to_string(),
            created_at: chrono::Utc::now(),
        });
        drop(emitter);
        dispatcher.run().await;

        let to_user: Value = serde_json::from_str(&user_rx.recv().await.unwrap()).unwrap();
        assert_eq!(to_user["type"], "deposit_completed");
        let to_admin: Value = serde_json::from_str(&admin_rx.recv().await.unwrap()).unwrap();
        assert_eq!(to_admin["type"], "deposit_processed");
        assert_eq!(to_admin["data"]["user_id"], 7);
    }

    #[test]
    fn test_target_from_principal() {
        assert_eq!(EventTarget::principal(Principal::admin(3)), EventTarget::Admin(3));
        assert_eq!(EventTarget::principal(Principal::user(3)), EventTarget::User(3));
    }
}
