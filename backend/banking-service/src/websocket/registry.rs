/// WebSocket Connection Registry
///
/// Tracks live connections per principal and routes notifications to them.
/// Supports:
/// - Multiple concurrent connections per principal (multi-device)
/// - Targeted delivery to one principal
/// - Broadcast to every connection of one kind, or to everyone
/// - Pruning of connections whose send failed
/// - Explicit shutdown that drops every connection
use super::messages::Notification;
use super::sink::{Connection, ConnectionId};
use crate::metrics;
use crate::models::{IdentityKind, Principal};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Inner {
    by_principal: HashMap<Principal, Vec<Connection>>,
    owners: HashMap<ConnectionId, Principal>,
}

impl Inner {
    fn detach(&mut self, principal: Principal, id: ConnectionId) -> bool {
        let Some(bucket) = self.by_principal.get_mut(&principal) else {
            return false;
        };

        let before = bucket.len();
        bucket.retain(|conn| conn.id() != id);
        let removed = bucket.len() != before;

        if bucket.is_empty() {
            self.by_principal.remove(&principal);
        }
        removed
    }

    fn count_kind(&self, kind: IdentityKind) -> usize {
        self.by_principal
            .iter()
            .filter(|(principal, _)| principal.kind == kind)
            .map(|(_, conns)| conns.len())
            .sum()
    }

    fn publish_gauges(&self) {
        for kind in IdentityKind::ALL {
            metrics::set_active_connections(kind, self.count_kind(kind));
        }
    }
}

/// Registry of active WebSocket connections.
///
/// Thread-safe: one `RwLock` guards the principal -> connections mapping.
/// Sends are never performed while the lock is held. Targets are
/// snapshotted under the read lock, written to outside of it, and
/// connections whose send failed are pruned under the write lock.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a principal
    ///
    /// A principal may hold any number of connections. A connection id
    /// already registered under another principal is moved.
    ///
    /// # Arguments
    ///
    /// * `principal` - Owner of the connection
    /// * `connection` - The connection to add
    pub async fn register(&self, principal: Principal, connection: Connection) {
        let id = connection.id();
        let mut inner = self.inner.write().await;

        if let Some(previous) = inner.owners.insert(id, principal) {
            inner.detach(previous, id);
            if previous != principal {
                debug!(connection_id = %id, from = %previous, to = %principal, "connection moved");
            }
        }

        inner
            .by_principal
            .entry(principal)
            .or_default()
            .push(connection);
        inner.publish_gauges();

        info!(
            principal = %principal,
            connection_id = %id,
            connections = inner.by_principal.get(&principal).map_or(0, Vec::len),
            "websocket connection registered"
        );
    }

    /// Remove exactly one connection of a principal
    ///
    /// No-op when the connection is not registered under that principal.
    /// Returns whether something was removed.
    pub async fn unregister(&self, principal: Principal, connection_id: ConnectionId) -> bool {
        let mut inner = self.inner.write().await;

        if inner.owners.get(&connection_id) != Some(&principal) {
            return false;
        }

        inner.owners.remove(&connection_id);
        let removed = inner.detach(principal, connection_id);
        inner.publish_gauges();

        if removed {
            info!(principal = %principal, connection_id = %connection_id, "websocket connection unregistered");
        }
        removed
    }

    /// Send a notification to every connection of a principal
    ///
    /// Returns the number of connections the notification reached.
    /// Connections whose send failed are removed and not counted.
    pub async fn notify(&self, principal: Principal, notification: &Notification) -> usize {
        let targets = {
            let inner = self.inner.read().await;
            inner
                .by_principal
                .get(&principal)
                .map(|conns| {
                    conns
                        .iter()
                        .map(|conn| (principal, conn.clone()))
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        if targets.is_empty() {
            debug!(principal = %principal, event = notification.event_type(), "no live connections");
        }

        self.deliver(targets, notification).await
    }

    /// Send a notification to every connection of the given kind
    pub async fn broadcast(&self, kind: IdentityKind, notification: &Notification) -> usize {
        let targets = self.snapshot(|principal| principal.kind == kind).await;
        self.deliver(targets, notification).await
    }

    /// Send a notification to every registered connection
    pub async fn broadcast_all(&self, notification: &Notification) -> usize {
        let targets = self.snapshot(|_| true).await;
        self.deliver(targets, notification).await
    }

    /// Number of live connections for a principal
    pub async fn connection_count(&self, principal: Principal) -> usize {
        let inner = self.inner.read().await;
        inner.by_principal.get(&principal).map_or(0, Vec::len)
    }

    /// Number of live connections across all principals
    pub async fn total_connections(&self) -> usize {
        let inner = self.inner.read().await;
        inner.owners.len()
    }

    /// Principals of a kind holding at least one connection, ordered by id
    pub async fn connected_principals(&self, kind: IdentityKind) -> Vec<Principal> {
        let inner = self.inner.read().await;
        let mut principals: Vec<Principal> = inner
            .by_principal
            .keys()
            .filter(|principal| principal.kind == kind)
            .copied()
            .collect();
        principals.sort_by_key(|principal| principal.id);
        principals
    }

    /// Drop every connection
    ///
    /// Dropping a connection closes its sink, which ends the session
    /// writing to the socket. Returns how many connections were dropped.
    pub async fn shutdown(&self) -> usize {
        let mut inner = self.inner.write().await;
        let closed = inner.owners.len();

        inner.by_principal.clear();
        inner.owners.clear();
        inner.publish_gauges();

        info!(closed, "connection registry shut down");
        closed
    }

    async fn snapshot<F>(&self, filter: F) -> Vec<(Principal, Connection)>
    where
        F: Fn(&Principal) -> bool,
    {
        let inner = self.inner.read().await;
        inner
            .by_principal
            .iter()
            .filter(|(principal, _)| filter(principal))
            .flat_map(|(principal, conns)| conns.iter().map(move |conn| (*principal, conn.clone())))
            .collect()
    }

    async fn deliver(&self, targets: Vec<(Principal, Connection)>, notification: &Notification) -> usize {
        if targets.is_empty() {
            return 0;
        }

        let text = match notification.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(event = notification.event_type(), error = %e, "dropping notification");
                return 0;
            }
        };

        let results = join_all(targets.into_iter().map(|(principal, conn)| {
            let text = text.clone();
            async move {
                let ok = conn.send_text(text).await.is_ok();
                (principal, conn.id(), ok)
            }
        }))
        .await;

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (principal, id, ok) in results {
            if ok {
                delivered += 1;
            } else {
                failed.push((principal, id));
            }
        }

        metrics::record_notification(notification.event_type(), delivered, failed.len());

        if !failed.is_empty() {
            self.prune(&failed).await;
        }

        delivered
    }

    async fn prune(&self, failed: &[(Principal, ConnectionId)]) {
        let mut inner = self.inner.write().await;
        for (principal, id) in failed {
            // The connection may have been re-registered elsewhere meanwhile.
            if inner.owners.get(id) == Some(principal) {
                inner.owners.remove(id);
                inner.detach(*principal, *id);
                warn!(principal = %principal, connection_id = %id, "removed dead websocket connection");
            }
        }
        inner.publish_gauges();
    }
}
