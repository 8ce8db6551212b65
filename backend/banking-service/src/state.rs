use crate::auth::TokenService;
use crate::config::WebSocketConfig;
use crate::events::EventEmitter;
use crate::middleware::RateLimiter;
use crate::rbac::PermissionChecker;
use crate::websocket::ConnectionRegistry;
use std::sync::Arc;

/// Shared handles passed to every handler through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub checker: PermissionChecker,
    pub tokens: Arc<TokenService>,
    /// Queue for domain events (transfers, deposits, withdrawals).
    ///
    /// The admin endpoints answer with a delivery count and so call the
    /// registry directly. Handlers that complete banking operations report
    /// them here instead, so a slow socket never holds up the request.
    pub events: EventEmitter,
    pub websocket: WebSocketConfig,
    /// `None` disables request limiting.
    pub rate_limiter: Option<RateLimiter>,
}
