pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod rbac;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::{Identity, IdentityKind, Principal};
pub use rbac::PermissionChecker;
pub use state::AppState;
pub use websocket::{ConnectionRegistry, Notification};
