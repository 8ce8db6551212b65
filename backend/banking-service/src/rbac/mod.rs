//! Role-based access control.
//!
//! Roles map to sets of permission strings. A role holding
//! [`permissions::ADMIN_ALL`] is granted everything.

pub mod cache;
pub mod checker;
pub mod permissions;
pub mod role;
pub mod store;

pub use cache::CachedRoleStore;
pub use checker::{PermissionChecker, PermissionDecision};
pub use role::{authorize, Role};
pub use store::{InMemoryRoleStore, PgRoleStore, RoleStore};
