//! Permission names known to the service.
//!
//! The checker treats permissions as opaque strings; these constants exist
//! so handlers and the seed migration agree on spelling.

/// Wildcard: a role holding it is granted every permission.
pub const ADMIN_ALL: &str = "admin-all";

pub const NOTIFICATION_SEND: &str = "notification:send";
pub const NOTIFICATION_BROADCAST: &str = "notification:broadcast";
pub const NOTIFICATION_VIEW: &str = "notification:view";

pub const DEPOSIT_CREATE: &str = "deposit:create";
pub const DEPOSIT_MANAGE: &str = "deposit:manage";
pub const LOAN_APPROVE: &str = "loan:approve";
pub const LOAN_VIEW_ALL: &str = "loan:view_all";
pub const CARD_MANAGE: &str = "card:manage";
pub const TRANSACTION_VIEW_ALL: &str = "transaction:view_all";
pub const USER_APPROVE: &str = "user:approve";
pub const ANALYTICS_VIEW: &str = "analytics:view";

/// Every permission above, wildcard included.
pub const KNOWN: &[&str] = &[
    ADMIN_ALL,
    NOTIFICATION_SEND,
    NOTIFICATION_BROADCAST,
    NOTIFICATION_VIEW,
    DEPOSIT_CREATE,
    DEPOSIT_MANAGE,
    LOAN_APPROVE,
    LOAN_VIEW_ALL,
    CARD_MANAGE,
    TRANSACTION_VIEW_ALL,
    USER_APPROVE,
    ANALYTICS_VIEW,
];

pub fn is_known(permission: &str) -> bool {
    KNOWN.contains(&permission)
}
