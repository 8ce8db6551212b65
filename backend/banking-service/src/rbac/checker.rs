use super::role::{authorize, Role};
use super::store::RoleStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::Identity;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a single permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionDecision {
    pub granted: bool,
    pub role: Option<String>,
    pub permission: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
}

impl PermissionDecision {
    fn granted(role: &str, permission: &str) -> Self {
        Self {
            granted: true,
            role: Some(role.to_string()),
            permission: permission.to_string(),
            denial_reason: None,
        }
    }

    fn denied(role: Option<&str>, permission: &str) -> Self {
        Self {
            granted: false,
            role: role.map(str::to_string),
            permission: permission.to_string(),
            denial_reason: Some(denial_message(role.unwrap_or("none"), permission)),
        }
    }
}

pub fn denial_message(role: &str, permission: &str) -> String {
    format!("Permission '{}' denied for role '{}'", permission, role)
}

/// Decides whether a role may perform an action.
///
/// Role definitions come from a [`RoleStore`]. A role that cannot be
/// resolved, for any reason, grants nothing.
#[derive(Clone)]
pub struct PermissionChecker {
    store: Arc<dyn RoleStore>,
}

impl PermissionChecker {
    pub fn new(store: Arc<dyn RoleStore>) -> Self {
        Self { store }
    }

    /// Resolve a role, folding every failure into `None`.
    async fn resolve(&self, role_name: &str) -> Option<Role> {
        match self.store.get_role(role_name).await {
            Ok(Some(role)) => Some(role),
            Ok(None) => {
                warn!(role = role_name, "unknown role referenced");
                None
            }
            Err(e) => {
                warn!(role = role_name, error = %e, "role lookup failed, denying");
                None
            }
        }
    }

    /// True iff the role exists and grants the permission.
    pub async fn authorize(&self, role_name: &str, permission: &str) -> bool {
        self.check(role_name, permission).await.granted
    }

    /// True iff the role grants every listed permission.
    pub async fn authorize_all(&self, role_name: &str, permissions: &[&str]) -> bool {
        let Some(role) = self.resolve(role_name).await else {
            return false;
        };
        permissions.iter().all(|p| authorize(&role, p))
    }

    pub async fn check(&self, role_name: &str, permission: &str) -> PermissionDecision {
        let decision = match self.resolve(role_name).await {
            Some(role) if authorize(&role, permission) => {
                PermissionDecision::granted(&role.name, permission)
            }
            _ => PermissionDecision::denied(Some(role_name), permission),
        };

        metrics::record_authorization(permission, decision.granted);
        debug!(role = role_name, permission, granted = decision.granted, "permission check");
        decision
    }

    /// Decision for an authenticated identity; a missing role is denied.
    pub async fn check_identity(&self, identity: &Identity, permission: &str) -> PermissionDecision {
        match identity.role.as_deref() {
            Some(role_name) => self.check(role_name, permission).await,
            None => {
                warn!(principal = %identity.principal(), "identity carries no role");
                metrics::record_authorization(permission, false);
                PermissionDecision::denied(None, permission)
            }
        }
    }

    /// Guard for admin endpoints.
    ///
    /// Non-admins get `Admin access required`; admins lacking the
    /// permission get the denial reason.
    pub async fn require(&self, identity: &Identity, permission: &str) -> Result<()> {
        if !identity.is_admin() {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }

        let decision = self.check_identity(identity, permission).await;
        if decision.granted {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                decision
                    .denial_reason
                    .unwrap_or_else(|| denial_message("none", permission)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::permissions::ADMIN_ALL;
    use crate::rbac::store::InMemoryRoleStore;
    use async_trait::async_trait;

    struct FailingStore;

    #[async_trait]
    impl RoleStore for FailingStore {
        async fn get_role(&self, _name: &str) -> Result<Option<Role>> {
            Err(AppError::Database("connection refused".into()))
        }
    }

    fn checker() -> PermissionChecker {
        PermissionChecker::new(Arc::new(InMemoryRoleStore::new([
            Role::new("teller", ["deposit:create"]),
            Role::new("loan_officer", ["loan:approve", "loan:view_all"]),
            Role::new("super_admin", [ADMIN_ALL]),
        ])))
    }

    #[tokio::test]
    async fn test_teller_scenario() {
        let checker = checker();
        assert!(checker.authorize("teller", "deposit:create").await);
        assert!(!checker.authorize("teller", "loan:approve").await);
    }

    #[tokio::test]
    async fn test_unrestricted_role() {
        assert!(checker().authorize("super_admin", "loan:approve").await);
    }

    #[tokio::test]
    async fn test_unknown_role_denied() {
        assert!(!checker().authorize("ghost", "deposit:create").await);
    }

    #[tokio::test]
    async fn test_store_failure_denies() {
        let checker = PermissionChecker::new(Arc::new(FailingStore));
        assert!(!checker.authorize("super_admin", "anything").await);
        let decision = checker.check("super_admin", "anything").await;
        assert!(!decision.granted);
    }

    #[tokio::test]
    async fn test_authorize_all() {
        let checker = checker();
        assert!(checker.authorize_all("loan_officer", &["loan:approve", "loan:view_all"]).await);
        assert!(!checker.authorize_all("loan_officer", &["loan:approve", "card:manage"]).await);
        assert!(checker.authorize_all("loan_officer", &[]).await);
        assert!(!checker.authorize_all("ghost", &[]).await);
    }

    #[tokio::test]
    async fn test_denial_reason() {
        let decision = checker().check("teller", "loan:approve").await;
        assert_eq!(
            decision.denial_reason.as_deref(),
            Some("Permission 'loan:approve' denied for role 'teller'")
        );
    }

    #[tokio::test]
    async fn test_require_rejects_users() {
        let err = checker()
            .require(&Identity::user(1), "deposit:create")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Admin access required");
    }

    #[tokio::test]
    async fn test_require_admin_without_role() {
        let identity = Identity {
            id: 2,
            kind: crate::models::IdentityKind::Admin,
            role: None,
        };
        assert!(checker().require(&identity, "deposit:create").await.is_err());
    }

    #[tokio::test]
    async fn test_require_grants_and_denies() {
        let checker = checker();
        let teller = Identity::admin(3, "teller");
        assert!(checker.require(&teller, "deposit:create").await.is_ok());

        let err = checker.require(&teller, "loan:approve").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(ref m) if m.contains("loan:approve")));
    }
}
