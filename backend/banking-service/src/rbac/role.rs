use super::permissions::ADMIN_ALL;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Named set of permission strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: BTreeSet<String>,
}

impl Role {
    pub fn new<I, S>(name: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// Holds the `admin-all` wildcard.
    pub fn is_unrestricted(&self) -> bool {
        self.permissions.contains(ADMIN_ALL)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        authorize(self, permission)
    }
}

/// A role grants a permission iff it lists it or is unrestricted.
pub fn authorize(role: &Role, permission: &str) -> bool {
    role.is_unrestricted() || role.permissions.contains(permission)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_permission_granted() {
        let teller = Role::new("teller", ["deposit:create"]);
        assert!(authorize(&teller, "deposit:create"));
        assert!(!authorize(&teller, "loan:approve"));
    }

    #[test]
    fn test_unrestricted_role_grants_anything() {
        let root = Role::new("super_admin", [ADMIN_ALL]);
        assert!(root.is_unrestricted());
        assert!(authorize(&root, "loan:approve"));
        assert!(authorize(&root, "anything:at-all"));
    }

    #[test]
    fn test_empty_role_grants_nothing() {
        let role = Role::new("auditor", Vec::<String>::new());
        assert!(!role.has_permission("transaction:view_all"));
        assert!(!role.has_permission(""));
    }

    #[test]
    fn test_permission_match_is_exact() {
        let role = Role::new("support", ["notification:send"]);
        assert!(!role.has_permission("notification:sen"));
        assert!(!role.has_permission("Notification:Send"));
    }
}
