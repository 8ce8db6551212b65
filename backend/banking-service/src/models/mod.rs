use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of account an identity belongs to.
///
/// Customers and back-office staff live in separate id spaces, so the
/// kind is always carried next to the numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    User,
    Admin,
}

impl IdentityKind {
    pub const ALL: [IdentityKind; 2] = [IdentityKind::User, IdentityKind::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::User => "user",
            IdentityKind::Admin => "admin",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "users" => Ok(IdentityKind::User),
            "admin" | "admins" => Ok(IdentityKind::Admin),
            other => Err(format!("unknown identity kind '{}'", other)),
        }
    }
}

/// Registry key: the `(kind, id)` pair of an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub kind: IdentityKind,
    pub id: i64,
}

impl Principal {
    pub fn new(kind: IdentityKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn user(id: i64) -> Self {
        Self::new(IdentityKind::User, id)
    }

    pub fn admin(id: i64) -> Self {
        Self::new(IdentityKind::Admin, id)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Authenticated caller as decoded from an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub kind: IdentityKind,
    /// Role name; only admins carry one.
    pub role: Option<String>,
}

impl Identity {
    pub fn user(id: i64) -> Self {
        Self {
            id,
            kind: IdentityKind::User,
            role: None,
        }
    }

    pub fn admin(id: i64, role: impl Into<String>) -> Self {
        Self {
            id,
            kind: IdentityKind::Admin,
            role: Some(role.into()),
        }
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.kind, self.id)
    }

    pub fn is_admin(&self) -> bool {
        self.kind == IdentityKind::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_display() {
        assert_eq!(Principal::user(5).to_string(), "user:5");
        assert_eq!(Principal::admin(7).to_string(), "admin:7");
    }

    #[test]
    fn test_same_id_different_kind_are_distinct() {
        assert_ne!(Principal::user(5), Principal::admin(5));
    }

    #[test]
    fn test_kind_from_path_segment() {
        assert_eq!("users".parse::<IdentityKind>().unwrap(), IdentityKind::User);
        assert_eq!("Admin".parse::<IdentityKind>().unwrap(), IdentityKind::Admin);
        assert!("teller".parse::<IdentityKind>().is_err());
    }

    #[test]
    fn test_identity_principal() {
        let identity = Identity::admin(3, "teller");
        assert!(identity.is_admin());
        assert_eq!(identity.principal(), Principal::admin(3));
        assert_eq!(identity.role.as_deref(), Some("teller"));
    }
}
