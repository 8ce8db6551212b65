use super::role::Role;
use crate::error::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Source of role definitions.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Look up a role by name. `Ok(None)` when no such role exists.
    async fn get_role(&self, name: &str) -> Result<Option<Role>>;
}

/// Roles stored in Postgres (`roles`, `permissions`, `role_permissions`).
#[derive(Clone)]
pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn get_role(&self, name: &str) -> Result<Option<Role>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT r.name, p.name
            FROM roles r
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            WHERE r.name = $1
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        let Some((role_name, _)) = rows.first() else {
            return Ok(None);
        };

        Ok(Some(Role::new(
            role_name.clone(),
            rows.iter().filter_map(|(_, permission)| permission.clone()),
        )))
    }
}

/// Role table held in memory. Used for local runs and tests.
#[derive(Default)]
pub struct InMemoryRoleStore {
    roles: RwLock<HashMap<String, Role>>,
}

impl InMemoryRoleStore {
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: RwLock::new(
                roles
                    .into_iter()
                    .map(|role| (role.name.clone(), role))
                    .collect(),
            ),
        }
    }

    /// Insert or replace a role.
    pub async fn upsert(&self, role: Role) {
        self.roles.write().await.insert(role.name.clone(), role);
    }

    pub async fn remove(&self, name: &str) -> Option<Role> {
        self.roles.write().await.remove(name)
    }
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
    async fn get_role(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.roles.read().await.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_lookup() {
        let store = InMemoryRoleStore::new([Role::new("teller", ["deposit:create"])]);

        let role = store.get_role("teller").await.unwrap().unwrap();
        assert!(role.has_permission("deposit:create"));
        assert!(store.get_role("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_upsert_replaces() {
        let store = InMemoryRoleStore::default();
        store.upsert(Role::new("teller", ["deposit:create"])).await;
        store.upsert(Role::new("teller", ["loan:approve"])).await;

        let role = store.get_role("teller").await.unwrap().unwrap();
        assert!(!role.has_permission("deposit:create"));
        assert!(role.has_permission("loan:approve"));

        assert!(store.remove("teller").await.is_some());
        assert!(store.get_role("teller").await.unwrap().is_none());
    }
}
