//! Permission catalog records and group associations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use veto_core::{GroupId, PermissionId, UserId};

use crate::code::PermissionCode;
use crate::store::{PermissionStore, StoreError};

/// A registered permission.
///
/// Rows are created at registration/seed time and are effectively immutable
/// thereafter. System permissions are protected from removal through
/// non-privileged flows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub code: PermissionCode,
    pub is_system: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(code: PermissionCode) -> Self {
        Self {
            id: PermissionId::new(),
            code,
            is_system: false,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn system(code: PermissionCode) -> Self {
        Self {
            is_system: true,
            ..Self::new(code)
        }
    }

    pub fn module(&self) -> &str {
        self.code.module()
    }

    pub fn resource(&self) -> &str {
        self.code.resource()
    }

    pub fn action(&self) -> &str {
        self.code.action()
    }
}

/// A named bundle of permissions, granted to users via membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroup {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PermissionGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            description: None,
            created_at: Utc::now(),
        }
    }
}

/// A user's membership in a group. Create/delete lifecycle only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub added_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: UserId, group_id: GroupId) -> Self {
        Self {
            user_id,
            group_id,
            added_at: Utc::now(),
        }
    }
}

/// A permission granted to a group. Create/delete lifecycle only; a user
/// holds every permission granted to any group they belong to (union).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupGrant {
    pub group_id: GroupId,
    pub permission_id: PermissionId,
    pub granted_at: DateTime<Utc>,
}

impl GroupGrant {
    pub fn new(group_id: GroupId, permission_id: PermissionId) -> Self {
        Self {
            group_id,
            permission_id,
            granted_at: Utc::now(),
        }
    }
}

/// Registration-time description of a permission to seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSpec {
    pub code: PermissionCode,
    pub is_system: bool,
    pub metadata: serde_json::Value,
}

impl PermissionSpec {
    pub fn new(code: PermissionCode) -> Self {
        Self {
            code,
            is_system: false,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn system(code: PermissionCode) -> Self {
        Self {
            is_system: true,
            ..Self::new(code)
        }
    }
}

/// Seed the catalog with a batch of permissions, idempotently.
///
/// Codes already present are left untouched (registration is not an error on
/// restart/replay). Returns the catalog id for every requested code.
pub fn seed(
    store: &dyn PermissionStore,
    specs: impl IntoIterator<Item = PermissionSpec>,
) -> Result<Vec<PermissionId>, StoreError> {
    let mut ids = Vec::new();

    for spec in specs {
        let id = match store.get_by_code(&spec.code)? {
            Some(existing) => existing.id,
            None => store.register(Permission {
                id: PermissionId::new(),
                code: spec.code,
                is_system: spec.is_system,
                metadata: spec.metadata,
                created_at: Utc::now(),
            })?,
        };
        ids.push(id);
    }

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPermissionStore;

    fn code(s: &str) -> PermissionCode {
        PermissionCode::parse(s).unwrap()
    }

    #[test]
    fn seed_is_idempotent() {
        let store = InMemoryPermissionStore::new();

        let first = seed(
            &store,
            vec![
                PermissionSpec::new(code("finance.bank-accounts.create")),
                PermissionSpec::system(code("admin.permissions.manage")),
            ],
        )
        .unwrap();

        let second = seed(
            &store,
            vec![PermissionSpec::new(code("finance.bank-accounts.create"))],
        )
        .unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second, vec![first[0]]);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn permission_exposes_code_segments() {
        let permission = Permission::new(code("stock.items.update"));
        assert_eq!(permission.module(), "stock");
        assert_eq!(permission.resource(), "items");
        assert_eq!(permission.action(), "update");
        assert!(!permission.is_system);
    }
}
