//! In-memory store implementations for tests/dev.
//!
//! These back every store contract with `RwLock`-guarded maps. They are the
//! substitutable doubles the resolvers are tested against, and are usable
//! as-is by embedders that do not need durable grant storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use veto_core::{DepartmentId, GrantId, GroupId, PermissionId, UserId};

use crate::code::PermissionCode;
use crate::grant::DirectGrant;
use crate::permission::{GroupGrant, Membership, Permission};
use crate::store::{
    Directory, DirectGrantStore, GroupGrantStore, MembershipStore, PermissionStore, StoreError,
};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Permission Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CatalogInner {
    by_id: HashMap<PermissionId, Permission>,
    by_code: HashMap<String, PermissionId>,
}

/// In-memory permission catalog.
#[derive(Debug, Default)]
pub struct InMemoryPermissionStore {
    inner: RwLock<CatalogInner>,
}

impl InMemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl PermissionStore for InMemoryPermissionStore {
    fn register(&self, permission: Permission) -> Result<PermissionId, StoreError> {
        let mut inner = write(&self.inner)?;

        if inner.by_code.contains_key(permission.code.as_str()) {
            return Err(StoreError::DuplicateCode(permission.code.to_string()));
        }

        let id = permission.id;
        inner.by_code.insert(permission.code.as_str().to_string(), id);
        inner.by_id.insert(id, permission);
        Ok(id)
    }

    fn get(&self, id: PermissionId) -> Result<Option<Permission>, StoreError> {
        Ok(read(&self.inner)?.by_id.get(&id).cloned())
    }

    fn get_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError> {
        let inner = read(&self.inner)?;
        Ok(inner
            .by_code
            .get(code.as_str())
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    fn list(&self) -> Result<Vec<Permission>, StoreError> {
        let mut all: Vec<Permission> = read(&self.inner)?.by_id.values().cloned().collect();
        all.sort_by(|a, b| a.code.as_str().cmp(b.code.as_str()));
        Ok(all)
    }

    fn remove(&self, id: PermissionId) -> Result<(), StoreError> {
        let mut inner = write(&self.inner)?;

        let Some(permission) = inner.by_id.get(&id) else {
            return Err(StoreError::PermissionNotFound(id.to_string()));
        };
        if permission.is_system {
            return Err(StoreError::SystemPermission(permission.code.to_string()));
        }

        let code = permission.code.as_str().to_string();
        inner.by_id.remove(&id);
        inner.by_code.remove(&code);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memberships
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory user ↔ group membership store.
#[derive(Debug, Default)]
pub struct InMemoryMembershipStore {
    rows: RwLock<Vec<Membership>>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl MembershipStore for InMemoryMembershipStore {
    fn add(&self, membership: Membership) -> Result<(), StoreError> {
        let mut rows = write(&self.rows)?;
        let exists = rows
            .iter()
            .any(|m| m.user_id == membership.user_id && m.group_id == membership.group_id);
        if !exists {
            rows.push(membership);
        }
        Ok(())
    }

    fn remove(&self, user_id: UserId, group_id: GroupId) -> Result<(), StoreError> {
        write(&self.rows)?.retain(|m| !(m.user_id == user_id && m.group_id == group_id));
        Ok(())
    }

    fn groups_of(&self, user_id: UserId) -> Result<Vec<GroupId>, StoreError> {
        Ok(read(&self.rows)?
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.group_id)
            .collect())
    }

    fn members_of(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError> {
        Ok(read(&self.rows)?
            .iter()
            .filter(|m| m.group_id == group_id)
            .map(|m| m.user_id)
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Group Grants
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory group ↔ permission grant store.
#[derive(Debug, Default)]
pub struct InMemoryGroupGrantStore {
    rows: RwLock<Vec<GroupGrant>>,
}

impl InMemoryGroupGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl GroupGrantStore for InMemoryGroupGrantStore {
    fn add(&self, grant: GroupGrant) -> Result<(), StoreError> {
        let mut rows = write(&self.rows)?;
        let exists = rows
            .iter()
            .any(|g| g.group_id == grant.group_id && g.permission_id == grant.permission_id);
        if !exists {
            rows.push(grant);
        }
        Ok(())
    }

    fn remove(&self, group_id: GroupId, permission_id: PermissionId) -> Result<(), StoreError> {
        write(&self.rows)?
            .retain(|g| !(g.group_id == group_id && g.permission_id == permission_id));
        Ok(())
    }

    fn permissions_of_group(&self, group_id: GroupId) -> Result<Vec<PermissionId>, StoreError> {
        Ok(read(&self.rows)?
            .iter()
            .filter(|g| g.group_id == group_id)
            .map(|g| g.permission_id)
            .collect())
    }

    fn groups_granting(&self, permission_id: PermissionId) -> Result<Vec<GroupId>, StoreError> {
        Ok(read(&self.rows)?
            .iter()
            .filter(|g| g.permission_id == permission_id)
            .map(|g| g.group_id)
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Direct Grants
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory direct grant store, keyed by `(user_id, permission_id)`.
#[derive(Debug, Default)]
pub struct InMemoryDirectGrantStore {
    rows: RwLock<HashMap<(UserId, PermissionId), DirectGrant>>,
}

impl InMemoryDirectGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl DirectGrantStore for InMemoryDirectGrantStore {
    fn upsert(&self, mut grant: DirectGrant) -> Result<GrantId, StoreError> {
        let mut rows = write(&self.rows)?;
        let key = (grant.user_id, grant.permission_id);

        // Replacing keeps the original row identity (update, not re-insert).
        if let Some(existing) = rows.get(&key) {
            grant.id = existing.id;
        }

        let id = grant.id;
        rows.insert(key, grant);
        Ok(id)
    }

    fn remove(&self, user_id: UserId, permission_id: PermissionId) -> Result<(), StoreError> {
        write(&self.rows)?.remove(&(user_id, permission_id));
        Ok(())
    }

    fn grant_for(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
        now: DateTime<Utc>,
    ) -> Result<Option<DirectGrant>, StoreError> {
        Ok(read(&self.rows)?
            .get(&(user_id, permission_id))
            .filter(|g| g.is_live(now))
            .cloned())
    }

    fn list_for_user(
        &self,
        user_id: UserId,
        include_expired: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<DirectGrant>, StoreError> {
        let mut grants: Vec<DirectGrant> = read(&self.rows)?
            .values()
            .filter(|g| g.user_id == user_id)
            .filter(|g| include_expired || g.is_live(now))
            .cloned()
            .collect();
        grants.sort_by_key(|g| g.granted_at);
        Ok(grants)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Organizational Directory
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory organizational directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    departments: RwLock<HashMap<UserId, DepartmentId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Put a user on file in a department.
    pub fn assign(&self, user_id: UserId, department_id: DepartmentId) {
        if let Ok(mut map) = self.departments.write() {
            map.insert(user_id, department_id);
        }
    }

    pub fn unassign(&self, user_id: UserId) {
        if let Ok(mut map) = self.departments.write() {
            map.remove(&user_id);
        }
    }
}

impl Directory for InMemoryDirectory {
    fn department_of(&self, user_id: UserId) -> Result<Option<DepartmentId>, StoreError> {
        Ok(read(&self.departments)?.get(&user_id).copied())
    }
}
