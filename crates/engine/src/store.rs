//! Store contracts consumed by the resolvers.
//!
//! Persistence technology is out of scope here: the engine only requires
//! keyed lookup/list per row kind plus upsert/remove for direct grants, with
//! per-row atomicity and no cross-row transactional guarantees. Implementors
//! surface infrastructure failures as [`StoreError`] so a check can abort
//! with a hard failure instead of silently resolving to deny.

use chrono::{DateTime, Utc};

use veto_core::{DepartmentId, GrantId, GroupId, PermissionId, UserId};

use crate::code::PermissionCode;
use crate::grant::DirectGrant;
use crate::permission::{GroupGrant, Membership, Permission};

/// Store-level error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("permission not found: {0}")]
    PermissionNotFound(String),

    #[error("permission code already registered: {0}")]
    DuplicateCode(String),

    #[error("system permission is protected: {0}")]
    SystemPermission(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Permission catalog. Write path is registration-time only; read-only at
/// check time.
pub trait PermissionStore: Send + Sync {
    /// Register a new permission. Fails with [`StoreError::DuplicateCode`]
    /// when the code is already present (codes are immutable once
    /// registered); idempotent seeding lives in [`crate::permission::seed`].
    fn register(&self, permission: Permission) -> Result<PermissionId, StoreError>;

    fn get(&self, id: PermissionId) -> Result<Option<Permission>, StoreError>;

    fn get_by_code(&self, code: &PermissionCode) -> Result<Option<Permission>, StoreError>;

    fn list(&self) -> Result<Vec<Permission>, StoreError>;

    /// Remove a permission through the non-privileged administrative path.
    /// Refuses system permissions.
    fn remove(&self, id: PermissionId) -> Result<(), StoreError>;
}

/// User ↔ group membership. Create/delete lifecycle only.
pub trait MembershipStore: Send + Sync {
    fn add(&self, membership: Membership) -> Result<(), StoreError>;

    fn remove(&self, user_id: UserId, group_id: GroupId) -> Result<(), StoreError>;

    fn groups_of(&self, user_id: UserId) -> Result<Vec<GroupId>, StoreError>;

    fn members_of(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError>;
}

/// Group ↔ permission grants. Create/delete lifecycle only.
pub trait GroupGrantStore: Send + Sync {
    fn add(&self, grant: GroupGrant) -> Result<(), StoreError>;

    fn remove(&self, group_id: GroupId, permission_id: PermissionId) -> Result<(), StoreError>;

    fn permissions_of_group(&self, group_id: GroupId) -> Result<Vec<PermissionId>, StoreError>;

    /// All groups granting a permission (resolver intersects this with the
    /// user's memberships).
    fn groups_granting(&self, permission_id: PermissionId) -> Result<Vec<GroupId>, StoreError>;
}

/// Per-user direct grants with effect/expiry/conditions.
pub trait DirectGrantStore: Send + Sync {
    /// Insert or replace the grant for `(user_id, permission_id)`.
    ///
    /// Uniqueness per that pair is a store invariant: re-granting updates
    /// the existing row rather than duplicating it.
    fn upsert(&self, grant: DirectGrant) -> Result<GrantId, StoreError>;

    fn remove(&self, user_id: UserId, permission_id: PermissionId) -> Result<(), StoreError>;

    /// The live (non-expired as of `now`) grant for `(user_id,
    /// permission_id)`, if any.
    fn grant_for(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
        now: DateTime<Utc>,
    ) -> Result<Option<DirectGrant>, StoreError>;

    /// All grants for a user. Expired rows appear only when
    /// `include_expired` is set; they never affect a live decision.
    fn list_for_user(
        &self,
        user_id: UserId,
        include_expired: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<DirectGrant>, StoreError>;
}

/// Organizational directory collaborator.
pub trait Directory: Send + Sync {
    /// The department a user belongs to, if any is on file.
    fn department_of(&self, user_id: UserId) -> Result<Option<DepartmentId>, StoreError>;
}
