//! `veto-engine` — permission resolution and scope authorization.
//!
//! This crate decides whether a principal may perform an action, combining
//! group-derived grants, per-user direct overrides (allow/deny, expiring,
//! with opaque attribute conditions), and a two-tier `all`/`team` scope
//! hierarchy bounded by department membership.
//!
//! It is intentionally decoupled from HTTP and storage: grant state, the
//! organizational directory, and the audit sink are trait collaborators
//! injected at construction. In-memory implementations are provided for
//! tests and embedders without a database.

pub mod audit;
pub mod code;
pub mod error;
pub mod grant;
pub mod memory;
pub mod permission;
pub mod resolver;
pub mod scope;
pub mod store;

pub use audit::{AuditEntry, AuditError, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use code::{PermissionCode, Scope};
pub use error::CheckError;
pub use grant::{DirectGrant, Effect};
pub use memory::{
    InMemoryDirectGrantStore, InMemoryDirectory, InMemoryGroupGrantStore,
    InMemoryMembershipStore, InMemoryPermissionStore,
};
pub use permission::{GroupGrant, Membership, Permission, PermissionGroup, PermissionSpec, seed};
pub use resolver::{CheckContext, CheckResult, DecisionReason, DirectGrantRequest, PermissionResolver};
pub use scope::{
    ResourceDepartmentExtractor, ScopeDecision, ScopeDenial, ScopeLevel, ScopeResolver,
};
pub use store::{
    Directory, DirectGrantStore, GroupGrantStore, MembershipStore, PermissionStore, StoreError,
};
