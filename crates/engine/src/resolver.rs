//! Permission resolution.
//!
//! Precedence, in strict order (first match wins):
//!
//! 1. live direct **deny** → DENY, regardless of any group grant;
//! 2. live direct **allow** → ALLOW;
//! 3. any group of the user granting the code → ALLOW (union across groups);
//! 4. default deny.
//!
//! The order is a security invariant. It is implemented as an ordered chain
//! of pure predicate functions over a pre-fetched grant snapshot,
//! short-circuiting on the first defined decision.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use veto_core::{GrantId, GroupId, UserId};

use crate::audit::{AuditEntry, AuditSink};
use crate::code::PermissionCode;
use crate::error::CheckError;
use crate::grant::{DirectGrant, Effect};
use crate::store::{
    DirectGrantStore, GroupGrantStore, MembershipStore, PermissionStore, StoreError,
};

/// Caller-supplied request context, carried into the audit entry verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub resource: Option<String>,
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DecisionReason {
    /// A live direct grant with deny effect matched.
    DirectDeny,
    /// A live direct grant with allow effect matched.
    DirectAllow,
    /// A group the user belongs to grants the permission.
    GroupAllow { group_id: GroupId },
    /// No grant matched.
    DefaultDeny,
}

impl core::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecisionReason::DirectDeny => f.write_str("denied by direct grant"),
            DecisionReason::DirectAllow => f.write_str("allowed by direct grant"),
            DecisionReason::GroupAllow { group_id } => {
                write!(f, "allowed via group {group_id}")
            }
            DecisionReason::DefaultDeny => f.write_str("no matching grant (default deny)"),
        }
    }
}

/// Outcome of a permission check.
///
/// A denial is a result, not an error; whether it raises is the calling
/// layer's decision. `matched_grant` carries the direct grant that decided
/// the check, conditions included (surfaced opaquely, never evaluated here).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub allowed: bool,
    pub reason: DecisionReason,
    pub matched_grant: Option<DirectGrant>,
}

impl CheckResult {
    fn direct(grant: DirectGrant) -> Self {
        let (allowed, reason) = match grant.effect {
            Effect::Deny => (false, DecisionReason::DirectDeny),
            Effect::Allow => (true, DecisionReason::DirectAllow),
        };
        Self {
            allowed,
            reason,
            matched_grant: Some(grant),
        }
    }

    fn group_allow(group_id: GroupId) -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::GroupAllow { group_id },
            matched_grant: None,
        }
    }

    fn default_deny() -> Self {
        Self {
            allowed: false,
            reason: DecisionReason::DefaultDeny,
            matched_grant: None,
        }
    }
}

/// Grant state fetched once per check; the precedence rules below are pure
/// functions over it.
#[derive(Debug, Clone)]
struct GrantSnapshot {
    /// Live direct grant for `(user, permission)`, unique per pair.
    direct: Option<DirectGrant>,
    /// First of the user's groups that grants the permission, if any.
    granting_group: Option<GroupId>,
}

type PrecedenceRule = fn(&GrantSnapshot) -> Option<CheckResult>;

/// Ordered precedence chain. First `Some` wins.
const PRECEDENCE: [PrecedenceRule; 3] = [direct_deny, direct_allow, group_allow];

fn direct_deny(snapshot: &GrantSnapshot) -> Option<CheckResult> {
    snapshot
        .direct
        .as_ref()
        .filter(|g| g.effect == Effect::Deny)
        .map(|g| CheckResult::direct(g.clone()))
}

fn direct_allow(snapshot: &GrantSnapshot) -> Option<CheckResult> {
    snapshot
        .direct
        .as_ref()
        .filter(|g| g.effect == Effect::Allow)
        .map(|g| CheckResult::direct(g.clone()))
}

fn group_allow(snapshot: &GrantSnapshot) -> Option<CheckResult> {
    snapshot.granting_group.map(CheckResult::group_allow)
}

/// Request to create or replace a direct grant.
#[derive(Debug, Clone)]
pub struct DirectGrantRequest {
    pub user_id: UserId,
    pub code: PermissionCode,
    pub effect: Effect,
    pub conditions: BTreeMap<String, serde_json::Value>,
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_by: UserId,
}

/// The permission resolution engine.
///
/// Stateless: every check is an independent read over current grant state
/// plus one best-effort audit append. Stores are injected so embedders and
/// tests can substitute implementations.
pub struct PermissionResolver {
    permissions: Arc<dyn PermissionStore>,
    memberships: Arc<dyn MembershipStore>,
    group_grants: Arc<dyn GroupGrantStore>,
    direct_grants: Arc<dyn DirectGrantStore>,
    audit: Arc<dyn AuditSink>,
}

impl PermissionResolver {
    pub fn new(
        permissions: Arc<dyn PermissionStore>,
        memberships: Arc<dyn MembershipStore>,
        group_grants: Arc<dyn GroupGrantStore>,
        direct_grants: Arc<dyn DirectGrantStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            permissions,
            memberships,
            group_grants,
            direct_grants,
            audit,
        }
    }

    /// Decide whether `user_id` may exercise `code`.
    ///
    /// Every invocation that reaches a decision writes exactly one audit
    /// entry mirroring it; an audit write failure is logged and never
    /// changes or blocks the decision. A store failure aborts the check
    /// with [`CheckError::Store`] instead of resolving to deny.
    pub fn check(
        &self,
        user_id: UserId,
        code: &PermissionCode,
        ctx: &CheckContext,
    ) -> Result<CheckResult, CheckError> {
        if user_id.is_nil() {
            return Err(CheckError::AuthenticationMissing);
        }

        let now = Utc::now();
        let result = self.decide(user_id, code, now)?;

        tracing::debug!(
            user_id = %user_id,
            code = %code,
            allowed = result.allowed,
            reason = %result.reason,
            "permission resolved"
        );

        self.record_audit(user_id, code, ctx, result.allowed, now);
        Ok(result)
    }

    fn decide(
        &self,
        user_id: UserId,
        code: &PermissionCode,
        now: DateTime<Utc>,
    ) -> Result<CheckResult, CheckError> {
        // An unregistered code can have no grants attached.
        let Some(permission) = self.permissions.get_by_code(code)? else {
            return Ok(CheckResult::default_deny());
        };

        let direct = self.direct_grants.grant_for(user_id, permission.id, now)?;
        let granting_group = self.first_granting_group(user_id, permission.id)?;

        let snapshot = GrantSnapshot {
            direct,
            granting_group,
        };

        Ok(PRECEDENCE
            .iter()
            .find_map(|rule| rule(&snapshot))
            .unwrap_or_else(CheckResult::default_deny))
    }

    /// First of the user's groups (membership order) holding a grant for
    /// the permission.
    fn first_granting_group(
        &self,
        user_id: UserId,
        permission_id: veto_core::PermissionId,
    ) -> Result<Option<GroupId>, StoreError> {
        let granting: HashSet<GroupId> = self
            .group_grants
            .groups_granting(permission_id)?
            .into_iter()
            .collect();
        if granting.is_empty() {
            return Ok(None);
        }

        Ok(self
            .memberships
            .groups_of(user_id)?
            .into_iter()
            .find(|g| granting.contains(g)))
    }

    fn record_audit(
        &self,
        user_id: UserId,
        code: &PermissionCode,
        ctx: &CheckContext,
        allowed: bool,
        timestamp: DateTime<Utc>,
    ) {
        let entry = AuditEntry {
            user_id,
            permission_code: code.clone(),
            resource: ctx.resource.clone(),
            ip: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
            endpoint: ctx.endpoint.clone(),
            allowed,
            timestamp,
        };

        if let Err(err) = self.audit.record(entry) {
            tracing::warn!(
                user_id = %user_id,
                code = %code,
                error = %err,
                "audit write failed; decision unaffected"
            );
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Administrative surface
    // ─────────────────────────────────────────────────────────────────────

    /// Create or replace the direct grant for `(user, code)`.
    ///
    /// The effect arrives as the closed [`Effect`] type; free-form strings
    /// are rejected before they get here (`Effect::from_str`).
    pub fn grant_direct(&self, request: DirectGrantRequest) -> Result<DirectGrant, StoreError> {
        let permission = self
            .permissions
            .get_by_code(&request.code)?
            .ok_or_else(|| StoreError::PermissionNotFound(request.code.to_string()))?;

        let mut grant = DirectGrant {
            id: GrantId::new(),
            user_id: request.user_id,
            permission_id: permission.id,
            effect: request.effect,
            conditions: request.conditions,
            expires_at: request.expires_at,
            granted_by: request.granted_by,
            granted_at: Utc::now(),
        };
        grant.id = self.direct_grants.upsert(grant.clone())?;
        Ok(grant)
    }

    /// Remove the direct grant for `(user, code)`, if present.
    pub fn revoke_direct(&self, user_id: UserId, code: &PermissionCode) -> Result<(), StoreError> {
        let permission = self
            .permissions
            .get_by_code(code)?
            .ok_or_else(|| StoreError::PermissionNotFound(code.to_string()))?;

        self.direct_grants.remove(user_id, permission.id)
    }

    /// Historical listing of a user's direct grants. Expired rows appear
    /// only when explicitly requested.
    pub fn user_grants(
        &self,
        user_id: UserId,
        include_expired: bool,
    ) -> Result<Vec<DirectGrant>, StoreError> {
        self.direct_grants
            .list_for_user(user_id, include_expired, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;
    use crate::audit::{AuditError, InMemoryAuditSink};
    use crate::memory::{
        InMemoryDirectGrantStore, InMemoryGroupGrantStore, InMemoryMembershipStore,
        InMemoryPermissionStore,
    };
    use crate::permission::{GroupGrant, Membership, PermissionSpec, seed};

    struct Harness {
        permissions: Arc<InMemoryPermissionStore>,
        memberships: Arc<InMemoryMembershipStore>,
        group_grants: Arc<InMemoryGroupGrantStore>,
        audit: Arc<InMemoryAuditSink>,
        resolver: PermissionResolver,
    }

    fn harness() -> Harness {
        let permissions = InMemoryPermissionStore::arc();
        let memberships = InMemoryMembershipStore::arc();
        let group_grants = InMemoryGroupGrantStore::arc();
        let direct_grants = InMemoryDirectGrantStore::arc();
        let audit = InMemoryAuditSink::arc();

        let resolver = PermissionResolver::new(
            permissions.clone(),
            memberships.clone(),
            group_grants.clone(),
            direct_grants.clone(),
            audit.clone(),
        );

        Harness {
            permissions,
            memberships,
            group_grants,
            audit,
            resolver,
        }
    }

    fn code(s: &str) -> PermissionCode {
        PermissionCode::parse(s).unwrap()
    }

    fn register(h: &Harness, s: &str) -> veto_core::PermissionId {
        seed(h.permissions.as_ref(), vec![PermissionSpec::new(code(s))]).unwrap()[0]
    }

    fn join_granting_group(h: &Harness, user_id: UserId, permission_id: veto_core::PermissionId) -> GroupId {
        let group_id = GroupId::new();
        h.memberships.add(Membership::new(user_id, group_id)).unwrap();
        h.group_grants
            .add(GroupGrant::new(group_id, permission_id))
            .unwrap();
        group_id
    }

    fn grant(h: &Harness, user_id: UserId, s: &str, effect: Effect) -> DirectGrant {
        h.resolver
            .grant_direct(DirectGrantRequest {
                user_id,
                code: code(s),
                effect,
                conditions: BTreeMap::new(),
                expires_at: None,
                granted_by: UserId::new(),
            })
            .unwrap()
    }

    #[test]
    fn default_deny_without_any_grant() {
        let h = harness();
        let user_id = UserId::new();
        register(&h, "sales.orders.read");

        let result = h
            .resolver
            .check(user_id, &code("sales.orders.read"), &CheckContext::default())
            .unwrap();

        assert!(!result.allowed);
        assert_eq!(result.reason, DecisionReason::DefaultDeny);
    }

    #[test]
    fn unregistered_code_is_default_deny() {
        let h = harness();

        let result = h
            .resolver
            .check(UserId::new(), &code("hr.payroll.approve"), &CheckContext::default())
            .unwrap();

        assert!(!result.allowed);
        assert_eq!(result.reason, DecisionReason::DefaultDeny);
    }

    #[test]
    fn direct_allow_wins_without_deny() {
        let h = harness();
        let user_id = UserId::new();
        register(&h, "sales.orders.read");
        grant(&h, user_id, "sales.orders.read", Effect::Allow);

        let result = h
            .resolver
            .check(user_id, &code("sales.orders.read"), &CheckContext::default())
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.reason, DecisionReason::DirectAllow);
        assert!(result.matched_grant.is_some());
    }

    #[test]
    fn group_grant_allows_and_membership_removal_flips_to_deny() {
        let h = harness();
        let user_id = UserId::new();
        let permission_id = register(&h, "stock.items.update");
        let group_id = join_granting_group(&h, user_id, permission_id);

        let result = h
            .resolver
            .check(user_id, &code("stock.items.update"), &CheckContext::default())
            .unwrap();
        assert!(result.allowed);
        assert_eq!(result.reason, DecisionReason::GroupAllow { group_id });

        h.memberships.remove(user_id, group_id).unwrap();

        let result = h
            .resolver
            .check(user_id, &code("stock.items.update"), &CheckContext::default())
            .unwrap();
        assert!(!result.allowed);
        assert_eq!(result.reason, DecisionReason::DefaultDeny);
    }

    #[test]
    fn deny_dominates_group_allow_and_revocation_flips_it() {
        // Spec scenario: deny direct grant + granting group membership.
        let h = harness();
        let user_id = UserId::new();
        let permission_id = register(&h, "finance.bank-accounts.create");
        join_granting_group(&h, user_id, permission_id);
        grant(&h, user_id, "finance.bank-accounts.create", Effect::Deny);

        let check_code = code("finance.bank-accounts.create");
        let result = h
            .resolver
            .check(user_id, &check_code, &CheckContext::default())
            .unwrap();
        assert!(!result.allowed);
        assert_eq!(result.reason, DecisionReason::DirectDeny);

        // Deleting the deny grant, with no other state change, flips the
        // result to allow via the group grant.
        h.resolver.revoke_direct(user_id, &check_code).unwrap();

        let result = h
            .resolver
            .check(user_id, &check_code, &CheckContext::default())
            .unwrap();
        assert!(result.allowed);
        assert!(matches!(result.reason, DecisionReason::GroupAllow { .. }));
    }

    #[test]
    fn expired_grants_never_affect_a_live_decision() {
        let h = harness();
        let user_id = UserId::new();
        let permission_id = register(&h, "hr.employees.read");
        join_granting_group(&h, user_id, permission_id);

        // An expired deny must not block the group allow.
        h.resolver
            .grant_direct(DirectGrantRequest {
                user_id,
                code: code("hr.employees.read"),
                effect: Effect::Deny,
                conditions: BTreeMap::new(),
                expires_at: Some(Utc::now() - Duration::minutes(1)),
                granted_by: UserId::new(),
            })
            .unwrap();

        let result = h
            .resolver
            .check(user_id, &code("hr.employees.read"), &CheckContext::default())
            .unwrap();
        assert!(result.allowed);
        assert!(matches!(result.reason, DecisionReason::GroupAllow { .. }));

        // The expired row is still there for historical listing.
        assert!(h.resolver.user_grants(user_id, false).unwrap().is_empty());
        assert_eq!(h.resolver.user_grants(user_id, true).unwrap().len(), 1);
    }

    #[test]
    fn conditions_are_surfaced_opaquely_on_allow() {
        let h = harness();
        let user_id = UserId::new();
        register(&h, "finance.reports.read");

        let mut conditions = BTreeMap::new();
        conditions.insert("max_amount".to_string(), serde_json::json!(5000));
        h.resolver
            .grant_direct(DirectGrantRequest {
                user_id,
                code: code("finance.reports.read"),
                effect: Effect::Allow,
                conditions: conditions.clone(),
                expires_at: None,
                granted_by: UserId::new(),
            })
            .unwrap();

        let result = h
            .resolver
            .check(user_id, &code("finance.reports.read"), &CheckContext::default())
            .unwrap();

        assert!(result.allowed);
        assert_eq!(result.matched_grant.unwrap().conditions, conditions);
    }

    #[test]
    fn every_check_writes_exactly_one_matching_audit_entry() {
        let h = harness();
        let user_id = UserId::new();
        register(&h, "sales.orders.read");
        grant(&h, user_id, "sales.orders.read", Effect::Allow);

        let ctx = CheckContext {
            ip: Some("10.1.2.3".to_string()),
            user_agent: Some("veto-tests".to_string()),
            endpoint: Some("/api/sales/orders".to_string()),
            resource: None,
        };

        let allowed = h
            .resolver
            .check(user_id, &code("sales.orders.read"), &ctx)
            .unwrap();
        let denied = h
            .resolver
            .check(user_id, &code("sales.orders.delete"), &ctx)
            .unwrap();

        let entries = h.audit.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].allowed, allowed.allowed);
        assert_eq!(entries[1].allowed, denied.allowed);
        assert_eq!(entries[0].ip.as_deref(), Some("10.1.2.3"));
        assert_eq!(entries[0].endpoint.as_deref(), Some("/api/sales/orders"));
    }

    #[test]
    fn audit_failure_never_changes_the_decision() {
        struct FailingAuditSink;

        impl AuditSink for FailingAuditSink {
            fn record(&self, _entry: AuditEntry) -> Result<(), AuditError> {
                Err(AuditError::Storage("audit store down".to_string()))
            }
        }

        let permissions = InMemoryPermissionStore::arc();
        let resolver = PermissionResolver::new(
            permissions.clone(),
            InMemoryMembershipStore::arc(),
            InMemoryGroupGrantStore::arc(),
            InMemoryDirectGrantStore::arc(),
            Arc::new(FailingAuditSink),
        );

        let user_id = UserId::new();
        seed(
            permissions.as_ref(),
            vec![PermissionSpec::new(code("sales.orders.read"))],
        )
        .unwrap();

        let result = resolver
            .check(user_id, &code("sales.orders.read"), &CheckContext::default())
            .unwrap();
        assert!(!result.allowed);
        assert_eq!(result.reason, DecisionReason::DefaultDeny);
    }

    #[test]
    fn nil_principal_fails_before_any_lookup() {
        let h = harness();

        let err = h
            .resolver
            .check(UserId::nil(), &code("sales.orders.read"), &CheckContext::default())
            .unwrap_err();

        assert_eq!(err, CheckError::AuthenticationMissing);
        assert!(h.audit.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: a live direct deny dominates any number of group
        /// grants for the same code.
        #[test]
        fn deny_dominates_any_group_grants(group_count in 0usize..8) {
            let h = harness();
            let user_id = UserId::new();
            let permission_id = register(&h, "finance.bank-accounts.create");

            for _ in 0..group_count {
                join_granting_group(&h, user_id, permission_id);
            }
            grant(&h, user_id, "finance.bank-accounts.create", Effect::Deny);

            let result = h
                .resolver
                .check(
                    user_id,
                    &code("finance.bank-accounts.create"),
                    &CheckContext::default(),
                )
                .unwrap();

            prop_assert!(!result.allowed);
            prop_assert_eq!(result.reason, DecisionReason::DirectDeny);
        }
    }
}
