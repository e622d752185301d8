//! Direct grants: per-user overrides with allow/deny polarity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use veto_core::{DomainError, GrantId, PermissionId, UserId};

/// Polarity of a direct grant.
///
/// A closed two-variant type rather than a free-form string: invalid effects
/// are rejected at the store boundary, not discovered at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

impl core::fmt::Display for Effect {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Effect {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            other => Err(DomainError::validation(format!(
                "invalid effect '{other}' (expected 'allow' or 'deny')"
            ))),
        }
    }
}

/// A per-user grant for a single permission.
///
/// # Invariants
/// - Unique per `(user_id, permission_id)`: re-granting updates the existing
///   row rather than duplicating it.
/// - A live deny dominates any allow for the same code, regardless of source.
/// - Expired grants never affect a live decision; they remain visible to
///   historical listing when explicitly requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectGrant {
    pub id: GrantId,
    pub user_id: UserId,
    pub permission_id: PermissionId,
    pub effect: Effect,
    /// Opaque attribute conditions. Persisted and surfaced with an allow
    /// decision, never evaluated here: attribute-based enforcement is the
    /// caller's extension point.
    pub conditions: BTreeMap<String, serde_json::Value>,
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_by: UserId,
    pub granted_at: DateTime<Utc>,
}

impl DirectGrant {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at < now)
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn grant(expires_at: Option<DateTime<Utc>>) -> DirectGrant {
        DirectGrant {
            id: GrantId::new(),
            user_id: UserId::new(),
            permission_id: PermissionId::new(),
            effect: Effect::Allow,
            conditions: BTreeMap::new(),
            expires_at,
            granted_by: UserId::new(),
            granted_at: Utc::now(),
        }
    }

    #[test]
    fn effect_rejects_free_form_strings() {
        assert_eq!("allow".parse::<Effect>().unwrap(), Effect::Allow);
        assert_eq!("deny".parse::<Effect>().unwrap(), Effect::Deny);
        assert!("Allow".parse::<Effect>().is_err());
        assert!("block".parse::<Effect>().is_err());
    }

    #[test]
    fn expiry_is_strict_past() {
        let now = Utc::now();

        assert!(grant(Some(now - Duration::seconds(1))).is_expired(now));
        assert!(!grant(Some(now + Duration::hours(1))).is_expired(now));
        assert!(!grant(None).is_expired(now));
    }
}
