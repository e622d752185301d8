//! Scope resolution over the `.all`/`.team` hierarchy.
//!
//! Wraps the permission resolver: `<base>.all` grants organization-wide
//! access and strictly implies `.team`; `<base>.team` bounds access to the
//! principal's department. The returned [`ScopeLevel`] is the contract the
//! caller uses to pick a filtering predicate (restrict a listing to the
//! resolved department on `Team`, no filter on `All`).

use std::sync::Arc;

use serde::Serialize;

use veto_core::{DepartmentId, UserId};

use crate::code::{PermissionCode, Scope};
use crate::error::CheckError;
use crate::resolver::{CheckContext, PermissionResolver};
use crate::store::Directory;

/// Breadth of access resolved for a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    /// Organization-wide; apply no department filter.
    All,
    /// Bounded to the principal's department.
    Team,
    /// No scope resolved (denied).
    None,
}

/// Why a scope check was denied. Distinct from a plain permission denial so
/// callers can report an accurate cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScopeDenial {
    /// Neither scoped code is granted.
    #[error("permission denied for '{all_code}' and '{team_code}'")]
    PermissionDenied {
        all_code: PermissionCode,
        team_code: PermissionCode,
    },

    /// Team-scoped access requires a department on file.
    #[error("must belong to a department for team-scoped access")]
    NoDepartment,

    /// The resource's department does not match the principal's.
    #[error("resource outside your department")]
    ResourceOutsideDepartment {
        resource_department: Option<DepartmentId>,
    },
}

/// Outcome of a scope check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeDecision {
    pub allowed: bool,
    pub scope: ScopeLevel,
    /// The principal's department when `scope` is `Team`.
    pub department_id: Option<DepartmentId>,
    pub denial: Option<ScopeDenial>,
}

impl ScopeDecision {
    fn all() -> Self {
        Self {
            allowed: true,
            scope: ScopeLevel::All,
            department_id: None,
            denial: None,
        }
    }

    fn team(department_id: DepartmentId) -> Self {
        Self {
            allowed: true,
            scope: ScopeLevel::Team,
            department_id: Some(department_id),
            denial: None,
        }
    }

    fn denied(denial: ScopeDenial) -> Self {
        Self {
            allowed: false,
            scope: ScopeLevel::None,
            department_id: None,
            denial: Some(denial),
        }
    }
}

/// Caller-supplied hook resolving a request's resource to its department.
///
/// Keeps the scope resolver agnostic of concrete domain resources; return
/// `None` when the resource cannot be placed in a department.
pub trait ResourceDepartmentExtractor: Send + Sync {
    fn department_of_resource(&self, ctx: &CheckContext) -> Option<DepartmentId>;
}

impl<F> ResourceDepartmentExtractor for F
where
    F: Fn(&CheckContext) -> Option<DepartmentId> + Send + Sync,
{
    fn department_of_resource(&self, ctx: &CheckContext) -> Option<DepartmentId> {
        self(ctx)
    }
}

/// Scope-aware authorization over a base permission code.
pub struct ScopeResolver {
    resolver: Arc<PermissionResolver>,
    directory: Arc<dyn Directory>,
}

impl ScopeResolver {
    pub fn new(resolver: Arc<PermissionResolver>, directory: Arc<dyn Directory>) -> Self {
        Self {
            resolver,
            directory,
        }
    }

    /// Resolve the widest scope `user_id` holds for `base`.
    ///
    /// Steps are sequential by data dependency: `.all` first (on allow,
    /// `.team`, the directory, and the extractor are never consulted), then
    /// `.team`, then department membership, then the optional extractor.
    /// Scope widening is never implicit: a `.team`-only grant never yields
    /// [`ScopeLevel::All`].
    ///
    /// Any scope suffix already on `base` is ignored; the check always runs
    /// over `<base>.all` / `<base>.team`.
    pub fn check_scope(
        &self,
        user_id: UserId,
        base: &PermissionCode,
        ctx: &CheckContext,
        extractor: Option<&dyn ResourceDepartmentExtractor>,
    ) -> Result<ScopeDecision, CheckError> {
        let all_code = base.with_scope(Scope::All);
        let team_code = base.with_scope(Scope::Team);

        let all = self.resolver.check(user_id, &all_code, ctx)?;
        if all.allowed {
            return Ok(ScopeDecision::all());
        }

        let team = self.resolver.check(user_id, &team_code, ctx)?;
        if !team.allowed {
            return Ok(ScopeDecision::denied(ScopeDenial::PermissionDenied {
                all_code,
                team_code,
            }));
        }

        let Some(department_id) = self.directory.department_of(user_id)? else {
            return Ok(ScopeDecision::denied(ScopeDenial::NoDepartment));
        };

        if let Some(extractor) = extractor {
            let resource_department = extractor.department_of_resource(ctx);
            // A resource that cannot be placed in a department is treated
            // as outside the caller's (fail-closed).
            if resource_department != Some(department_id) {
                return Ok(ScopeDecision::denied(
                    ScopeDenial::ResourceOutsideDepartment {
                        resource_department,
                    },
                ));
            }
        }

        Ok(ScopeDecision::team(department_id))
    }
}
