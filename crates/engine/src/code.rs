//! Canonical permission codes.
//!
//! Codes are dotted strings of the form `module.resource.action`, optionally
//! suffixed with a scope segment: `module.resource.action.all` or
//! `module.resource.action.team`. Codes are globally unique and immutable
//! once registered; validation happens at parse time so the rest of the
//! engine can treat a [`PermissionCode`] as well-formed.

use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use veto_core::{DomainError, DomainResult};

/// Breadth of a scoped permission code.
///
/// `All` is organization-wide; `Team` is bounded by the principal's
/// department. `all` strictly implies `team` at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    All,
    Team,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::All => "all",
            Scope::Team => "team",
        }
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Scope::All),
            "team" => Ok(Scope::Team),
            other => Err(DomainError::validation(format!(
                "invalid scope segment '{other}' (expected 'all' or 'team')"
            ))),
        }
    }
}

/// Validated permission code.
///
/// Stored as the canonical dotted string; segment accessors slice into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PermissionCode(String);

impl PermissionCode {
    /// Parse and validate a permission code.
    ///
    /// Accepts exactly three segments (`module.resource.action`) or four,
    /// where the fourth must be a valid scope. Segments are lowercase ASCII
    /// alphanumerics plus `-` and `_`.
    pub fn parse(s: &str) -> DomainResult<Self> {
        let segments: Vec<&str> = s.split('.').collect();

        match segments.len() {
            3 => {}
            4 => {
                Scope::from_str(segments[3])?;
            }
            n => {
                return Err(DomainError::validation(format!(
                    "permission code '{s}' has {n} segments (expected 3 or 4)"
                )));
            }
        }

        for segment in &segments[..3] {
            if segment.is_empty() {
                return Err(DomainError::validation(format!(
                    "permission code '{s}' has an empty segment"
                )));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
            {
                return Err(DomainError::validation(format!(
                    "permission code segment '{segment}' contains invalid characters"
                )));
            }
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn module(&self) -> &str {
        self.segment(0)
    }

    pub fn resource(&self) -> &str {
        self.segment(1)
    }

    pub fn action(&self) -> &str {
        self.segment(2)
    }

    /// The scope segment, if the code carries one.
    pub fn scope(&self) -> Option<Scope> {
        self.0
            .split('.')
            .nth(3)
            .and_then(|s| Scope::from_str(s).ok())
    }

    /// The unscoped `module.resource.action` prefix of this code.
    pub fn base(&self) -> PermissionCode {
        match self.scope() {
            None => self.clone(),
            Some(_) => {
                let end = self.0.rfind('.').unwrap_or(self.0.len());
                Self(self.0[..end].to_string())
            }
        }
    }

    /// This code's base rescoped with `scope`.
    pub fn with_scope(&self, scope: Scope) -> PermissionCode {
        Self(format!("{}.{}", self.base().0, scope.as_str()))
    }

    fn segment(&self, index: usize) -> &str {
        // Parse guarantees at least three segments.
        self.0.split('.').nth(index).unwrap_or("")
    }
}

impl core::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PermissionCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for PermissionCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        PermissionCode::parse(&raw).map_err(serde::de::Error::custom)
    }
}
