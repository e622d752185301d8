//! Check-path error taxonomy.
//!
//! Denials are structured *results* ([`crate::CheckResult`],
//! [`crate::ScopeDecision`]), not errors: whether a denial raises is the
//! calling layer's choice. Errors here are the hard failures that abort a
//! check before a decision exists.

use thiserror::Error;

use crate::store::StoreError;

/// Hard failure on the check path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    /// No principal in context; surfaced before any grant lookup.
    #[error("no authenticated principal in context")]
    AuthenticationMissing,

    /// Infrastructure failure reading grant state. Deliberately distinct
    /// from a deny: "can't tell" must not masquerade as "denied".
    #[error("grant store unavailable: {0}")]
    Store(#[from] StoreError),
}
