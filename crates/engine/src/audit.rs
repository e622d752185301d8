//! Decision audit trail (append-only, best-effort).

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use veto_core::UserId;

use crate::code::PermissionCode;

/// One audit row per resolver invocation.
///
/// Rows are append-only and never mutated; retention is an external policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: UserId,
    pub permission_code: PermissionCode,
    pub resource: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub endpoint: Option<String>,
    pub allowed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Audit storage error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    #[error("audit storage error: {0}")]
    Storage(String),
}

/// Append-only audit sink.
///
/// Writes are best-effort: the resolver logs a failure and returns its
/// decision unchanged. No read path belongs to this engine.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// In-memory audit sink for tests/dev. Retains entries for inspection.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries
            .lock()
            .map_err(|_| AuditError::Storage("lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}

/// Audit sink that emits entries as structured log events.
///
/// Useful when the embedding process ships logs to durable storage anyway.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        tracing::info!(
            target: "veto::audit",
            user_id = %entry.user_id,
            permission_code = %entry.permission_code,
            allowed = entry.allowed,
            resource = entry.resource.as_deref(),
            ip = entry.ip.as_deref(),
            user_agent = entry.user_agent.as_deref(),
            endpoint = entry.endpoint.as_deref(),
            timestamp = %entry.timestamp,
            "permission check"
        );
        Ok(())
    }
}
