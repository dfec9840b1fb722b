//! Audit sink for authorization decisions
//!
//! Every check outcome is reported with its provenance so operators can
//! distinguish cached decisions from fresh store lookups and from
//! fail-safe denials.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{info, warn};

/// What was checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckKind {
    /// A permission check
    Permission,
    /// A role check
    Role,
}

/// Where a decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Served from the authorization cache
    CacheHit,
    /// Computed from the policy store / delegation overlay
    Fresh,
    /// Denied because the lookup failed (fail-safe)
    Failure,
}

/// A single audited authorization decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// User the check ran for
    pub user_id: String,
    /// Permission or role check
    pub kind: CheckKind,
    /// The permission/role name that was checked
    pub subject: String,
    /// The decision
    pub granted: bool,
    /// Where the decision came from
    pub provenance: Provenance,
    /// Decision timestamp (milliseconds since epoch)
    pub timestamp: u64,
}

impl AuditRecord {
    /// Create a record stamped with the current time
    pub fn new(
        user_id: impl Into<String>,
        kind: CheckKind,
        subject: impl Into<String>,
        granted: bool,
        provenance: Provenance,
    ) -> Self {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            user_id: user_id.into(),
            kind,
            subject: subject.into(),
            granted,
            provenance,
            timestamp,
        }
    }
}

/// Destination for audited decisions.
///
/// The durable audit trail lives outside this engine; implementations
/// forward records to it. Recording must never fail a check.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Report one decision
    async fn record(&self, record: AuditRecord);
}

/// Sink that emits records as structured log events
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: AuditRecord) {
        match record.provenance {
            Provenance::Failure => warn!(
                user = %record.user_id,
                kind = ?record.kind,
                subject = %record.subject,
                "authorization check denied after lookup failure"
            ),
            _ => info!(
                user = %record.user_id,
                kind = ?record.kind,
                subject = %record.subject,
                granted = record.granted,
                provenance = ?record.provenance,
                "authorization decision"
            ),
        }
    }
}

/// Sink that retains records in memory, for tests and diagnostics
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Number of records retained
    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    /// Whether nothing has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_retains_records() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());

        sink.record(AuditRecord::new(
            "u-1",
            CheckKind::Permission,
            "document:read",
            true,
            Provenance::Fresh,
        ))
        .await;
        sink.record(AuditRecord::new(
            "u-1",
            CheckKind::Permission,
            "document:read",
            true,
            Provenance::CacheHit,
        ))
        .await;

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].provenance, Provenance::Fresh);
        assert_eq!(records[1].provenance, Provenance::CacheHit);
        assert!(records[0].timestamp > 0);
    }
}
