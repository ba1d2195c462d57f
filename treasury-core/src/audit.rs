//! Audit trail
//!
//! Every committed mutation leaves a human-readable record after its
//! transaction commits. Emission is fire-and-forget: an audit write
//! failure is logged and never reverses or blocks a committed financial
//! mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{error::Result, storage::LedgerStore, types::AdminId};

/// Kind of audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    /// User registration
    RegisterUser,
    /// Treasury -> user disbursement
    Disburse,
    /// User -> treasury recovery
    Recover,
    /// Treasury -> many users batch credit
    Airdrop,
    /// Direct user-to-user tip, recorded under the system identity
    Tip,
    /// Policy parameter mutation
    PolicyUpdate,
}

/// One audit trail record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Acting admin
    pub admin_id: AdminId,

    /// What happened
    pub action: AuditAction,

    /// Affected entities and amounts, JSON-encoded
    pub detail: String,

    /// Emission timestamp
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Build a record with JSON-encoded detail
    pub fn new(admin_id: AdminId, action: AuditAction, detail: &impl Serialize) -> Self {
        let detail = serde_json::to_string(detail).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "audit detail serialization failed");
            "{}".to_string()
        });

        Self {
            id: Uuid::now_v7(),
            admin_id,
            action,
            detail,
            created_at: Utc::now(),
        }
    }
}

/// Fire-and-forget consumer of committed engine outcomes
#[derive(Debug, Clone)]
pub struct AuditEmitter {
    store: Arc<LedgerStore>,
}

impl AuditEmitter {
    /// Create over the shared ledger store
    pub fn new(store: Arc<LedgerStore>) -> Self {
        Self { store }
    }

    /// Record a committed mutation
    ///
    /// Failures are logged, never propagated: the financial mutation has
    /// already committed.
    pub fn emit(&self, record: AuditRecord) {
        if let Err(e) = self.store.append_audit(&record) {
            tracing::warn!(
                record_id = %record.id,
                admin_id = %record.admin_id,
                action = ?record.action,
                error = %e,
                "audit record dropped"
            );
        } else {
            tracing::info!(
                record_id = %record.id,
                admin_id = %record.admin_id,
                action = ?record.action,
                "audit record emitted"
            );
        }
    }

    /// Most recent records, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.store.recent_audit(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_emitter() -> (AuditEmitter, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let store = Arc::new(LedgerStore::open(&config).unwrap());
        (AuditEmitter::new(store), temp_dir)
    }

    #[test]
    fn test_emit_and_recent() {
        let (emitter, _temp) = test_emitter();
        let admin = AdminId::new("admin-1");

        for i in 0..3 {
            emitter.emit(AuditRecord::new(
                admin.clone(),
                AuditAction::Disburse,
                &json!({ "user_id": format!("u{}", i), "amount": "10" }),
            ));
        }

        let records = emitter.recent(2).unwrap();
        assert_eq!(records.len(), 2);
        // Newest first: v7 IDs are time-ordered
        assert!(records[0].id > records[1].id);
        assert!(records[0].detail.contains("u2"));
    }

    #[test]
    fn test_detail_is_json() {
        let record = AuditRecord::new(
            AdminId::new("admin-1"),
            AuditAction::PolicyUpdate,
            &json!({ "tip_burn_percent": 5 }),
        );
        let parsed: serde_json::Value = serde_json::from_str(&record.detail).unwrap();
        assert_eq!(parsed["tip_burn_percent"], 5);
    }
}
