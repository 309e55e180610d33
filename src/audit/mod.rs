//! Audit logging and replay
//!
//! Every answered turn leaves one sealed, append-only record. Records are
//! never updated; the integrity hash lets a reviewer detect tampering.

use crate::error::AgentError;
use crate::models::AuditRecord;
use crate::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// Audit trail storage
pub struct AuditLog {
    records: Arc<RwLock<HashMap<Uuid, AuditRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Append a sealed record. Existing ids and broken seals are rejected.
    pub async fn record(&self, record: AuditRecord) -> Result<Uuid> {
        if compute_record_hash(&record) != record.integrity_hash {
            return Err(AgentError::AuditError(format!(
                "record {} is not sealed",
                record.audit_id
            )));
        }

        let audit_id = record.audit_id;
        let mut records = self.records.write().await;
        if records.contains_key(&audit_id) {
            return Err(AgentError::AuditError(format!(
                "record {} already exists",
                audit_id
            )));
        }

        info!(
            audit_id = %audit_id,
            session_id = %record.session_id,
            turn = record.turn_index,
            outcome = ?record.outcome,
            "Audit record appended"
        );
        records.insert(audit_id, record);
        Ok(audit_id)
    }

    /// Retrieve a record by audit ID
    pub async fn get(&self, audit_id: Uuid) -> Result<Option<AuditRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&audit_id).cloned())
    }

    /// Records of a session in turn order
    pub async fn list_for_session(&self, session_id: &str) -> Result<Vec<AuditRecord>> {
        let records = self.records.read().await;

        let mut items: Vec<AuditRecord> = records
            .values()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect();

        items.sort_by_key(|record| (record.turn_index, record.created_at));
        Ok(items)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Verify a record's integrity via hash
    pub async fn verify_integrity(&self, audit_id: Uuid) -> Result<bool> {
        let records = self.records.read().await;

        match records.get(&audit_id) {
            Some(record) => Ok(compute_record_hash(record) == record.integrity_hash),
            None => Ok(false),
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 over the record serialized with a blank `integrity_hash`.
pub fn compute_record_hash(record: &AuditRecord) -> String {
    let mut unsealed = record.clone();
    unsealed.integrity_hash = String::new();

    let mut hasher = Sha256::new();

    // Stream JSON directly into hasher (no intermediate String)
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &unsealed).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Fill in the integrity hash. Seal again after any later change.
pub fn seal(record: &mut AuditRecord) {
    record.integrity_hash = compute_record_hash(record);
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Fetch a record for review, refusing one whose hash no longer matches.
pub async fn replay_record(audit_log: &AuditLog, audit_id: Uuid) -> Result<Option<AuditRecord>> {
    match audit_log.get(audit_id).await? {
        Some(record) if compute_record_hash(&record) != record.integrity_hash => Err(
            AgentError::AuditError(format!("record {} failed integrity check", audit_id)),
        ),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AuditOutcome, Classification, Measure, QueryIntent, ResolvedSlots, RoutingSnapshot,
        StageLatency, UseCase,
    };
    use chrono::Utc;

    fn record(session_id: &str, turn_index: u32) -> AuditRecord {
        let mut record = AuditRecord {
            audit_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            customer_id: "CUST_001".to_string(),
            turn_index,
            created_at: Utc::now(),
            query: "How much did I spend on dining last month?".to_string(),
            routing: RoutingSnapshot {
                classification: Classification::Clear,
                use_cases: vec![UseCase::Aggregation],
                intent: QueryIntent {
                    primary: UseCase::Aggregation,
                    measure: Measure::Spending,
                    comparison: false,
                    limit: None,
                },
                clarity_reason: "all required slots resolved".to_string(),
                clarifications: vec![],
            },
            resolved_filters: ResolvedSlots::default(),
            tool_calls: vec![],
            calculations: vec![],
            grounding: None,
            composition: None,
            outcome: AuditOutcome::Answered,
            final_answer: "You spent $389.40 on Dining in November 2025.".to_string(),
            execution_time_ms: 12,
            preferences_used: vec![],
            latency: StageLatency::default(),
            integrity_hash: String::new(),
        };
        seal(&mut record);
        record
    }

    #[tokio::test]
    async fn test_record_and_replay() {
        let log = AuditLog::new();
        let sealed = record("s1", 1);
        let id = log.record(sealed.clone()).await.unwrap();

        let replayed = replay_record(&log, id).await.unwrap().unwrap();
        assert_eq!(replayed.final_answer, sealed.final_answer);
        assert!(log.verify_integrity(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_log_is_append_only() {
        let log = AuditLog::new();
        let sealed = record("s1", 1);
        log.record(sealed.clone()).await.unwrap();
        tokio_test::assert_err!(log.record(sealed).await);
    }

    #[tokio::test]
    async fn test_tampered_record_rejected() {
        let log = AuditLog::new();
        let mut tampered = record("s1", 1);
        tampered.final_answer = "You spent $1.00.".to_string();
        assert!(matches!(log.record(tampered).await, Err(AgentError::AuditError(_))));
        assert_eq!(log.len().await, 0);
    }

    #[tokio::test]
    async fn test_list_for_session_in_turn_order() {
        let log = AuditLog::new();
        log.record(record("s1", 3)).await.unwrap();
        log.record(record("s2", 1)).await.unwrap();
        log.record(record("s1", 1)).await.unwrap();

        let turns: Vec<u32> = log
            .list_for_session("s1")
            .await
            .unwrap()
            .iter()
            .map(|r| r.turn_index)
            .collect();
        assert_eq!(turns, vec![1, 3]);
        assert!(!log.verify_integrity(Uuid::new_v4()).await.unwrap());
    }
}
