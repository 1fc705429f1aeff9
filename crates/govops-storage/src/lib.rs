//! Storage port for the governance audit ledger.
//!
//! Defines the record shape persisted by [`govops_audit`](../govops_audit/index.html)
//! and the [`AuditStore`] capability that pluggable backends implement. The
//! reference backend, [`MemoryAuditStore`], keeps records in an ordered
//! in-memory vector and is suitable for tests and single-process hosts.
//!
//! Alternate backends (file/NDJSON, Redis, SQL) are external collaborators:
//! they must preserve insertion order and byte-exact record content, or
//! chain verification breaks.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// The 64-zero-hex constant that serves as `previous_hash` for the first record.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

const _: () = assert!(GENESIS_HASH.len() == 64);

/// A persisted audit record: a governance decision plus chain metadata.
///
/// Optional fields are omitted from the canonical hash input when absent —
/// never serialised as null — so the digest only ever covers present
/// fields. See [`govops_audit::canonical`](../govops_audit/canonical/index.html).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub action: String,
    pub permitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub previous_hash: String,
    pub record_hash: String,
}

/// A pending record: every field of [`AuditRecord`] except `record_hash`,
/// which has not been computed yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub action: String,
    pub permitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_remaining: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub previous_hash: String,
}

impl AuditRecord {
    /// The record's fields minus `record_hash`, for hash recomputation.
    pub fn without_hash(&self) -> PendingRecord {
        PendingRecord {
            id: self.id,
            timestamp: self.timestamp,
            agent_id: self.agent_id.clone(),
            action: self.action.clone(),
            permitted: self.permitted,
            trust_level: self.trust_level,
            required_level: self.required_level,
            budget_used: self.budget_used,
            budget_remaining: self.budget_remaining,
            reason: self.reason.clone(),
            metadata: self.metadata.clone(),
            previous_hash: self.previous_hash.clone(),
        }
    }
}

impl PendingRecord {
    /// Attach a computed hash, finalising the record.
    pub fn finalise(self, record_hash: String) -> AuditRecord {
        AuditRecord {
            id: self.id,
            timestamp: self.timestamp,
            agent_id: self.agent_id,
            action: self.action,
            permitted: self.permitted,
            trust_level: self.trust_level,
            required_level: self.required_level,
            budget_used: self.budget_used,
            budget_remaining: self.budget_remaining,
            reason: self.reason,
            metadata: self.metadata,
            previous_hash: self.previous_hash,
            record_hash,
        }
    }
}

/// AND-combined filter over the audit record set. All fields optional.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub agent_id: Option<String>,
    pub action: Option<String>,
    pub permitted: Option<bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(agent_id) = &self.agent_id {
            if &record.agent_id != agent_id {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &record.action != action {
                return false;
            }
        }
        if let Some(permitted) = self.permitted {
            if record.permitted != permitted {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if record.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.timestamp > end {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Append, query, count, and full-scan operations over audit records.
///
/// `all()` is semantically distinct from `query(AuditFilter::default())`:
/// the former is used for chain verification and must never apply limit or
/// offset, while the latter is a caller-facing, pageable query.
pub trait AuditStore: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<()>;
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>>;
    fn all(&self) -> Result<Vec<AuditRecord>>;
    fn count(&self) -> Result<usize>;

    /// Evict the oldest `count` records (insertion order), returning them.
    /// Used to enforce a FIFO cap on the ledger; callers must checkpoint the
    /// hash of the last evicted record before calling this, since eviction
    /// breaks `verify()` over the evicted prefix.
    fn evict_oldest(&self, count: usize) -> Result<Vec<AuditRecord>>;
}

/// In-memory ordered audit store. Reference backend; loses data on process exit.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, record: AuditRecord) -> Result<()> {
        debug!(record_id = %record.id, agent_id = %record.agent_id, "appending audit record");
        self.records.write().push(record);
        Ok(())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        let records = self.records.read();
        let mut matched: Vec<AuditRecord> = records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();

        if let Some(offset) = filter.offset {
            matched = matched.into_iter().skip(offset).collect();
        }
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn all(&self) -> Result<Vec<AuditRecord>> {
        Ok(self.records.read().clone())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }

    fn evict_oldest(&self, count: usize) -> Result<Vec<AuditRecord>> {
        let mut records = self.records.write();
        let n = count.min(records.len());
        Ok(records.drain(0..n).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(agent: &str, action: &str, permitted: bool, prev: &str) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent_id: agent.to_string(),
            action: action.to_string(),
            permitted,
            trust_level: None,
            required_level: None,
            budget_used: None,
            budget_remaining: None,
            reason: None,
            metadata: None,
            previous_hash: prev.to_string(),
            record_hash: "deadbeef".to_string(),
        }
    }

    #[test]
    fn test_append_and_count() {
        let store = MemoryAuditStore::new();
        store.append(record("a1", "op", true, GENESIS_HASH)).unwrap();
        store.append(record("a2", "op", false, "deadbeef")).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_all_preserves_insertion_order() {
        let store = MemoryAuditStore::new();
        for i in 0..5 {
            store
                .append(record(&format!("a{i}"), "op", true, GENESIS_HASH))
                .unwrap();
        }
        let all = store.all().unwrap();
        for (i, r) in all.iter().enumerate() {
            assert_eq!(r.agent_id, format!("a{i}"));
        }
    }

    #[test]
    fn test_query_filters_by_agent_and_permitted() {
        let store = MemoryAuditStore::new();
        store.append(record("a1", "op", true, GENESIS_HASH)).unwrap();
        store.append(record("a1", "op", false, "x")).unwrap();
        store.append(record("a2", "op", true, "y")).unwrap();

        let filter = AuditFilter {
            agent_id: Some("a1".to_string()),
            permitted: Some(true),
            ..Default::default()
        };
        let results = store.query(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent_id, "a1");
        assert!(results[0].permitted);
    }

    #[test]
    fn test_query_all_distinct_from_query_default() {
        let store = MemoryAuditStore::new();
        store.append(record("a1", "op", true, GENESIS_HASH)).unwrap();
        assert_eq!(store.all().unwrap().len(), 1);
        assert_eq!(store.query(&AuditFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_evict_oldest() {
        let store = MemoryAuditStore::new();
        for i in 0..5 {
            store
                .append(record(&format!("a{i}"), "op", true, GENESIS_HASH))
                .unwrap();
        }
        let evicted = store.evict_oldest(2).unwrap();
        assert_eq!(evicted.len(), 2);
        assert_eq!(evicted[0].agent_id, "a0");
        assert_eq!(evicted[1].agent_id, "a1");
        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.all().unwrap()[0].agent_id, "a2");
    }

    #[test]
    fn test_evict_oldest_saturates_at_length() {
        let store = MemoryAuditStore::new();
        store.append(record("a0", "op", true, GENESIS_HASH)).unwrap();
        let evicted = store.evict_oldest(10).unwrap();
        assert_eq!(evicted.len(), 1);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_without_hash_preserves_fields() {
        let r = record("a1", "op", true, GENESIS_HASH);
        let pending = r.without_hash();
        assert_eq!(pending.agent_id, r.agent_id);
        assert_eq!(pending.previous_hash, r.previous_hash);
    }

    #[test]
    fn test_query_limit_and_offset() {
        let store = MemoryAuditStore::new();
        for i in 0..10 {
            store
                .append(record(&format!("a{i}"), "op", true, GENESIS_HASH))
                .unwrap();
        }
        let filter = AuditFilter {
            offset: Some(2),
            limit: Some(3),
            ..Default::default()
        };
        let results = store.query(&filter).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].agent_id, "a2");
    }
}
