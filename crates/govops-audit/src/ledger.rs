//! The audit ledger: owns the chain tip, appends records, and answers queries.

use std::sync::Arc;

use chrono::Utc;
use govops_storage::{AuditFilter, AuditRecord, AuditStore, PendingRecord, StorageError, GENESIS_HASH};
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chain;
use crate::export::{self, ExportFormat};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Input to [`AuditLedger::log`]: the decision to record, pre-hash.
#[derive(Debug, Clone, Default)]
pub struct LogInput {
    pub agent_id: String,
    pub action: String,
    pub permitted: bool,
    pub trust_level: Option<u8>,
    pub required_level: Option<u8>,
    pub budget_used: Option<f64>,
    pub budget_remaining: Option<f64>,
    pub reason: Option<String>,
    pub metadata: Option<Value>,
}

/// A checkpoint recorded when `maxRecords` eviction trims the oldest prefix.
///
/// `verify()` treats `hash` as the effective genesis for the records still
/// held, and reports `broken_at` relative to that remaining window.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub hash: String,
    /// Total number of records evicted up to and including this checkpoint.
    pub evicted_count: usize,
}

pub struct AuditLedger {
    store: Arc<dyn AuditStore>,
    tip: Mutex<String>,
    max_records: usize,
    checkpoint: Mutex<Option<Checkpoint>>,
}

impl AuditLedger {
    /// Build a ledger over `store`. `max_records == 0` means unbounded.
    pub fn new(store: Arc<dyn AuditStore>, max_records: usize) -> Result<Self> {
        let existing = store.all()?;
        let tip = existing
            .last()
            .map(|r| r.record_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        info!(record_count = existing.len(), "audit ledger initialised");

        Ok(Self {
            store,
            tip: Mutex::new(tip),
            max_records,
            checkpoint: Mutex::new(None),
        })
    }

    /// Append a new record for `input`, linking it to the current chain tip.
    ///
    /// Internally serialised: concurrent callers see a well-formed,
    /// gap-free chain.
    pub fn log(&self, input: LogInput) -> Result<AuditRecord> {
        let mut tip = self.tip.lock();

        let pending = PendingRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent_id: input.agent_id,
            action: input.action,
            permitted: input.permitted,
            trust_level: input.trust_level,
            required_level: input.required_level,
            budget_used: input.budget_used,
            budget_remaining: input.budget_remaining,
            reason: input.reason,
            metadata: input.metadata,
            previous_hash: tip.clone(),
        };

        let record = chain::append(pending);
        self.store.append(record.clone())?;
        *tip = record.record_hash.clone();

        info!(
            record_id = %record.id,
            agent_id = %record.agent_id,
            permitted = record.permitted,
            "audit record logged"
        );

        drop(tip);
        if self.max_records > 0 {
            self.enforce_cap()?;
        }

        Ok(record)
    }

    fn enforce_cap(&self) -> Result<()> {
        let count = self.store.count()?;
        if count <= self.max_records {
            return Ok(());
        }

        let overflow = count - self.max_records;
        let evicted = self.store.evict_oldest(overflow)?;
        if let Some(last) = evicted.last() {
            let mut checkpoint = self.checkpoint.lock();
            let evicted_count = checkpoint.as_ref().map(|c| c.evicted_count).unwrap_or(0) + evicted.len();
            warn!(
                evicted = evicted.len(),
                checkpoint_hash = %last.record_hash,
                "audit cap reached, evicting oldest records and recording checkpoint"
            );
            *checkpoint = Some(Checkpoint {
                hash: last.record_hash.clone(),
                evicted_count,
            });
        }
        Ok(())
    }

    /// The current checkpoint, if any eviction has occurred.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint.lock().clone()
    }

    /// Verify the chain over all currently-held records.
    pub fn verify(&self) -> Result<chain::VerifyResult> {
        let records = self.store.all()?;
        let genesis = self
            .checkpoint
            .lock()
            .as_ref()
            .map(|c| c.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        Ok(chain::verify(&records, &genesis))
    }

    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>> {
        Ok(self.store.query(filter)?)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.store.count()?)
    }

    /// Export the selected record set. `filter == None` exports everything.
    pub fn export(&self, format: ExportFormat, filter: Option<&AuditFilter>) -> Result<String> {
        let records = match filter {
            Some(f) => self.store.query(f)?,
            None => self.store.all()?,
        };
        Ok(export::export(&records, format))
    }
}
