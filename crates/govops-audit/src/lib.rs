//! Tamper-evident, hash-chained audit ledger for the governance runtime.
//!
//! Every decision the evaluation pipeline makes is recorded here exactly
//! once, cryptographically linked to its predecessor. Canonical
//! serialization ([`canonical`]) and chain hashing ([`chain`]) are pure,
//! independently testable primitives; [`ledger::AuditLedger`] composes them
//! with a pluggable [`govops_storage::AuditStore`] to own the chain tip and
//! serve queries and exports.

#![forbid(unsafe_code)]

pub mod canonical;
pub mod chain;
pub mod export;
pub mod ledger;

pub use chain::VerifyResult;
pub use export::ExportFormat;
pub use govops_storage::{AuditFilter, AuditRecord, AuditStore, MemoryAuditStore, GENESIS_HASH};
pub use ledger::{AuditError, AuditLedger, Checkpoint, LogInput, Result};
