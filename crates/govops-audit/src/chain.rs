//! SHA-256 hash chain linking consecutive audit records.

use govops_storage::{AuditRecord, PendingRecord, GENESIS_HASH};
use sha2::{Digest, Sha256};

use crate::canonical::to_canonical_bytes;

/// Compute the hash a finalised record derived from `pending` must carry.
///
/// `hash = SHA256(canonical(pending) ‖ 0x0A ‖ pending.previous_hash)`.
pub fn compute_hash(pending: &PendingRecord) -> String {
    let value = serde_json::to_value(pending).expect("PendingRecord is always serializable");
    let mut input = to_canonical_bytes(&value);
    input.push(b'\n');
    input.extend_from_slice(pending.previous_hash.as_bytes());

    let digest = Sha256::digest(&input);
    hex::encode(digest)
}

/// Finalise a pending record by computing and attaching its hash.
pub fn append(pending: PendingRecord) -> AuditRecord {
    let hash = compute_hash(&pending);
    pending.finalise(hash)
}

/// Result of walking the chain from a given starting hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResult {
    pub valid: bool,
    pub broken_at: Option<usize>,
    pub reason: Option<String>,
    pub record_count: usize,
}

/// Verify the chain formed by `records`, starting from `genesis`.
///
/// `genesis` is ordinarily [`GENESIS_HASH`], but may be a checkpoint hash
/// when the ledger has evicted an older prefix (see the `maxRecords`
/// eviction remedy).
pub fn verify(records: &[AuditRecord], genesis: &str) -> VerifyResult {
    let mut expected = genesis.to_string();

    for (i, record) in records.iter().enumerate() {
        if record.previous_hash != expected {
            return VerifyResult {
                valid: false,
                broken_at: Some(i),
                reason: Some(format!(
                    "record {i}: previous_hash mismatch (expected {expected}, got {})",
                    record.previous_hash
                )),
                record_count: records.len(),
            };
        }

        let recomputed = compute_hash(&record.without_hash());
        if recomputed != record.record_hash {
            return VerifyResult {
                valid: false,
                broken_at: Some(i),
                reason: Some(format!("record {i}: content altered, record_hash no longer matches")),
                record_count: records.len(),
            };
        }

        expected = record.record_hash.clone();
    }

    VerifyResult {
        valid: true,
        broken_at: None,
        reason: None,
        record_count: records.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn pending(agent: &str, previous_hash: &str) -> PendingRecord {
        PendingRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent_id: agent.to_string(),
            action: "op".to_string(),
            permitted: true,
            trust_level: None,
            required_level: None,
            budget_used: None,
            budget_remaining: None,
            reason: None,
            metadata: None,
            previous_hash: previous_hash.to_string(),
        }
    }

    #[test]
    fn test_append_chains_to_previous() {
        let r1 = append(pending("a1", GENESIS_HASH));
        let r2 = append(pending("a2", &r1.record_hash));
        assert_eq!(r2.previous_hash, r1.record_hash);
    }

    #[test]
    fn test_hash_is_lowercase_hex_64_chars() {
        let r1 = append(pending("a1", GENESIS_HASH));
        assert_eq!(r1.record_hash.len(), 64);
        assert!(r1.record_hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn test_verify_valid_chain() {
        let r1 = append(pending("a1", GENESIS_HASH));
        let r2 = append(pending("a2", &r1.record_hash));
        let r3 = append(pending("a3", &r2.record_hash));
        let result = verify(&[r1, r2, r3], GENESIS_HASH);
        assert!(result.valid);
        assert_eq!(result.record_count, 3);
        assert!(result.broken_at.is_none());
    }

    #[test]
    fn test_verify_detects_tampered_action() {
        let r1 = append(pending("a1", GENESIS_HASH));
        let mut r2 = append(pending("a2", &r1.record_hash));
        let r3 = append(pending("a3", &r2.record_hash));

        r2.action = "tampered".to_string();

        let result = verify(&[r1, r2, r3], GENESIS_HASH);
        assert!(!result.valid);
        assert_eq!(result.broken_at, Some(1));
    }

    #[test]
    fn test_verify_detects_broken_previous_hash_link() {
        let r1 = append(pending("a1", GENESIS_HASH));
        let r2 = append(pending("a2", &r1.record_hash));
        let mut r3 = append(pending("a3", &r2.record_hash));

        r3.previous_hash = "wronghash".to_string();

        let result = verify(&[r1, r2, r3], GENESIS_HASH);
        assert!(!result.valid);
        assert_eq!(result.broken_at, Some(2));
    }

    #[test]
    fn test_verify_empty_chain_is_valid() {
        let result = verify(&[], GENESIS_HASH);
        assert!(result.valid);
        assert_eq!(result.record_count, 0);
    }

    #[test]
    fn test_first_record_previous_hash_is_genesis() {
        let r1 = append(pending("a1", GENESIS_HASH));
        assert_eq!(r1.previous_hash, GENESIS_HASH);
    }
}
