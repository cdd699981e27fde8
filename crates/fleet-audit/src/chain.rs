//! Hash-chain primitives.
//!
//! Hash input layout (bytes, in order):
//!   1. log_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. JSON of the flow event (serde_json, compact)

use sha2::{Digest, Sha256};

use fleet_contracts::{
    error::{FleetError, FleetResult},
    event::FlowEvent,
};

use crate::event::AuditEntry;

/// Compute the SHA-256 hash of one audit entry as lowercase hex.
pub fn hash_event(log_id: &str, sequence: u64, event: &FlowEvent, prev_hash: &str) -> FleetResult<String> {
    let event_json = serde_json::to_vec(event).map_err(|e| FleetError::AuditWriteFailed {
        reason: format!("failed to serialize flow event: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(log_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&event_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Verify prev-hash linkage and hash correctness of every entry.
///
/// An empty chain is valid.
pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut expected_prev = AuditEntry::GENESIS_HASH.to_string();

    for entry in entries {
        if entry.prev_hash != expected_prev {
            return false;
        }

        match hash_event(&entry.log_id, entry.sequence, &entry.event, &entry.prev_hash) {
            Ok(recomputed) if recomputed == entry.this_hash => {}
            _ => return false,
        }

        expected_prev = entry.this_hash.clone();
    }

    true
}
