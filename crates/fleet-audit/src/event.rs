//! Audit entry and log types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_contracts::{event::FlowEvent, ids::FlowKey};

/// A single entry in the hash chain.
///
/// Modifying any field, including those of the embedded `event`,
/// invalidates `this_hash` and every later `prev_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    /// The log this entry belongs to.
    pub log_id: String,

    pub event: FlowEvent,

    /// Hash of the previous entry, or `GENESIS_HASH` for the first.
    pub prev_hash: String,

    pub this_hash: String,
}

impl AuditEntry {
    /// The `prev_hash` of the first entry of every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A sealed export of an audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub log_id: String,

    /// Entries in chain order.
    pub entries: Vec<AuditEntry>,

    /// Flows whose outcome has been recorded, in finalization order.
    pub finalized: Vec<FlowKey>,

    pub exported_at: DateTime<Utc>,

    /// The `this_hash` of the last entry. Empty if the log is empty.
    pub terminal_hash: String,
}
