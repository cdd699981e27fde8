//! In-memory implementation of `AuditWriter`.
//!
//! One writer records the events of every flow of an orchestrator in a single
//! chain. `events_for` projects the chain onto one flow.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::info;

use fleet_contracts::{
    error::{FleetError, FleetResult},
    event::FlowEvent,
    ids::FlowKey,
};
use fleet_core::traits::AuditWriter;

use crate::{
    chain::{hash_event, verify_chain},
    event::{AuditEntry, AuditLog},
};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct InMemoryState {
    pub(crate) entries: Vec<AuditEntry>,

    /// The next sequence number to assign.
    pub(crate) sequence: u64,

    /// The `this_hash` of the last entry, or `GENESIS_HASH`.
    pub(crate) last_hash: String,

    pub(crate) finalized: Vec<FlowKey>,
}

// ── Public writer ─────────────────────────────────────────────────────────────

/// An in-memory, append-only audit writer backed by a SHA-256 hash chain.
///
/// Clones share the same chain.
#[derive(Clone)]
pub struct InMemoryAuditWriter {
    log_id: String,
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryAuditWriter {
    pub fn new(log_id: impl Into<String>) -> Self {
        let state = InMemoryState {
            entries: Vec::new(),
            sequence: 0,
            last_hash: AuditEntry::GENESIS_HASH.to_string(),
            finalized: Vec::new(),
        };
        Self {
            log_id: log_id.into(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> FleetResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| FleetError::AuditWriteFailed {
            reason: format!("audit state lock poisoned: {}", e),
        })
    }

    /// Export every entry written so far.
    pub fn export_log(&self) -> FleetResult<AuditLog> {
        let state = self.lock()?;
        let terminal_hash = state
            .entries
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();

        Ok(AuditLog {
            log_id: self.log_id.clone(),
            entries: state.entries.clone(),
            finalized: state.finalized.clone(),
            exported_at: Utc::now(),
            terminal_hash,
        })
    }

    /// The events of one flow, in the order they were written.
    pub fn events_for(&self, key: &FlowKey) -> FleetResult<Vec<FlowEvent>> {
        Ok(self
            .lock()?
            .entries
            .iter()
            .filter(|e| e.event.client_id == key.client_id && e.event.flow_id == key.flow_id)
            .map(|e| e.event.clone())
            .collect())
    }

    /// Whether the outcome of `key` has been recorded.
    pub fn is_finalized(&self, key: &FlowKey) -> FleetResult<bool> {
        Ok(self.lock()?.finalized.contains(key))
    }

    pub fn len(&self) -> FleetResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> FleetResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Verify that the in-memory chain has not been tampered with.
    pub fn verify_integrity(&self) -> FleetResult<bool> {
        Ok(verify_chain(&self.lock()?.entries))
    }
}

// ── AuditWriter impl ──────────────────────────────────────────────────────────

impl AuditWriter for InMemoryAuditWriter {
    fn write(&self, event: &FlowEvent) -> FleetResult<()> {
        let mut state = self.lock()?;

        let prev_hash = state.last_hash.clone();
        let sequence = state.sequence;
        let this_hash = hash_event(&self.log_id, sequence, event, &prev_hash)?;

        state.entries.push(AuditEntry {
            sequence,
            log_id: self.log_id.clone(),
            event: event.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.sequence += 1;
        state.last_hash = this_hash;

        Ok(())
    }

    fn finalize(&self, key: &FlowKey) -> FleetResult<()> {
        let mut state = self.lock()?;
        state.finalized.push(key.clone());

        info!(
            client_id = %key.client_id,
            flow_id = %key.flow_id,
            entry_count = state.entries.len(),
            terminal_hash = %state.last_hash,
            "flow audit finalized"
        );

        Ok(())
    }
}
