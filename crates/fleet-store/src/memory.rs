//! In-memory implementation of every store trait.
//!
//! `InMemoryDatastore` keeps flows, replies, results, foreman rules, client
//! metadata and blobs behind one `Mutex`, which makes every operation atomic
//! at single-record granularity. Clones share the same state.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use fleet_contracts::{
    blob::BlobId,
    error::{FleetError, FleetResult},
    flow::{FlowRecord, FlowResult},
    foreman::{ClientFullInfo, ForemanRule},
    ids::{ClientId, FlowKey, HuntId},
    message::FlowResponse,
};
use fleet_core::traits::{BlobStore, ClientStore, FlowStore, RuleStore};

#[derive(Default)]
pub(crate) struct State {
    pub(crate) flows: BTreeMap<FlowKey, FlowRecord>,
    /// Replies keyed by (request id, response id).
    pub(crate) responses: HashMap<FlowKey, BTreeMap<(u64, u64), FlowResponse>>,
    pub(crate) results: HashMap<FlowKey, Vec<FlowResult>>,
    pub(crate) rules: BTreeMap<HuntId, ForemanRule>,
    pub(crate) clients: HashMap<ClientId, ClientFullInfo>,
    pub(crate) foreman_markers: HashMap<ClientId, DateTime<Utc>>,
    pub(crate) blobs: HashMap<BlobId, Vec<u8>>,
}

/// A process-local datastore.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    pub(crate) state: Arc<Mutex<State>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> FleetResult<MutexGuard<'_, State>> {
        self.state.lock().map_err(|e| FleetError::Store {
            reason: format!("datastore lock poisoned: {}", e),
        })
    }

    /// Every flow of every client, ordered by key.
    pub fn all_flows(&self) -> FleetResult<Vec<FlowRecord>> {
        Ok(self.lock()?.flows.values().cloned().collect())
    }

    /// Child flows of `parent`.
    pub fn child_flows(&self, parent: &FlowKey) -> FleetResult<Vec<FlowRecord>> {
        Ok(self
            .lock()?
            .flows
            .values()
            .filter(|f| f.client_id == parent.client_id)
            .filter(|f| f.parent_flow_id.as_ref() == Some(&parent.flow_id))
            .cloned()
            .collect())
    }

    pub fn blob_count(&self) -> FleetResult<usize> {
        Ok(self.lock()?.blobs.len())
    }
}

/// SHA-256 of `data` as lowercase hex.
pub fn blob_id(data: &[u8]) -> BlobId {
    BlobId(hex::encode(Sha256::digest(data)))
}

// ── FlowStore ────────────────────────────────────────────────────────────────

impl FlowStore for InMemoryDatastore {
    fn write_flow(&self, record: &FlowRecord) -> FleetResult<()> {
        let mut state = self.lock()?;
        let key = record.key();
        if let Some(existing) = state.flows.get(&key) {
            if !existing.state.can_transition_to(record.state) {
                return Err(FleetError::InvalidFlowTransition {
                    flow_id: key.flow_id.to_string(),
                    from: existing.state.to_string(),
                    to: record.state.to_string(),
                });
            }
        }
        debug!(client_id = %key.client_id, flow_id = %key.flow_id, state = %record.state, "writing flow");
        state.flows.insert(key, record.clone());
        Ok(())
    }

    fn read_flow(&self, key: &FlowKey) -> FleetResult<Option<FlowRecord>> {
        Ok(self.lock()?.flows.get(key).cloned())
    }

    fn read_all_flows(
        &self,
        client_id: &ClientId,
        min_create_time: DateTime<Utc>,
        include_child_flows: bool,
    ) -> FleetResult<Vec<FlowRecord>> {
        Ok(self
            .lock()?
            .flows
            .values()
            .filter(|f| &f.client_id == client_id)
            .filter(|f| f.create_time >= min_create_time)
            .filter(|f| include_child_flows || !f.is_child())
            .cloned()
            .collect())
    }

    fn write_flow_responses(&self, responses: &[FlowResponse]) -> FleetResult<()> {
        let mut state = self.lock()?;
        for response in responses {
            state
                .responses
                .entry(response.key())
                .or_default()
                .insert((response.request_id, response.response_id), response.clone());
        }
        Ok(())
    }

    fn read_flow_responses(&self, key: &FlowKey, request_id: u64) -> FleetResult<Vec<FlowResponse>> {
        let state = self.lock()?;
        let Some(responses) = state.responses.get(key) else {
            return Ok(Vec::new());
        };
        Ok(responses
            .range((request_id, 0)..=(request_id, u64::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn write_flow_results(&self, results: &[FlowResult]) -> FleetResult<()> {
        let mut state = self.lock()?;
        for result in results {
            let key = FlowKey::new(result.client_id.clone(), result.flow_id.clone());
            state.results.entry(key).or_default().push(result.clone());
        }
        Ok(())
    }

    fn read_flow_results(&self, key: &FlowKey, offset: usize, count: usize) -> FleetResult<Vec<FlowResult>> {
        Ok(self
            .lock()?
            .results
            .get(key)
            .map(|results| results.iter().skip(offset).take(count).cloned().collect())
            .unwrap_or_default())
    }

    fn read_flow_results_in_range(
        &self,
        key: &FlowKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> FleetResult<Vec<FlowResult>> {
        Ok(self
            .lock()?
            .results
            .get(key)
            .map(|results| {
                results
                    .iter()
                    .filter(|r| r.timestamp >= from && r.timestamp < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ── RuleStore ────────────────────────────────────────────────────────────────

impl RuleStore for InMemoryDatastore {
    fn write_foreman_rule(&self, rule: &ForemanRule) -> FleetResult<()> {
        self.lock()?.rules.insert(rule.hunt_id.clone(), rule.clone());
        Ok(())
    }

    fn read_all_foreman_rules(&self) -> FleetResult<Vec<ForemanRule>> {
        Ok(self.lock()?.rules.values().cloned().collect())
    }

    fn remove_expired_foreman_rules(&self, now: DateTime<Utc>) -> FleetResult<usize> {
        let mut state = self.lock()?;
        let before = state.rules.len();
        state.rules.retain(|_, rule| rule.expiration_time >= now);
        let removed = before - state.rules.len();
        if removed > 0 {
            info!(removed, "removed expired foreman rules");
        }
        Ok(removed)
    }
}

// ── ClientStore ──────────────────────────────────────────────────────────────

impl ClientStore for InMemoryDatastore {
    fn write_client_info(&self, info: &ClientFullInfo) -> FleetResult<()> {
        self.lock()?.clients.insert(info.client_id.clone(), info.clone());
        Ok(())
    }

    fn read_client_full_info(&self, client_id: &ClientId) -> FleetResult<Option<ClientFullInfo>> {
        Ok(self.lock()?.clients.get(client_id).cloned())
    }

    fn read_last_foreman_time(&self, client_id: &ClientId) -> FleetResult<Option<DateTime<Utc>>> {
        Ok(self.lock()?.foreman_markers.get(client_id).copied())
    }

    fn write_last_foreman_time(&self, client_id: &ClientId, time: DateTime<Utc>) -> FleetResult<()> {
        self.lock()?.foreman_markers.insert(client_id.clone(), time);
        Ok(())
    }
}

// ── BlobStore ────────────────────────────────────────────────────────────────

impl BlobStore for InMemoryDatastore {
    fn write_blob(&self, data: &[u8]) -> FleetResult<BlobId> {
        let id = blob_id(data);
        self.lock()?.blobs.entry(id.clone()).or_insert_with(|| data.to_vec());
        Ok(id)
    }

    fn read_blob(&self, id: &BlobId) -> FleetResult<Option<Vec<u8>>> {
        Ok(self.lock()?.blobs.get(id).cloned())
    }
}
