//! Test doubles shared by the unit tests of this crate.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_contracts::{
    blob::BlobId,
    error::{FleetError, FleetResult},
    event::FlowEvent,
    flow::{FlowRecord, FlowResult, FlowState},
    ids::{ClientId, FlowId, FlowKey},
    message::{ActionRequest, FlowResponse},
    payload::{AnyPayload, TypedPayload},
};

use crate::traits::{AuditWriter, BlobStore, Connector, FlowStore};

/// Arguments used by test flows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Args {
    pub(crate) path: String,
}

impl TypedPayload for Args {
    const TYPE_NAME: &'static str = "TestArgs";
}

/// A reply item used by test flows and fake agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Item {
    pub(crate) n: u32,
}

impl TypedPayload for Item {
    const TYPE_NAME: &'static str = "TestItem";
}

/// A RUNNING record with the given identity, created now.
pub(crate) fn record(
    client_id: &ClientId,
    flow_id: &str,
    flow_name: &str,
    creator: &str,
    args: AnyPayload,
) -> FlowRecord {
    let now = Utc::now();
    FlowRecord {
        client_id: client_id.clone(),
        flow_id: FlowId::new(flow_id),
        flow_name: flow_name.to_string(),
        creator: creator.to_string(),
        args,
        state: FlowState::Running,
        error_message: None,
        parent_flow_id: None,
        parent_request_id: None,
        parent_hunt_id: None,
        next_request_id: 1,
        create_time: now,
        last_update_time: now,
    }
}

#[derive(Default)]
pub(crate) struct StoreState {
    pub(crate) flows: BTreeMap<FlowKey, FlowRecord>,
    pub(crate) responses: Vec<FlowResponse>,
    pub(crate) results: Vec<FlowResult>,
    pub(crate) blobs: HashMap<String, Vec<u8>>,
}

/// An in-memory flow store that enforces the transition table.
#[derive(Clone, Default)]
pub(crate) struct MockStore {
    pub(crate) state: Arc<Mutex<StoreState>>,
    fail_reads: bool,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A store whose reads of flow lists fail.
    pub(crate) fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub(crate) fn flow(&self, key: &FlowKey) -> FlowRecord {
        self.state.lock().unwrap().flows[key].clone()
    }

    pub(crate) fn flows(&self) -> Vec<FlowRecord> {
        self.state.lock().unwrap().flows.values().cloned().collect()
    }

    pub(crate) fn results(&self, key: &FlowKey) -> Vec<FlowResult> {
        self.read_flow_results(key, 0, usize::MAX).unwrap()
    }

    pub(crate) fn put_blob(&self, id: &str, data: &[u8]) {
        self.state.lock().unwrap().blobs.insert(id.to_string(), data.to_vec());
    }
}

impl FlowStore for MockStore {
    fn write_flow(&self, record: &FlowRecord) -> FleetResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.flows.get(&record.key()) {
            if !existing.state.can_transition_to(record.state) {
                return Err(FleetError::InvalidFlowTransition {
                    flow_id: record.flow_id.to_string(),
                    from: existing.state.to_string(),
                    to: record.state.to_string(),
                });
            }
        }
        state.flows.insert(record.key(), record.clone());
        Ok(())
    }

    fn read_flow(&self, key: &FlowKey) -> FleetResult<Option<FlowRecord>> {
        Ok(self.state.lock().unwrap().flows.get(key).cloned())
    }

    fn read_all_flows(
        &self,
        client_id: &ClientId,
        min_create_time: DateTime<Utc>,
        include_child_flows: bool,
    ) -> FleetResult<Vec<FlowRecord>> {
        if self.fail_reads {
            return Err(FleetError::Store {
                reason: "reads disabled".to_string(),
            });
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .flows
            .values()
            .filter(|f| &f.client_id == client_id)
            .filter(|f| f.create_time >= min_create_time)
            .filter(|f| include_child_flows || !f.is_child())
            .cloned()
            .collect())
    }

    fn write_flow_responses(&self, responses: &[FlowResponse]) -> FleetResult<()> {
        self.state.lock().unwrap().responses.extend_from_slice(responses);
        Ok(())
    }

    fn read_flow_responses(&self, key: &FlowKey, request_id: u64) -> FleetResult<Vec<FlowResponse>> {
        let mut found: Vec<FlowResponse> = self
            .state
            .lock()
            .unwrap()
            .responses
            .iter()
            .filter(|r| &r.key() == key && r.request_id == request_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.response_id);
        Ok(found)
    }

    fn write_flow_results(&self, results: &[FlowResult]) -> FleetResult<()> {
        self.state.lock().unwrap().results.extend_from_slice(results);
        Ok(())
    }

    fn read_flow_results(&self, key: &FlowKey, offset: usize, count: usize) -> FleetResult<Vec<FlowResult>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .results
            .iter()
            .filter(|r| r.client_id == key.client_id && r.flow_id == key.flow_id)
            .skip(offset)
            .take(count)
            .cloned()
            .collect())
    }

    fn read_flow_results_in_range(
        &self,
        key: &FlowKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> FleetResult<Vec<FlowResult>> {
        Ok(self
            .results(key)
            .into_iter()
            .filter(|r| r.timestamp >= from && r.timestamp < to)
            .collect())
    }
}

impl BlobStore for MockStore {
    fn write_blob(&self, data: &[u8]) -> FleetResult<BlobId> {
        let id = format!("blob-{}", data.len());
        self.put_blob(&id, data);
        Ok(BlobId(id))
    }

    fn read_blob(&self, id: &BlobId) -> FleetResult<Option<Vec<u8>>> {
        Ok(self.state.lock().unwrap().blobs.get(&id.0).cloned())
    }
}

/// A connector that records every dispatched request.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    pub(crate) sent: Arc<Mutex<Vec<ActionRequest>>>,
    pub(crate) refuse: bool,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Remove and return everything sent so far.
    pub(crate) fn take(&self) -> Vec<ActionRequest> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Connector for MockConnector {
    fn send(&self, request: &ActionRequest) -> FleetResult<()> {
        if self.refuse {
            return Err(FleetError::Store {
                reason: "queue full".to_string(),
            });
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// An audit writer that records every call for later inspection.
#[derive(Clone, Default)]
pub(crate) struct MockAudit {
    pub(crate) events: Arc<Mutex<Vec<FlowEvent>>>,
    pub(crate) finalized: Arc<Mutex<Vec<FlowKey>>>,
}

impl MockAudit {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl AuditWriter for MockAudit {
    fn write(&self, event: &FlowEvent) -> FleetResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn finalize(&self, key: &FlowKey) -> FleetResult<()> {
        self.finalized.lock().unwrap().push(key.clone());
        Ok(())
    }
}
