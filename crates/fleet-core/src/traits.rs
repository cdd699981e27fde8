//! Collaborator traits injected into the orchestrator.
//!
//! These traits are the complete boundary between the orchestration core and
//! the outside world:
//!
//! - `Connector`: outgoing channel to agents
//! - `FlowStore`: durable flow records, replies and results
//! - `RuleStore`: foreman rules
//! - `ClientStore`: client metadata and the per-client foreman marker
//! - `BlobStore`: content-addressed blobs
//! - `Sink`: consumer of out-of-band parcels
//! - `AuditWriter`: append-only record of flow decisions
//!
//! Every store operation is assumed atomic at single-record granularity.

use chrono::{DateTime, Utc};

use fleet_contracts::{
    blob::BlobId,
    error::FleetResult,
    event::FlowEvent,
    flow::{FlowRecord, FlowResult},
    foreman::{ClientFullInfo, ForemanRule},
    ids::{ClientId, FlowKey},
    message::{ActionRequest, FlowResponse, Parcel},
};

/// The outgoing channel that carries action requests to agents.
///
/// Delivery is at-least-once; agents are expected to handle duplicates.
pub trait Connector: Send + Sync {
    /// Hand `request` to the transport. Must not block waiting for a reply.
    fn send(&self, request: &ActionRequest) -> FleetResult<()>;
}

/// Durable storage of flows, their replies, and their results.
pub trait FlowStore: Send + Sync {
    /// Insert or overwrite a flow record.
    ///
    /// Implementations must reject writes that violate
    /// `FlowState::can_transition_to` with `FleetError::InvalidFlowTransition`.
    fn write_flow(&self, record: &FlowRecord) -> FleetResult<()>;

    /// Read one flow record, or `None` if the client has no such flow.
    fn read_flow(&self, key: &FlowKey) -> FleetResult<Option<FlowRecord>>;

    /// All flows of a client created at or after `min_create_time`.
    ///
    /// Child flows are skipped unless `include_child_flows` is set.
    fn read_all_flows(
        &self,
        client_id: &ClientId,
        min_create_time: DateTime<Utc>,
        include_child_flows: bool,
    ) -> FleetResult<Vec<FlowRecord>>;

    /// Persist replies. Rewriting an existing response id is idempotent.
    fn write_flow_responses(&self, responses: &[FlowResponse]) -> FleetResult<()>;

    /// Stored replies of one request, ordered by response id.
    fn read_flow_responses(&self, key: &FlowKey, request_id: u64) -> FleetResult<Vec<FlowResponse>>;

    fn write_flow_results(&self, results: &[FlowResult]) -> FleetResult<()>;

    /// Results of a flow in publication order, paged by `offset`/`count`.
    fn read_flow_results(&self, key: &FlowKey, offset: usize, count: usize) -> FleetResult<Vec<FlowResult>>;

    /// Results of a flow whose timestamp lies in `[from, to)`.
    fn read_flow_results_in_range(
        &self,
        key: &FlowKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> FleetResult<Vec<FlowResult>>;
}

/// Storage of foreman rules.
pub trait RuleStore: Send + Sync {
    fn write_foreman_rule(&self, rule: &ForemanRule) -> FleetResult<()>;

    fn read_all_foreman_rules(&self) -> FleetResult<Vec<ForemanRule>>;

    /// Remove every rule whose expiration time is before `now`. Returns the
    /// number of rules removed.
    fn remove_expired_foreman_rules(&self, now: DateTime<Utc>) -> FleetResult<usize>;
}

/// Storage of client metadata.
pub trait ClientStore: Send + Sync {
    fn write_client_info(&self, info: &ClientFullInfo) -> FleetResult<()>;

    fn read_client_full_info(&self, client_id: &ClientId) -> FleetResult<Option<ClientFullInfo>>;

    /// Creation time of the newest rule the foreman considered for the client.
    fn read_last_foreman_time(&self, client_id: &ClientId) -> FleetResult<Option<DateTime<Utc>>>;

    fn write_last_foreman_time(&self, client_id: &ClientId, time: DateTime<Utc>) -> FleetResult<()>;
}

/// Content-addressed blob storage.
pub trait BlobStore: Send + Sync {
    /// Store `data` and return its SHA-256 id. Rewriting is idempotent.
    fn write_blob(&self, data: &[u8]) -> FleetResult<BlobId>;

    fn read_blob(&self, id: &BlobId) -> FleetResult<Option<Vec<u8>>>;
}

/// A consumer of out-of-band parcels.
pub trait Sink: Send + Sync {
    /// Accept one parcel produced on behalf of `client_id`.
    fn accept(&self, client_id: &ClientId, parcel: &Parcel) -> FleetResult<()>;
}

/// The audit writer: the immutable record of flow decisions.
///
/// A failed write is fatal for the operation that produced the event.
pub trait AuditWriter: Send + Sync {
    /// Append one event. Events are never modified or deleted.
    fn write(&self, event: &FlowEvent) -> FleetResult<()>;

    /// Mark a flow as terminated in the audit log.
    fn finalize(&self, key: &FlowKey) -> FleetResult<()>;
}
