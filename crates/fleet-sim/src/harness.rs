//! Drives flows against the simulated endpoint until nothing is left to do.

use std::sync::Arc;

use tracing::{debug, info};

use fleet_audit::InMemoryAuditWriter;
use fleet_contracts::{
    error::{FleetError, FleetResult},
    flow::{FlowRecord, FlowState},
    ids::{ActionId, ClientId, FlowId, FlowKey},
    message::SinkId,
    payload::TypedPayload,
};
use fleet_core::{
    config::OrchestratorConfig,
    flow::{Flow, FlowResult},
    orchestrator::{Orchestrator, StartFlowOptions},
    sinks::SinkRouter,
    traits::FlowStore,
};
use fleet_store::{BlobSink, InMemoryDatastore, StartupSink};

use crate::{
    connector::QueueConnector,
    endpoint::{Endpoint, Handler},
    session::Session,
};

/// Start `flow` and run the server and the endpoint until both are idle.
///
/// The outer loop is the server side, the inner loop the endpoint side.
/// Requests may belong to `flow` or to any child flow it spawned. The loop
/// runs at least one server turn even when `start` issued nothing, since
/// child flows may still have work.
///
/// A flow whose `start` failed is returned immediately.
pub fn execute_flow<F: Flow>(
    orchestrator: &Orchestrator,
    connector: &QueueConnector,
    endpoint: &Endpoint,
    flow: F,
    options: StartFlowOptions,
) -> FleetResult<FlowId> {
    let client_id = options.client_id.clone();
    let flow_id = orchestrator.start_flow(flow, options)?;

    let key = FlowKey::new(client_id, flow_id.clone());
    if orchestrator.flow_state(&key)? == Some(FlowState::Error) {
        debug!(flow_id = %flow_id, "flow failed in start");
        return Ok(flow_id);
    }

    run_until_idle(orchestrator, connector, endpoint)?;
    Ok(flow_id)
}

/// Serve queued requests and process the replies until no request is queued.
/// Returns the number of flow turns run.
pub fn run_until_idle(
    orchestrator: &Orchestrator,
    connector: &QueueConnector,
    endpoint: &Endpoint,
) -> FleetResult<usize> {
    let mut turns = 0;
    loop {
        while let Some(request) = connector.pop()? {
            let responses = endpoint.execute(&request)?;
            orchestrator.ingest_responses(responses)?;
        }
        turns += orchestrator.process_flows()?;
        if connector.is_empty()? {
            break;
        }
    }
    Ok(turns)
}

// ── Simulation ───────────────────────────────────────────────────────────────

/// A complete in-process deployment: datastore, audit chain, orchestrator,
/// and one simulated endpoint with the blob and startup sinks wired in.
pub struct Simulation {
    pub store: InMemoryDatastore,
    pub audit: InMemoryAuditWriter,
    pub connector: QueueConnector,
    pub orchestrator: Arc<Orchestrator>,
    endpoint: Endpoint,
}

impl Simulation {
    pub fn new(config: &OrchestratorConfig) -> Self {
        let store = InMemoryDatastore::new();
        let audit = InMemoryAuditWriter::new("orchestrator");
        let connector = QueueConnector::new();

        let orchestrator = Orchestrator::new(
            Arc::new(store.clone()),
            Arc::new(connector.clone()),
            Arc::new(audit.clone()),
            config,
        )
        .with_blob_store(Arc::new(store.clone()));

        let sinks = SinkRouter::new()
            .with(SinkId::Blob, Arc::new(BlobSink::new(Arc::new(store.clone()))))
            .with(SinkId::Startup, Arc::new(StartupSink::new(Arc::new(store.clone()))));

        info!(
            daily_request_limit = config.throttle.daily_request_limit,
            duplicate_interval_secs = config.throttle.duplicate_interval_secs,
            "simulation ready"
        );

        Self {
            store,
            audit,
            connector,
            orchestrator: Arc::new(orchestrator),
            endpoint: Endpoint::new(sinks),
        }
    }

    pub fn handle<H>(mut self, action: &str, handler: H) -> Self
    where
        H: Fn(&mut Session) -> FlowResult<()> + Send + Sync + 'static,
    {
        self.endpoint.register(action, handler);
        self
    }

    pub fn with_handlers(mut self, handlers: Vec<(ActionId, Handler)>) -> Self {
        self.endpoint = self.endpoint.with_handlers(handlers);
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn execute_flow<F: Flow>(&self, flow: F, options: StartFlowOptions) -> FleetResult<FlowId> {
        execute_flow(&self.orchestrator, &self.connector, &self.endpoint, flow, options)
    }

    pub fn run_until_idle(&self) -> FleetResult<usize> {
        run_until_idle(&self.orchestrator, &self.connector, &self.endpoint)
    }

    /// The stored record of a flow.
    pub fn flow(&self, client_id: &ClientId, flow_id: &FlowId) -> FleetResult<FlowRecord> {
        self.store
            .read_flow(&FlowKey::new(client_id.clone(), flow_id.clone()))?
            .ok_or_else(|| FleetError::UnknownFlow {
                client_id: client_id.to_string(),
                flow_id: flow_id.to_string(),
            })
    }

    /// Every result a flow published, unpacked as `T`.
    pub fn results<T: TypedPayload>(&self, client_id: &ClientId, flow_id: &FlowId) -> FleetResult<Vec<T>> {
        let key = FlowKey::new(client_id.clone(), flow_id.clone());
        self.store
            .read_flow_results(&key, 0, usize::MAX)?
            .iter()
            .map(|r| r.payload.unpack::<T>())
            .collect()
    }
}
