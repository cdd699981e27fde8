//! The flow orchestrator: drives flows from start to a terminal state.
//!
//! The orchestrator runs the processing loop:
//!
//!   start → dispatch → [agent] → ingest replies → correlate → continuation → … → end
//!
//! Dispatch and collection are decoupled. Starting a flow or running a
//! continuation only stages requests; they are handed to the `Connector` once
//! the flow step returns. Replies arrive through `ingest_responses` and are
//! correlated on the next `process_flows` turn. A flow finishes once no
//! request or child flow is outstanding and its `end` hook has run.
//!
//! Each flow is guarded by its own lock, so two continuations of the same
//! flow never run concurrently while different flows progress independently.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use tracing::{debug, info, warn};

use fleet_contracts::{
    error::{FleetError, FleetResult},
    event::{FlowEvent, FlowEventKind},
    flow::{FlowRecord, FlowResult, FlowState},
    ids::{ClientId, FlowId, FlowKey, HuntId},
    message::{FlowResponse, ResponseStatus},
};

use crate::{
    config::OrchestratorConfig,
    flow::{BlobAccess, Effect, Flow, FlowEnv, FlowInstance, FlowRunner},
    throttle::FlowThrottler,
    traits::{AuditWriter, BlobStore, Connector, FlowStore},
    wait::WaitPolicy,
};

/// How a flow is started.
#[derive(Debug, Clone, PartialEq)]
pub struct StartFlowOptions {
    pub client_id: ClientId,
    /// User (or subsystem) starting the flow. Child flows inherit it.
    pub creator: String,
    /// Explicit flow id. A fresh random id is drawn when absent.
    pub flow_id: Option<FlowId>,
    /// Hunt on whose behalf the flow runs. Hunt flows are not throttled.
    pub parent_hunt_id: Option<HuntId>,
}

impl StartFlowOptions {
    pub fn new(client_id: ClientId, creator: impl Into<String>) -> Self {
        Self {
            client_id,
            creator: creator.into(),
            flow_id: None,
            parent_hunt_id: None,
        }
    }

    pub fn with_flow_id(mut self, flow_id: FlowId) -> Self {
        self.flow_id = Some(flow_id);
        self
    }

    /// Options for the flow of `hunt_id` on `client_id`: the flow id is the
    /// hunt id, so a second start on the same client is detectable.
    pub fn for_hunt(client_id: ClientId, hunt_id: &HuntId, creator: impl Into<String>) -> Self {
        Self {
            client_id,
            creator: creator.into(),
            flow_id: Some(FlowId::from(hunt_id)),
            parent_hunt_id: Some(hunt_id.clone()),
        }
    }
}

struct ActiveFlow {
    record: FlowRecord,
    runner: Box<dyn FlowRunner>,
    /// Set once `end` has been called; the flow is about to be terminated.
    ending: bool,
}

type FlowHandle = Arc<Mutex<ActiveFlow>>;

fn lock<T>(mutex: &Mutex<T>) -> FleetResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| FleetError::StateError {
        reason: format!("lock poisoned: {}", e),
    })
}

/// Drives every running flow of the process.
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::new(store, connector, audit, &OrchestratorConfig::default());
/// let flow_id = orchestrator.start_flow(ListProcesses::default(), StartFlowOptions::new(client, "alice"))?;
/// // ... agents reply ...
/// orchestrator.ingest_responses(replies)?;
/// orchestrator.process_flows()?;
/// ```
pub struct Orchestrator {
    store: Arc<dyn FlowStore>,
    connector: Arc<dyn Connector>,
    audit: Arc<dyn AuditWriter>,
    blobs: Option<Arc<dyn BlobStore>>,
    throttler: FlowThrottler,
    blob_wait: WaitPolicy,
    active: Mutex<HashMap<FlowKey, FlowHandle>>,
    inbox: Mutex<VecDeque<FlowResponse>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn FlowStore>,
        connector: Arc<dyn Connector>,
        audit: Arc<dyn AuditWriter>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            connector,
            audit,
            blobs: None,
            throttler: FlowThrottler::new(&config.throttle),
            blob_wait: config.blob_wait.clone(),
            active: Mutex::new(HashMap::new()),
            inbox: Mutex::new(VecDeque::new()),
        }
    }

    /// Give flows read access to blobs through `FlowContext::read_blob`.
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn store(&self) -> &Arc<dyn FlowStore> {
        &self.store
    }

    // ── Starting flows ───────────────────────────────────────────────────────

    /// Create `flow` on a client and run its `start` step.
    ///
    /// User-started flows are checked against the throttler first. A flow
    /// whose `start` fails is still created, directly in `ERROR`; that is not
    /// an error of this call.
    ///
    /// # Errors
    ///
    /// `DuplicateFlow` and `DailyFlowRequestLimitExceeded` from the throttler,
    /// `FlowExists` when an explicit flow id is taken, and store or audit
    /// failures.
    pub fn start_flow<F: Flow>(&self, flow: F, options: StartFlowOptions) -> FleetResult<FlowId> {
        let runner: Box<dyn FlowRunner> = Box::new(FlowInstance::new(flow));
        let args = runner.args()?;
        let client_id = options.client_id;

        if options.parent_hunt_id.is_none() {
            self.throttler.enforce_limits(
                self.store.as_ref(),
                &client_id,
                &options.creator,
                F::NAME,
                Some(&args),
            )?;
        }

        let flow_id = match options.flow_id {
            Some(flow_id) => {
                let key = FlowKey::new(client_id.clone(), flow_id.clone());
                if self.is_taken(&key)? {
                    return Err(FleetError::FlowExists {
                        client_id: client_id.to_string(),
                        flow_id: flow_id.to_string(),
                    });
                }
                flow_id
            }
            None => self.fresh_flow_id(&client_id)?,
        };

        let now = Utc::now();
        let record = FlowRecord {
            client_id,
            flow_id: flow_id.clone(),
            flow_name: F::NAME.to_string(),
            creator: options.creator,
            args,
            state: FlowState::Running,
            error_message: None,
            parent_flow_id: None,
            parent_request_id: None,
            parent_hunt_id: options.parent_hunt_id,
            next_request_id: 1,
            create_time: now,
            last_update_time: now,
        };
        self.launch(record, runner)?;
        Ok(flow_id)
    }

    fn is_taken(&self, key: &FlowKey) -> FleetResult<bool> {
        if lock(&self.active)?.contains_key(key) {
            return Ok(true);
        }
        Ok(self.store.read_flow(key)?.is_some())
    }

    fn fresh_flow_id(&self, client_id: &ClientId) -> FleetResult<FlowId> {
        loop {
            let flow_id = FlowId::random();
            if !self.is_taken(&FlowKey::new(client_id.clone(), flow_id.clone()))? {
                return Ok(flow_id);
            }
        }
    }

    fn env<'a>(&'a self, key: &'a FlowKey) -> FlowEnv<'a> {
        FlowEnv {
            key,
            blobs: self.blobs.as_deref().map(|store| BlobAccess {
                store,
                policy: &self.blob_wait,
            }),
        }
    }

    fn launch(&self, mut record: FlowRecord, mut runner: Box<dyn FlowRunner>) -> FleetResult<()> {
        let key = record.key();
        info!(
            client_id = %key.client_id,
            flow_id = %key.flow_id,
            flow_name = %record.flow_name,
            creator = %record.creator,
            "starting flow"
        );
        self.audit.write(&FlowEvent::now(
            &key,
            FlowEventKind::Started {
                flow_name: record.flow_name.clone(),
                creator: record.creator.clone(),
            },
        ))?;

        let (turn, result) = runner.start(&self.env(&key));
        record.next_request_id = runner.next_request_id();

        if let Err(error) = result {
            // Staged requests are discarded: the flow never runs with pending work.
            record.state = FlowState::Error;
            record.error_message = Some(error.message().to_string());
            return self.record_outcome(record);
        }

        self.store.write_flow(&record)?;
        let handle = Arc::new(Mutex::new(ActiveFlow {
            record: record.clone(),
            runner,
            ending: false,
        }));
        lock(&self.active)?.insert(key.clone(), handle);

        match self.apply(&record, turn.effects) {
            Ok(()) => self.finalize_if_done(&key),
            Err(error) => self.terminate(&key, Some(error.to_string())),
        }
    }

    // ── Effects ──────────────────────────────────────────────────────────────

    fn apply(&self, flow: &FlowRecord, effects: Vec<Effect>) -> FleetResult<()> {
        let key = flow.key();
        for effect in effects {
            match effect {
                Effect::Dispatch(request) => {
                    self.audit.write(&FlowEvent::now(
                        &key,
                        FlowEventKind::RequestIssued {
                            request_id: request.request_id,
                            action: request.action.clone(),
                        },
                    ))?;
                    debug!(
                        client_id = %key.client_id,
                        flow_id = %key.flow_id,
                        request_id = request.request_id,
                        action = %request.action,
                        "dispatching request"
                    );
                    self.connector
                        .send(&request)
                        .map_err(|e| FleetError::DispatchFailed {
                            flow_id: key.flow_id.to_string(),
                            request_id: request.request_id,
                            reason: e.to_string(),
                        })?;
                }

                Effect::Child { request_id, runner } => {
                    let child_id = self.fresh_flow_id(&key.client_id)?;
                    self.audit.write(&FlowEvent::now(
                        &key,
                        FlowEventKind::ChildLaunched {
                            request_id,
                            child_flow_id: child_id.clone(),
                        },
                    ))?;
                    let now = Utc::now();
                    let record = FlowRecord {
                        client_id: key.client_id.clone(),
                        flow_id: child_id,
                        flow_name: runner.name().to_string(),
                        creator: flow.creator.clone(),
                        args: runner.args()?,
                        state: FlowState::Running,
                        error_message: None,
                        parent_flow_id: Some(key.flow_id.clone()),
                        parent_request_id: Some(request_id),
                        parent_hunt_id: flow.parent_hunt_id.clone(),
                        next_request_id: 1,
                        create_time: now,
                        last_update_time: now,
                    };
                    self.launch(record, runner)?;
                }

                Effect::Reply(payload) => {
                    self.store.write_flow_results(&[FlowResult {
                        client_id: key.client_id.clone(),
                        flow_id: key.flow_id.clone(),
                        payload,
                        timestamp: Utc::now(),
                    }])?;
                }
            }
        }
        Ok(())
    }

    // ── Collection ───────────────────────────────────────────────────────────

    /// Persist agent replies and queue them for the next `process_flows` turn.
    pub fn ingest_responses(&self, responses: Vec<FlowResponse>) -> FleetResult<()> {
        if responses.is_empty() {
            return Ok(());
        }
        self.store.write_flow_responses(&responses)?;
        lock(&self.inbox)?.extend(responses);
        Ok(())
    }

    /// Correlate queued replies and run every continuation that became ready,
    /// until no reply is left queued. Returns the number of flow turns run.
    ///
    /// Replies for flows that are not running, or that the correlator rejects,
    /// are dropped with a warning and an audit entry.
    pub fn process_flows(&self) -> FleetResult<usize> {
        let mut turns = 0;
        loop {
            let batch: Vec<FlowResponse> = lock(&self.inbox)?.drain(..).collect();
            if batch.is_empty() {
                break;
            }

            let mut ready: Vec<FlowKey> = Vec::new();
            for response in batch {
                let key = response.key();
                let request_id = response.request_id;

                let Some(handle) = self.handle(&key)? else {
                    self.drop_response(&key, request_id, "flow is not running")?;
                    continue;
                };

                let accepted = lock(&handle)?.runner.accept(response);
                match accepted {
                    Ok(true) => {
                        if !ready.contains(&key) {
                            ready.push(key);
                        }
                    }
                    Ok(false) => {}
                    Err(error) => self.drop_response(&key, request_id, &error.to_string())?,
                }
            }

            for key in ready {
                self.advance(&key)?;
                turns += 1;
            }
        }
        Ok(turns)
    }

    fn handle(&self, key: &FlowKey) -> FleetResult<Option<FlowHandle>> {
        Ok(lock(&self.active)?.get(key).cloned())
    }

    fn drop_response(&self, key: &FlowKey, request_id: u64, reason: &str) -> FleetResult<()> {
        warn!(
            client_id = %key.client_id,
            flow_id = %key.flow_id,
            request_id,
            reason = %reason,
            "dropping response"
        );
        self.audit.write(&FlowEvent::now(
            key,
            FlowEventKind::ResponseDropped {
                request_id,
                reason: reason.to_string(),
            },
        ))
    }

    fn advance(&self, key: &FlowKey) -> FleetResult<()> {
        let Some(handle) = self.handle(key)? else {
            return Ok(());
        };

        let (record, turn, result) = {
            let mut active = lock(&handle)?;
            let (turn, result) = active.runner.run_ready(&self.env(key));
            let next_request_id = active.runner.next_request_id();
            active.record.next_request_id = next_request_id;
            active.record.last_update_time = Utc::now();
            (active.record.clone(), turn, result)
        };

        for completion in &turn.completed {
            self.audit.write(&FlowEvent::now(
                key,
                FlowEventKind::RequestCompleted {
                    request_id: completion.request_id,
                    success: completion.success,
                    responses: completion.responses,
                },
            ))?;
        }
        self.store.write_flow(&record)?;

        let outcome = match result {
            Ok(()) => self.apply(&record, turn.effects).map_err(|e| e.to_string()),
            Err(error) => {
                // Results published before the failing continuation are kept.
                let replies: Vec<Effect> = turn
                    .effects
                    .into_iter()
                    .filter(|e| matches!(e, Effect::Reply(_)))
                    .collect();
                self.apply(&record, replies)?;
                Err(error.message().to_string())
            }
        };

        match outcome {
            Ok(()) => self.finalize_if_done(key),
            Err(message) => self.terminate(key, Some(message)),
        }
    }

    // ── Termination ──────────────────────────────────────────────────────────

    fn finalize_if_done(&self, key: &FlowKey) -> FleetResult<()> {
        let Some(handle) = self.handle(key)? else {
            return Ok(());
        };

        let (record, turn, result) = {
            let mut active = lock(&handle)?;
            if active.ending || !active.runner.is_idle() {
                return Ok(());
            }
            active.ending = true;
            let (turn, result) = active.runner.end(&self.env(key));
            (active.record.clone(), turn, result)
        };

        if let Err(error) = result {
            return self.terminate(key, Some(error.message().to_string()));
        }

        let (replies, issued): (Vec<Effect>, Vec<Effect>) = turn
            .effects
            .into_iter()
            .partition(|e| matches!(e, Effect::Reply(_)));
        if !issued.is_empty() {
            let message = format!("flow '{}' issued requests from end()", record.flow_name);
            return self.terminate(key, Some(message));
        }
        if let Err(error) = self.apply(&record, replies) {
            return self.terminate(key, Some(error.to_string()));
        }
        self.terminate(key, None)
    }

    fn terminate(&self, key: &FlowKey, error: Option<String>) -> FleetResult<()> {
        let Some(handle) = lock(&self.active)?.remove(key) else {
            return Ok(());
        };
        let mut record = lock(&handle)?.record.clone();
        record.last_update_time = Utc::now();
        match error {
            Some(message) => {
                record.state = FlowState::Error;
                record.error_message = Some(message);
            }
            None => record.state = FlowState::Finished,
        }
        self.record_outcome(record)
    }

    /// Persist a terminal record, audit it, and report it to the parent flow.
    fn record_outcome(&self, record: FlowRecord) -> FleetResult<()> {
        let key = record.key();
        self.store.write_flow(&record)?;

        let kind = match (&record.state, &record.error_message) {
            (FlowState::Error, Some(message)) => {
                warn!(
                    client_id = %key.client_id,
                    flow_id = %key.flow_id,
                    flow_name = %record.flow_name,
                    error = %message,
                    "flow failed"
                );
                FlowEventKind::Errored {
                    message: message.clone(),
                }
            }
            _ => {
                info!(
                    client_id = %key.client_id,
                    flow_id = %key.flow_id,
                    flow_name = %record.flow_name,
                    "flow finished"
                );
                FlowEventKind::Finished
            }
        };
        self.audit.write(&FlowEvent::now(&key, kind))?;
        self.audit.finalize(&key)?;

        self.notify_parent(&record)
    }

    /// Deliver a child's outcome to its parent as the replies of one request:
    /// the child's results as payloads `1..=N`, then its status at `N + 1`.
    fn notify_parent(&self, child: &FlowRecord) -> FleetResult<()> {
        let (Some(parent_id), Some(request_id)) = (&child.parent_flow_id, child.parent_request_id)
        else {
            return Ok(());
        };

        let status = match child.state {
            FlowState::Finished => ResponseStatus::ok(),
            _ => ResponseStatus::error(child.error_message.clone().unwrap_or_default()),
        };

        let results = self.store.read_flow_results(&child.key(), 0, usize::MAX)?;
        let mut responses = Vec::with_capacity(results.len() + 1);
        let mut response_id = 1;
        for result in results {
            responses.push(FlowResponse::payload(
                child.client_id.clone(),
                parent_id.clone(),
                request_id,
                response_id,
                result.payload,
            ));
            response_id += 1;
        }
        responses.push(FlowResponse::status(
            child.client_id.clone(),
            parent_id.clone(),
            request_id,
            response_id,
            status,
        ));

        debug!(
            client_id = %child.client_id,
            flow_id = %child.flow_id,
            parent_flow_id = %parent_id,
            request_id,
            "reporting child outcome to parent"
        );
        self.ingest_responses(responses)
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    /// Current state of a flow as recorded in the store.
    pub fn flow_state(&self, key: &FlowKey) -> FleetResult<Option<FlowState>> {
        Ok(self.store.read_flow(key)?.map(|r| r.state))
    }

    /// Number of flows that have not reached a terminal state.
    pub fn active_flow_count(&self) -> FleetResult<usize> {
        Ok(lock(&self.active)?.len())
    }

    /// Number of replies waiting for the next `process_flows` turn.
    pub fn pending_responses(&self) -> FleetResult<usize> {
        Ok(lock(&self.inbox)?.len())
    }
}
