//! The flow API: what a task author implements.
//!
//! A flow is a small state machine. `start` issues requests (agent actions
//! or child flows), each tagged with the state whose continuation should run
//! once the request completes. Continuations may issue further requests.
//! When nothing is outstanding, `end` runs and the flow finishes.
//!
//! ```rust,ignore
//! #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
//! enum State { Listed }
//!
//! impl Flow for ListProcesses {
//!     const NAME: &'static str = "ListProcesses";
//!     type Args = EmptyArgs;
//!     type State = State;
//!
//!     fn args(&self) -> &EmptyArgs { &self.args }
//!
//!     fn continuations() -> ContinuationTable<Self> {
//!         ContinuationTable::new().on(State::Listed, Self::on_listed)
//!     }
//!
//!     fn start(&mut self, ctx: &mut FlowContext<'_, State>) -> FlowResult<()> {
//!         ctx.call_action("list_processes", &EmptyArgs::default(), vec![], State::Listed)?;
//!         Ok(())
//!     }
//! }
//! ```

use std::{
    any::Any,
    backtrace::Backtrace,
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    panic::{catch_unwind, AssertUnwindSafe},
};

use thiserror::Error;

use fleet_contracts::{
    blob::BlobId,
    error::{FleetError, FleetResult},
    filter::Filter,
    ids::{ActionId, ClientId, FlowId, FlowKey},
    message::{ActionRequest, FlowResponse},
    payload::{AnyPayload, TypedPayload},
};

use crate::{
    correlator::{Correlator, Responses},
    traits::BlobStore,
    wait::{wait_for_blob, WaitPolicy},
};

// ── Errors ───────────────────────────────────────────────────────────────────

/// An unrecoverable failure raised by flow code.
///
/// The message is recorded on the flow when it moves to `ERROR`. A failure
/// constructed with an empty message records a captured backtrace instead,
/// so bare assertions stay diagnosable.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FlowError {
    message: String,
}

impl FlowError {
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.is_empty() {
            return Self {
                message: format!("assertion failed\n{}", Backtrace::force_capture()),
            };
        }
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::new()
        };
        Self::new(message)
    }
}

impl From<FleetError> for FlowError {
    fn from(error: FleetError) -> Self {
        Self::new(error.to_string())
    }
}

/// Result type of flow code.
pub type FlowResult<T> = Result<T, FlowError>;

/// Fail the current flow step unless `cond` holds.
///
/// Without a message the recorded error is a backtrace.
#[macro_export]
macro_rules! flow_ensure {
    ($cond:expr $(,)?) => {
        if !$cond {
            return Err($crate::flow::FlowError::new(String::new()));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::flow::FlowError::new(format!($($arg)+)));
        }
    };
}

// ── Flow trait ───────────────────────────────────────────────────────────────

/// A continuation: runs once the request issued with its state completes.
pub type Continuation<F> =
    for<'c> fn(&mut F, &mut FlowContext<'c, <F as Flow>::State>, Responses) -> FlowResult<()>;

/// A task orchestrated across one client.
pub trait Flow: Send + Sized + 'static {
    /// Flow type name, recorded on the flow and compared by the throttler.
    const NAME: &'static str;

    type Args: TypedPayload;

    /// Continuation selector. Each issued request carries one value.
    type State: Copy + Eq + Hash + Debug + Send + 'static;

    fn args(&self) -> &Self::Args;

    /// The table mapping each state to its continuation.
    ///
    /// Built once when the flow is registered with the orchestrator.
    fn continuations() -> ContinuationTable<Self>;

    fn start(&mut self, ctx: &mut FlowContext<'_, Self::State>) -> FlowResult<()>;

    /// Runs once after every request and child flow has completed.
    ///
    /// May publish replies but must not issue new requests.
    fn end(&mut self, _ctx: &mut FlowContext<'_, Self::State>) -> FlowResult<()> {
        Ok(())
    }
}

/// Continuations of a flow, keyed by state.
pub struct ContinuationTable<F: Flow> {
    entries: HashMap<F::State, Continuation<F>>,
}

impl<F: Flow> Default for ContinuationTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Flow> ContinuationTable<F> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `handler` for `state`, replacing an earlier registration.
    pub fn on(mut self, state: F::State, handler: Continuation<F>) -> Self {
        self.entries.insert(state, handler);
        self
    }

    pub fn get(&self, state: F::State) -> Option<Continuation<F>> {
        self.entries.get(&state).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Context ──────────────────────────────────────────────────────────────────

/// Blob access granted to flow code.
#[derive(Clone, Copy)]
pub(crate) struct BlobAccess<'a> {
    pub(crate) store: &'a dyn BlobStore,
    pub(crate) policy: &'a WaitPolicy,
}

/// Everything a runner needs from the orchestrator for one turn.
pub(crate) struct FlowEnv<'a> {
    pub(crate) key: &'a FlowKey,
    pub(crate) blobs: Option<BlobAccess<'a>>,
}

/// Side effects staged by flow code, applied by the orchestrator after the
/// flow's lock is released.
pub(crate) enum Effect {
    Dispatch(ActionRequest),
    Child {
        request_id: u64,
        runner: Box<dyn FlowRunner>,
    },
    Reply(AnyPayload),
}

/// The handle flow code uses to issue requests and publish results.
///
/// Calls never block: they stage work that the orchestrator dispatches once
/// the current step returns.
pub struct FlowContext<'a, S> {
    key: &'a FlowKey,
    blobs: Option<BlobAccess<'a>>,
    correlator: &'a mut Correlator<S>,
    effects: Vec<Effect>,
}

impl<'a, S: Copy> FlowContext<'a, S> {
    fn new(env: &FlowEnv<'a>, correlator: &'a mut Correlator<S>) -> Self {
        Self {
            key: env.key,
            blobs: env.blobs,
            correlator,
            effects: Vec::new(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.key.client_id
    }

    pub fn flow_id(&self) -> &FlowId {
        &self.key.flow_id
    }

    /// Issue an agent action. `next_state` selects the continuation that
    /// receives the replies. Returns the allocated request id.
    pub fn call_action(
        &mut self,
        action: impl Into<ActionId>,
        args: &impl TypedPayload,
        filters: Vec<Filter>,
        next_state: S,
    ) -> FleetResult<u64> {
        let args = AnyPayload::pack(args)?;
        let request_id = self.correlator.issue(next_state);
        self.effects.push(Effect::Dispatch(ActionRequest {
            client_id: self.key.client_id.clone(),
            flow_id: self.key.flow_id.clone(),
            request_id,
            action: action.into(),
            args,
            filters,
        }));
        Ok(request_id)
    }

    /// Start `child` on the same client. Its results arrive at `next_state`
    /// as the replies of one request; its failure arrives as a failed status.
    pub fn call_flow<C: Flow>(&mut self, child: C, next_state: S) -> u64 {
        let request_id = self.correlator.issue(next_state);
        self.effects.push(Effect::Child {
            request_id,
            runner: Box::new(FlowInstance::new(child)),
        });
        request_id
    }

    /// Publish one result of this flow.
    pub fn send_reply(&mut self, item: &impl TypedPayload) -> FleetResult<()> {
        let payload = AnyPayload::pack(item)?;
        self.effects.push(Effect::Reply(payload));
        Ok(())
    }

    /// Read a blob, waiting a bounded time for it to arrive.
    pub fn read_blob(&self, id: &BlobId) -> FleetResult<Vec<u8>> {
        let access = self.blobs.ok_or_else(|| FleetError::ConfigError {
            reason: "no blob store configured".to_string(),
        })?;
        wait_for_blob(access.store, id, access.policy)
    }

    fn into_effects(self) -> Vec<Effect> {
        self.effects
    }
}

// ── Type-erased runner ───────────────────────────────────────────────────────

/// One request whose continuation ran during a turn.
pub(crate) struct Completion {
    pub(crate) request_id: u64,
    pub(crate) success: bool,
    pub(crate) responses: usize,
}

/// What a turn of flow code produced.
#[derive(Default)]
pub(crate) struct Turn {
    pub(crate) effects: Vec<Effect>,
    pub(crate) completed: Vec<Completion>,
}

/// A flow instance with its state type erased, as the orchestrator holds it.
pub(crate) trait FlowRunner: Send {
    fn name(&self) -> &'static str;

    fn args(&self) -> FleetResult<AnyPayload>;

    fn next_request_id(&self) -> u64;

    /// No requests or child flows outstanding.
    fn is_idle(&self) -> bool;

    fn accept(&mut self, response: FlowResponse) -> FleetResult<bool>;

    fn start(&mut self, env: &FlowEnv<'_>) -> (Turn, FlowResult<()>);

    /// Run the continuation of every completed request, stopping at the
    /// first failure. Effects of the failing continuation are discarded.
    fn run_ready(&mut self, env: &FlowEnv<'_>) -> (Turn, FlowResult<()>);

    fn end(&mut self, env: &FlowEnv<'_>) -> (Turn, FlowResult<()>);
}

pub(crate) struct FlowInstance<F: Flow> {
    flow: F,
    table: ContinuationTable<F>,
    correlator: Correlator<F::State>,
}

impl<F: Flow> FlowInstance<F> {
    pub(crate) fn new(flow: F) -> Self {
        Self {
            flow,
            table: F::continuations(),
            correlator: Correlator::new(),
        }
    }
}

/// Run flow code, turning a panic into a flow error.
fn guard(step: impl FnOnce() -> FlowResult<()>) -> FlowResult<()> {
    match catch_unwind(AssertUnwindSafe(step)) {
        Ok(result) => result,
        Err(payload) => Err(FlowError::from_panic(payload)),
    }
}

impl<F: Flow> FlowRunner for FlowInstance<F> {
    fn name(&self) -> &'static str {
        F::NAME
    }

    fn args(&self) -> FleetResult<AnyPayload> {
        AnyPayload::pack(self.flow.args())
    }

    fn next_request_id(&self) -> u64 {
        self.correlator.next_request_id()
    }

    fn is_idle(&self) -> bool {
        self.correlator.is_idle()
    }

    fn accept(&mut self, response: FlowResponse) -> FleetResult<bool> {
        self.correlator.accept(response)
    }

    fn start(&mut self, env: &FlowEnv<'_>) -> (Turn, FlowResult<()>) {
        let flow = &mut self.flow;
        let mut ctx = FlowContext::new(env, &mut self.correlator);
        let result = guard(|| flow.start(&mut ctx));
        let turn = Turn {
            effects: ctx.into_effects(),
            completed: Vec::new(),
        };
        (turn, result)
    }

    fn run_ready(&mut self, env: &FlowEnv<'_>) -> (Turn, FlowResult<()>) {
        let mut turn = Turn::default();

        for (state, responses) in self.correlator.take_completed() {
            let Some(handler) = self.table.get(state) else {
                let missing = FleetError::MissingContinuation {
                    flow_name: F::NAME.to_string(),
                    state: format!("{:?}", state),
                };
                return (turn, Err(missing.into()));
            };

            turn.completed.push(Completion {
                request_id: responses.request_id(),
                success: responses.success(),
                responses: responses.len(),
            });

            let flow = &mut self.flow;
            let mut ctx = FlowContext::new(env, &mut self.correlator);
            let result = guard(|| handler(flow, &mut ctx, responses));
            match result {
                Ok(()) => turn.effects.extend(ctx.into_effects()),
                Err(error) => return (turn, Err(error)),
            }
        }

        (turn, Ok(()))
    }

    fn end(&mut self, env: &FlowEnv<'_>) -> (Turn, FlowResult<()>) {
        let flow = &mut self.flow;
        let mut ctx = FlowContext::new(env, &mut self.correlator);
        let result = guard(|| flow.end(&mut ctx));
        let turn = Turn {
            effects: ctx.into_effects(),
            completed: Vec::new(),
        };
        (turn, result)
    }
}
