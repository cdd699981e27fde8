//! Runtime error types for the fleet orchestrator.
//!
//! All fallible operations in the workspace return `FleetResult<T>`.
//! Error variants carry enough context (ids, field paths, limits) to produce
//! actionable log lines and audit entries without parsing strings.

use thiserror::Error;

/// The unified error type for the fleet orchestrator.
#[derive(Debug, Error)]
pub enum FleetError {
    // ── Condition evaluation ─────────────────────────────────────────────────
    /// A condition was evaluated without any field path.
    #[error("condition has no field path")]
    EmptyFieldPath,

    /// A path segment names a field the record does not declare.
    #[error("record '{record}' has no field {number} (path {path:?})")]
    UnknownField {
        record: String,
        number: u32,
        path: Vec<u32>,
    },

    /// A path tried to descend into a scalar field.
    #[error("field {number} of path {path:?} is not a message")]
    NotAMessage { number: u32, path: Vec<u32> },

    /// A condition was evaluated without any operator set.
    #[error("condition has no operator")]
    MissingOperator,

    /// The operator family does not match the resolved field's declared kind.
    #[error("operator '{operator}' cannot be applied to {actual} field at path {path:?}")]
    FieldTypeMismatch {
        operator: String,
        actual: String,
        path: Vec<u32>,
    },

    /// A pattern operator or regex rule carried an invalid regular expression.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // ── Sinks ────────────────────────────────────────────────────────────────
    /// A parcel was addressed to a sink nobody registered.
    #[error("no consumer registered for sink '{sink}'")]
    UnknownSink { sink: String },

    /// A sink consumer refused a parcel.
    #[error("sink '{sink}' rejected parcel: {reason}")]
    SinkRejected { sink: String, reason: String },

    // ── Correlation and flow processing ──────────────────────────────────────
    /// A reply referenced a request that is not outstanding for its flow.
    #[error("flow {flow_id} has no outstanding request {request_id}")]
    UnknownRequest { flow_id: String, request_id: u64 },

    /// A reply carried a response id outside the valid range.
    #[error("response id {response_id} for request {request_id} is invalid")]
    InvalidResponseId { request_id: u64, response_id: u64 },

    /// A completed request maps to a state with no registered continuation.
    #[error("flow '{flow_name}' has no continuation registered for state {state}")]
    MissingContinuation { flow_name: String, state: String },

    /// A flow with the requested id already exists on the client.
    #[error("flow {flow_id} already exists on client {client_id}")]
    FlowExists { client_id: String, flow_id: String },

    /// A flow id was referenced that the store does not know.
    #[error("flow {flow_id} does not exist on client {client_id}")]
    UnknownFlow { client_id: String, flow_id: String },

    /// A write attempted an illegal flow state transition.
    #[error("flow {flow_id} cannot move from {from} to {to}")]
    InvalidFlowTransition {
        flow_id: String,
        from: String,
        to: String,
    },

    /// No agent-side handler exists for a dispatched action.
    #[error("missing handler for '{action}'")]
    MissingHandler { action: String },

    /// An agent-side action handler reported failure.
    #[error("{reason}")]
    ActionFailed { reason: String },

    /// The outgoing channel to agents refused a request.
    #[error("failed to dispatch request {request_id} of flow {flow_id}: {reason}")]
    DispatchFailed {
        flow_id: String,
        request_id: u64,
        reason: String,
    },

    // ── Foreman ──────────────────────────────────────────────────────────────
    /// A hunt's flow id is already taken on the client by an unrelated flow.
    #[error("cannot start hunt {hunt_id} on {client_id} because unrelated flow {flow_id} already exists")]
    HuntConflict {
        hunt_id: String,
        client_id: String,
        flow_id: String,
    },

    /// A hunt id was referenced that no runner knows.
    #[error("unknown hunt {hunt_id}")]
    UnknownHunt { hunt_id: String },

    /// A client rule is structurally unusable (e.g. an unset field selector).
    #[error("invalid client rule: {reason}")]
    InvalidRule { reason: String },

    // ── Throttling ───────────────────────────────────────────────────────────
    /// An identical flow ran on the client within the duplicate window.
    #[error("{message}")]
    DuplicateFlow { flow_id: String, message: String },

    /// The user reached the daily flow limit on the client.
    #[error("{count} flows run since {since}, limit: {limit}")]
    DailyFlowRequestLimitExceeded {
        count: u32,
        limit: u32,
        since: String,
    },

    // ── Storage, payloads, configuration ─────────────────────────────────────
    /// A bounded wait gave up on data that never arrived.
    #[error("referenced data not found: {reference} (after {attempts} attempts)")]
    ReferencedDataNotFound { reference: String, attempts: u32 },

    /// The backing store failed.
    #[error("store error: {reason}")]
    Store { reason: String },

    /// A payload could not be packed or unpacked.
    #[error("payload error: {reason}")]
    Payload { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The audit writer could not persist an event.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// Shared runtime state was found corrupt (e.g. a poisoned lock).
    #[error("orchestrator state error: {reason}")]
    StateError { reason: String },
}

/// Convenience alias used throughout the fleet crates.
pub type FleetResult<T> = Result<T, FleetError>;
