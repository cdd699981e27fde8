//! Persisted flow records and results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    ids::{ClientId, FlowId, FlowKey, HuntId},
    payload::AnyPayload,
};

/// Lifecycle state of a flow.
///
/// `Running` is the only non-terminal state. `Finished` and `Error` are
/// absorbing: once written, a flow record is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    Running,
    Finished,
    Error,
}

impl FlowState {
    /// Whether a record in this state may be overwritten with `next`.
    ///
    /// `Running -> Running` covers bookkeeping updates such as the request
    /// counter.
    pub fn can_transition_to(&self, next: FlowState) -> bool {
        matches!(
            (self, next),
            (FlowState::Running, FlowState::Running)
                | (FlowState::Running, FlowState::Finished)
                | (FlowState::Running, FlowState::Error)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Finished | FlowState::Error)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::Running => f.write_str("RUNNING"),
            FlowState::Finished => f.write_str("FINISHED"),
            FlowState::Error => f.write_str("ERROR"),
        }
    }
}

/// The durable record of one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub client_id: ClientId,
    pub flow_id: FlowId,
    /// Name of the flow type, compared by the duplicate-flow throttle.
    pub flow_name: String,
    /// User (or subsystem) that started the flow.
    pub creator: String,
    /// Immutable start arguments.
    pub args: AnyPayload,
    pub state: FlowState,
    /// Set only in `Error` state.
    pub error_message: Option<String>,
    /// Parent flow, for flows started through `call_flow`.
    pub parent_flow_id: Option<FlowId>,
    /// Request id in the parent flow that this child completes.
    pub parent_request_id: Option<u64>,
    /// Hunt that started this flow, for foreman-started flows.
    pub parent_hunt_id: Option<HuntId>,
    /// Next request id the flow will allocate.
    pub next_request_id: u64,
    pub create_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
}

impl FlowRecord {
    pub fn key(&self) -> FlowKey {
        FlowKey::new(self.client_id.clone(), self.flow_id.clone())
    }

    pub fn is_child(&self) -> bool {
        self.parent_flow_id.is_some()
    }
}

/// One result published by a flow with `send_reply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    pub client_id: ClientId,
    pub flow_id: FlowId,
    pub payload: AnyPayload,
    pub timestamp: DateTime<Utc>,
}
