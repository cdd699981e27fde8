//! Flow lifecycle events written to the audit trail.
//!
//! The orchestrator emits one `FlowEvent` for every decision it takes about
//! a flow. Events are append-only; the audit writer never modifies them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ActionId, ClientId, FlowId, FlowKey};

/// What happened to a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FlowEventKind {
    Started {
        flow_name: String,
        creator: String,
    },
    RequestIssued {
        request_id: u64,
        action: ActionId,
    },
    ChildLaunched {
        request_id: u64,
        child_flow_id: FlowId,
    },
    RequestCompleted {
        request_id: u64,
        success: bool,
        responses: usize,
    },
    ResponseDropped {
        request_id: u64,
        reason: String,
    },
    Finished,
    Errored {
        message: String,
    },
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub client_id: ClientId,
    pub flow_id: FlowId,
    pub kind: FlowEventKind,
    pub timestamp: DateTime<Utc>,
}

impl FlowEvent {
    /// Stamp `kind` for `key` with the current time.
    pub fn now(key: &FlowKey, kind: FlowEventKind) -> Self {
        Self {
            client_id: key.client_id.clone(),
            flow_id: key.flow_id.clone(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn key(&self) -> FlowKey {
        FlowKey::new(self.client_id.clone(), self.flow_id.clone())
    }
}
