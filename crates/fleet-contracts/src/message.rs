//! Wire messages exchanged with agents.
//!
//! `ActionRequest` goes out; a stream of `FlowResponse`s comes back, ending
//! with a status element; `Parcel`s travel beside the stream to sinks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    filter::Filter,
    ids::{ActionId, ClientId, FlowId, FlowKey},
    payload::AnyPayload,
};

/// A dispatched action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub client_id: ClientId,
    pub flow_id: FlowId,
    /// Unique within the flow, assigned at issue time.
    pub request_id: u64,
    pub action: ActionId,
    pub args: AnyPayload,
    /// Result filters the agent applies before replying.
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// Outcome of a request carried by the terminal element of its reply stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Ok,
    Error,
}

/// The terminal status of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStatus {
    pub kind: StatusKind,
    /// Empty unless `kind` is `Error`.
    #[serde(default)]
    pub error_message: String,
}

impl ResponseStatus {
    pub fn ok() -> Self {
        Self {
            kind: StatusKind::Ok,
            error_message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::Error,
            error_message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.kind == StatusKind::Ok
    }
}

/// Body of one element of a reply stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "body", rename_all = "snake_case")]
pub enum ResponseBody {
    Payload { payload: AnyPayload },
    Status { status: ResponseStatus },
}

/// One element of the reply stream for `(flow_id, request_id)`.
///
/// Payload elements carry response ids `1..=N`; the status element carries
/// `N + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResponse {
    pub client_id: ClientId,
    pub flow_id: FlowId,
    pub request_id: u64,
    pub response_id: u64,
    pub body: ResponseBody,
}

impl FlowResponse {
    pub fn payload(
        client_id: ClientId,
        flow_id: FlowId,
        request_id: u64,
        response_id: u64,
        payload: AnyPayload,
    ) -> Self {
        Self {
            client_id,
            flow_id,
            request_id,
            response_id,
            body: ResponseBody::Payload { payload },
        }
    }

    pub fn status(
        client_id: ClientId,
        flow_id: FlowId,
        request_id: u64,
        response_id: u64,
        status: ResponseStatus,
    ) -> Self {
        Self {
            client_id,
            flow_id,
            request_id,
            response_id,
            body: ResponseBody::Status { status },
        }
    }

    pub fn key(&self) -> FlowKey {
        FlowKey::new(self.client_id.clone(), self.flow_id.clone())
    }

    pub fn is_status(&self) -> bool {
        matches!(self.body, ResponseBody::Status { .. })
    }
}

/// Identifier of an out-of-band payload consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SinkId {
    /// Agent startup metadata.
    Startup,
    /// Raw file content chunks.
    Blob,
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkId::Startup => f.write_str("STARTUP"),
            SinkId::Blob => f.write_str("BLOB"),
        }
    }
}

/// An out-of-band payload addressed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub sink: SinkId,
    pub payload: AnyPayload,
}
