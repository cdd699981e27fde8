//! Request/response correlation for one flow.
//!
//! The correlator allocates request ids, buffers reply elements per request
//! until the stream is complete, and hands each completed request back
//! together with the continuation state it was issued with.
//!
//! A request is complete once its status element (response id `N + 1`) has
//! arrived and every payload element `1..=N` is present. Elements may arrive
//! in any order and may be redelivered.

use std::collections::BTreeMap;

use fleet_contracts::{
    error::{FleetError, FleetResult},
    message::{FlowResponse, ResponseBody, ResponseStatus},
    payload::{AnyPayload, TypedPayload},
};

/// The ordered reply collection handed to a continuation.
#[derive(Debug, Clone, PartialEq)]
pub struct Responses {
    request_id: u64,
    status: ResponseStatus,
    payloads: Vec<AnyPayload>,
}

impl Responses {
    pub fn new(request_id: u64, status: ResponseStatus, payloads: Vec<AnyPayload>) -> Self {
        Self {
            request_id,
            status,
            payloads,
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Whether the terminal status reported success.
    pub fn success(&self) -> bool {
        self.status.is_ok()
    }

    pub fn status(&self) -> &ResponseStatus {
        &self.status
    }

    /// The error message of a failed request.
    pub fn error_message(&self) -> Option<&str> {
        if self.success() {
            None
        } else {
            Some(self.status.error_message.as_str())
        }
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnyPayload> {
        self.payloads.iter()
    }

    pub fn payloads(&self) -> &[AnyPayload] {
        &self.payloads
    }

    pub fn into_payloads(self) -> Vec<AnyPayload> {
        self.payloads
    }

    /// Unpack every payload as `T`, in response id order.
    pub fn unpack_all<T: TypedPayload>(&self) -> FleetResult<Vec<T>> {
        self.payloads.iter().map(|p| p.unpack::<T>()).collect()
    }
}

#[derive(Debug)]
struct Outstanding<S> {
    state: S,
    payloads: BTreeMap<u64, AnyPayload>,
    status: Option<(u64, ResponseStatus)>,
}

impl<S> Outstanding<S> {
    fn is_complete(&self) -> bool {
        match &self.status {
            Some((status_id, _)) => self.payloads.keys().copied().eq(1..*status_id),
            None => false,
        }
    }
}

/// Per-flow request bookkeeping, generic over the continuation state type.
#[derive(Debug)]
pub struct Correlator<S> {
    next_request_id: u64,
    outstanding: BTreeMap<u64, Outstanding<S>>,
}

impl<S: Copy> Default for Correlator<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Copy> Correlator<S> {
    /// A correlator whose first request id is 1.
    pub fn new() -> Self {
        Self {
            next_request_id: 1,
            outstanding: BTreeMap::new(),
        }
    }

    /// Allocate the next request id and remember `state` for it.
    pub fn issue(&mut self, state: S) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.outstanding.insert(
            request_id,
            Outstanding {
                state,
                payloads: BTreeMap::new(),
                status: None,
            },
        );
        request_id
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_request_id
    }

    /// Number of requests still awaiting completion.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_idle(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Record one reply element. Returns whether its request is now complete.
    ///
    /// # Errors
    ///
    /// `UnknownRequest` if the request is not outstanding (never issued, or
    /// already completed); `InvalidResponseId` for id 0, for a payload at or
    /// after the status element, or for a second status with a different id.
    pub fn accept(&mut self, response: FlowResponse) -> FleetResult<bool> {
        let request_id = response.request_id;
        let response_id = response.response_id;
        let invalid = || FleetError::InvalidResponseId {
            request_id,
            response_id,
        };

        if response_id == 0 {
            return Err(invalid());
        }

        let entry = self
            .outstanding
            .get_mut(&request_id)
            .ok_or_else(|| FleetError::UnknownRequest {
                flow_id: response.flow_id.to_string(),
                request_id,
            })?;

        match response.body {
            ResponseBody::Payload { payload } => {
                if let Some((status_id, _)) = &entry.status {
                    if response_id >= *status_id {
                        return Err(invalid());
                    }
                }
                entry.payloads.insert(response_id, payload);
            }
            ResponseBody::Status { status } => {
                if let Some((status_id, _)) = &entry.status {
                    if *status_id != response_id {
                        return Err(invalid());
                    }
                }
                if entry.payloads.keys().any(|id| *id >= response_id) {
                    return Err(invalid());
                }
                entry.status = Some((response_id, status));
            }
        }

        Ok(entry.is_complete())
    }

    /// Remove and return every completed request in request id order.
    pub fn take_completed(&mut self) -> Vec<(S, Responses)> {
        let done: Vec<u64> = self
            .outstanding
            .iter()
            .filter(|(_, entry)| entry.is_complete())
            .map(|(id, _)| *id)
            .collect();

        let mut completed = Vec::with_capacity(done.len());
        for request_id in done {
            if let Some(entry) = self.outstanding.remove(&request_id) {
                if let Some((_, status)) = entry.status {
                    let payloads = entry.payloads.into_values().collect();
                    completed.push((entry.state, Responses::new(request_id, status, payloads)));
                }
            }
        }
        completed
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
