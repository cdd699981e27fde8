//! A simulated agent: serves action requests with registered handlers.
//!
//! For each request the endpoint runs the action's handler on a fresh
//! `Session`, routes the session's parcels to their sinks, and turns the
//! surviving replies into a reply stream: payloads with response ids
//! `1..=N`, then the status element with id `N + 1`.
//!
//! A handler failure (an `Err` or a panic) becomes an `ERROR` status. A sink
//! failure becomes an `ERROR` status only if the handler itself succeeded.

use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
};

use tracing::{debug, warn};

use fleet_contracts::{
    error::{FleetError, FleetResult},
    ids::ActionId,
    message::{ActionRequest, FlowResponse, ResponseStatus},
};
use fleet_core::{
    flow::{FlowError, FlowResult},
    sinks::SinkRouter,
};

use crate::session::Session;

/// An action implementation.
pub type Handler = Box<dyn Fn(&mut Session) -> FlowResult<()> + Send + Sync>;

pub struct Endpoint {
    handlers: HashMap<ActionId, Handler>,
    sinks: SinkRouter,
}

impl Endpoint {
    pub fn new(sinks: SinkRouter) -> Self {
        Self {
            handlers: HashMap::new(),
            sinks,
        }
    }

    pub fn register<H>(&mut self, action: impl Into<ActionId>, handler: H)
    where
        H: Fn(&mut Session) -> FlowResult<()> + Send + Sync + 'static,
    {
        self.handlers.insert(action.into(), Box::new(handler));
    }

    /// Builder form of `register`.
    pub fn handle<H>(mut self, action: impl Into<ActionId>, handler: H) -> Self
    where
        H: Fn(&mut Session) -> FlowResult<()> + Send + Sync + 'static,
    {
        self.register(action, handler);
        self
    }

    /// Add a prepared handler table, such as a fixture's.
    pub fn with_handlers(mut self, handlers: impl IntoIterator<Item = (ActionId, Handler)>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    pub fn handles(&self, action: &ActionId) -> bool {
        self.handlers.contains_key(action)
    }

    /// Serve one request and return its complete reply stream.
    ///
    /// # Errors
    ///
    /// `MissingHandler` when no handler is registered for the action. That is
    /// a defect of the simulation setup, not an agent-side failure, so it is
    /// not folded into the status.
    pub fn execute(&self, request: &ActionRequest) -> FleetResult<Vec<FlowResponse>> {
        let handler = self
            .handlers
            .get(&request.action)
            .ok_or_else(|| FleetError::MissingHandler {
                action: request.action.to_string(),
            })?;

        let mut session = Session::new(request);
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(&mut session)))
            .unwrap_or_else(|payload| Err(FlowError::from_panic(payload)));

        let mut status = match outcome {
            Ok(()) => ResponseStatus::ok(),
            Err(error) => {
                warn!(
                    client_id = %request.client_id,
                    flow_id = %request.flow_id,
                    request_id = request.request_id,
                    action = %request.action,
                    error = %error,
                    "action handler failed"
                );
                ResponseStatus::error(error.message())
            }
        };

        let filtered_out = session.filtered_out_count();
        let (replies, parcels) = session.into_parts();

        for parcel in &parcels {
            if let Err(error) = self.sinks.route(&request.client_id, parcel) {
                warn!(
                    client_id = %request.client_id,
                    sink = %parcel.sink,
                    error = %error,
                    "parcel delivery failed"
                );
                if status.is_ok() {
                    status = ResponseStatus::error(error.to_string());
                }
            }
        }

        let status_id = replies.len() as u64 + 1;
        let mut responses: Vec<FlowResponse> = replies
            .into_iter()
            .zip(1u64..)
            .map(|(payload, response_id)| {
                FlowResponse::payload(
                    request.client_id.clone(),
                    request.flow_id.clone(),
                    request.request_id,
                    response_id,
                    payload,
                )
            })
            .collect();
        responses.push(FlowResponse::status(
            request.client_id.clone(),
            request.flow_id.clone(),
            request.request_id,
            status_id,
            status,
        ));

        debug!(
            flow_id = %request.flow_id,
            request_id = request.request_id,
            action = %request.action,
            replies = status_id - 1,
            filtered_out,
            parcels = parcels.len(),
            "served request"
        );
        Ok(responses)
    }
}
