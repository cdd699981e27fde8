//! An in-process connector that queues requests instead of sending them.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::debug;

use fleet_contracts::{
    error::{FleetError, FleetResult},
    message::ActionRequest,
};
use fleet_core::traits::Connector;

/// A `Connector` whose outgoing channel is a FIFO queue.
///
/// Clones share the queue: hand one clone to the orchestrator and drain the
/// other on the simulated agent side.
#[derive(Clone, Default)]
pub struct QueueConnector {
    queue: Arc<Mutex<VecDeque<ActionRequest>>>,
}

impl QueueConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> FleetResult<MutexGuard<'_, VecDeque<ActionRequest>>> {
        self.queue.lock().map_err(|e| FleetError::StateError {
            reason: format!("connector queue lock poisoned: {}", e),
        })
    }

    /// Take the oldest queued request.
    pub fn pop(&self) -> FleetResult<Option<ActionRequest>> {
        Ok(self.lock()?.pop_front())
    }

    pub fn len(&self) -> FleetResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> FleetResult<bool> {
        Ok(self.lock()?.is_empty())
    }
}

impl Connector for QueueConnector {
    fn send(&self, request: &ActionRequest) -> FleetResult<()> {
        debug!(
            client_id = %request.client_id,
            flow_id = %request.flow_id,
            request_id = request.request_id,
            action = %request.action,
            "queued request"
        );
        self.lock()?.push_back(request.clone());
        Ok(())
    }
}
