//! Hunt hooks the foreman drives.
//!
//! A hunt is a fleet-wide task: the foreman starts one flow per matching
//! client, with the hunt id as the flow id. Beyond the start and completion
//! hooks below, hunts are managed elsewhere.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, info};

use fleet_contracts::{
    error::{FleetError, FleetResult},
    ids::{ClientId, FlowId, HuntId},
};
use fleet_core::{
    flow::Flow,
    orchestrator::{Orchestrator, StartFlowOptions},
};

/// The hunt operations the foreman needs.
pub trait HuntRunner: Send + Sync {
    /// Start the hunt's flow on `client_id`.
    fn start_hunt_flow_on_client(&self, client_id: &ClientId, hunt_id: &HuntId) -> FleetResult<()>;

    /// Complete a hunt whose foreman rule expired. Returns whether the hunt
    /// changed state.
    fn complete_hunt_if_expired(&self, hunt_id: &HuntId) -> FleetResult<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuntState {
    Started,
    Completed,
}

impl fmt::Display for HuntState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HuntState::Started => f.write_str("STARTED"),
            HuntState::Completed => f.write_str("COMPLETED"),
        }
    }
}

type Launcher = Arc<dyn Fn(&Orchestrator, StartFlowOptions) -> FleetResult<FlowId> + Send + Sync>;

struct HuntEntry {
    creator: String,
    state: HuntState,
    launch: Launcher,
    clients: Vec<ClientId>,
}

/// A `HuntRunner` that starts hunt flows through an orchestrator.
///
/// ```rust,ignore
/// let hunts = HuntRegistry::new(orchestrator.clone());
/// hunts.register(&HuntId::new("H:1A2B3C"), "alice", || ListProcesses::default())?;
/// ```
pub struct HuntRegistry {
    orchestrator: Arc<Orchestrator>,
    hunts: Mutex<HashMap<HuntId, HuntEntry>>,
}

impl HuntRegistry {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            hunts: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> FleetResult<MutexGuard<'_, HashMap<HuntId, HuntEntry>>> {
        self.hunts.lock().map_err(|e| FleetError::StateError {
            reason: format!("hunt registry lock poisoned: {}", e),
        })
    }

    /// Register a started hunt whose per-client flow is built by `make`.
    pub fn register<F, M>(&self, hunt_id: &HuntId, creator: impl Into<String>, make: M) -> FleetResult<()>
    where
        F: Flow,
        M: Fn() -> F + Send + Sync + 'static,
    {
        let launch: Launcher = Arc::new(move |orchestrator: &Orchestrator, options: StartFlowOptions| {
            orchestrator.start_flow(make(), options)
        });
        self.lock()?.insert(
            hunt_id.clone(),
            HuntEntry {
                creator: creator.into(),
                state: HuntState::Started,
                launch,
                clients: Vec::new(),
            },
        );
        info!(hunt_id = %hunt_id, flow_name = F::NAME, "hunt registered");
        Ok(())
    }

    pub fn hunt_state(&self, hunt_id: &HuntId) -> FleetResult<Option<HuntState>> {
        Ok(self.lock()?.get(hunt_id).map(|h| h.state))
    }

    /// Clients the hunt's flow was started on, in start order.
    pub fn clients_started(&self, hunt_id: &HuntId) -> FleetResult<Vec<ClientId>> {
        Ok(self
            .lock()?
            .get(hunt_id)
            .map(|h| h.clients.clone())
            .unwrap_or_default())
    }
}

impl HuntRunner for HuntRegistry {
    fn start_hunt_flow_on_client(&self, client_id: &ClientId, hunt_id: &HuntId) -> FleetResult<()> {
        let (launch, creator) = {
            let hunts = self.lock()?;
            let hunt = hunts.get(hunt_id).ok_or_else(|| FleetError::UnknownHunt {
                hunt_id: hunt_id.to_string(),
            })?;
            if hunt.state != HuntState::Started {
                debug!(hunt_id = %hunt_id, state = %hunt.state, "hunt not running, not starting flow");
                return Ok(());
            }
            (hunt.launch.clone(), hunt.creator.clone())
        };

        let options = StartFlowOptions::for_hunt(client_id.clone(), hunt_id, creator);
        launch(self.orchestrator.as_ref(), options)?;

        if let Some(hunt) = self.lock()?.get_mut(hunt_id) {
            hunt.clients.push(client_id.clone());
        }
        Ok(())
    }

    fn complete_hunt_if_expired(&self, hunt_id: &HuntId) -> FleetResult<bool> {
        let mut hunts = self.lock()?;
        let Some(hunt) = hunts.get_mut(hunt_id) else {
            debug!(hunt_id = %hunt_id, "expired rule refers to unknown hunt");
            return Ok(false);
        };
        if hunt.state == HuntState::Completed {
            return Ok(false);
        }
        hunt.state = HuntState::Completed;
        info!(hunt_id = %hunt_id, clients = hunt.clients.len(), "hunt completed");
        Ok(true)
    }
}
