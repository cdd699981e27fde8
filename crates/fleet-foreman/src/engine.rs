//! The foreman: decides which hunts to start on a checking-in client.
//!
//! Assignment algorithm for one client:
//!
//! 1. Read every foreman rule. Nothing to do if there are none.
//! 2. Advance the client's marker to the newest rule creation time if that
//!    is later, so a rule is considered at most once per client even if its
//!    hunt fails to start.
//! 3. Expired rules (expiration before now) complete their hunt and are
//!    purged. Relevant rules (created after the old marker, not expired)
//!    are evaluated against the client's metadata.
//! 4. For each match, start the hunt's flow with the hunt id as flow id.
//!    An earlier start of the same hunt is a no-op; an unrelated flow with
//!    that id is a consistency error. Other start failures are logged and
//!    the remaining rules are still processed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use fleet_contracts::{
    error::{FleetError, FleetResult},
    foreman::ForemanRule,
    ids::{ClientId, FlowId, FlowKey},
};
use fleet_core::traits::{ClientStore, FlowStore, RuleStore};

use crate::{hunt::HuntRunner, rule::Evaluate};

/// Outcome of trying to start one hunt on one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HuntStart {
    Started,
    AlreadyStarted,
    Failed,
}

pub struct Foreman {
    rules: Arc<dyn RuleStore>,
    clients: Arc<dyn ClientStore>,
    flows: Arc<dyn FlowStore>,
    hunts: Arc<dyn HuntRunner>,
}

impl Foreman {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        clients: Arc<dyn ClientStore>,
        flows: Arc<dyn FlowStore>,
        hunts: Arc<dyn HuntRunner>,
    ) -> Self {
        Self {
            rules,
            clients,
            flows,
            hunts,
        }
    }

    /// Start every matching hunt on `client_id`. Returns the number started.
    ///
    /// # Errors
    ///
    /// `HuntConflict` when a hunt's flow id is taken by an unrelated flow;
    /// `InvalidRule`/`InvalidPattern` for malformed rules; store failures.
    pub fn assign_tasks_to_client(&self, client_id: &ClientId) -> FleetResult<usize> {
        self.assign_tasks_at(client_id, Utc::now())
    }

    /// `assign_tasks_to_client` evaluated at a fixed instant.
    pub fn assign_tasks_at(&self, client_id: &ClientId, now: DateTime<Utc>) -> FleetResult<usize> {
        let rules = self.rules.read_all_foreman_rules()?;
        let Some(latest) = rules.iter().map(|r| r.creation_time).max() else {
            return Ok(0);
        };

        let last_run = self
            .clients
            .read_last_foreman_time(client_id)?
            .unwrap_or(DateTime::UNIX_EPOCH);
        if latest > last_run {
            self.clients.write_last_foreman_time(client_id, latest)?;
        } else {
            debug!(client_id = %client_id, "no foreman rules newer than last check");
        }

        let (expired, live): (Vec<ForemanRule>, Vec<ForemanRule>) =
            rules.into_iter().partition(|r| r.expiration_time < now);
        let relevant: Vec<ForemanRule> = live
            .into_iter()
            .filter(|r| r.creation_time > last_run)
            .collect();

        let mut started = 0;
        if !relevant.is_empty() {
            let Some(info) = self.clients.read_client_full_info(client_id)? else {
                warn!(client_id = %client_id, "no metadata for client, skipping foreman rules");
                return Ok(0);
            };
            for rule in &relevant {
                if !rule.client_rule_set.evaluate(&info)? {
                    continue;
                }
                if self.start_hunt(client_id, rule)? == HuntStart::Started {
                    started += 1;
                }
            }
        }

        if !expired.is_empty() {
            for rule in &expired {
                self.hunts.complete_hunt_if_expired(&rule.hunt_id)?;
            }
            self.rules.remove_expired_foreman_rules(now)?;
        }

        Ok(started)
    }

    fn start_hunt(&self, client_id: &ClientId, rule: &ForemanRule) -> FleetResult<HuntStart> {
        let hunt_id = &rule.hunt_id;
        let key = FlowKey::new(client_id.clone(), FlowId::from(hunt_id));

        if let Some(existing) = self.flows.read_flow(&key)? {
            if existing.parent_hunt_id.as_ref() != Some(hunt_id) {
                return Err(FleetError::HuntConflict {
                    hunt_id: hunt_id.to_string(),
                    client_id: client_id.to_string(),
                    flow_id: existing.flow_id.to_string(),
                });
            }
            info!(client_id = %client_id, hunt_id = %hunt_id, "hunt flow was started here before");
            return Ok(HuntStart::AlreadyStarted);
        }

        match self.hunts.start_hunt_flow_on_client(client_id, hunt_id) {
            Ok(()) => {
                info!(client_id = %client_id, hunt_id = %hunt_id, "foreman started hunt flow");
                Ok(HuntStart::Started)
            }
            Err(e) => {
                error!(
                    client_id = %client_id,
                    hunt_id = %hunt_id,
                    error = %e,
                    "failure running foreman action"
                );
                Ok(HuntStart::Failed)
            }
        }
    }

    /// Run `assign_tasks_to_client` for every client in a check-in batch.
    ///
    /// A failure for one client is logged and does not stop the batch.
    /// Returns the total number of hunts started.
    pub fn process_check_ins(&self, client_ids: &[ClientId]) -> usize {
        let mut total = 0;
        for client_id in client_ids {
            match self.assign_tasks_to_client(client_id) {
                Ok(started) => total += started,
                Err(e) => error!(client_id = %client_id, error = %e, "foreman check-in failed"),
            }
        }
        total
    }
}
