//! Per-user flow creation limits.
//!
//! Two independent checks run before a user-started flow is created on a
//! client:
//!
//! 1. Duplicate detection: an identical flow (same name, equal arguments)
//!    created on the client within the duplicate interval, by any user.
//! 2. Daily limit: the number of flows the user created on the client in the
//!    last 24 hours.
//!
//! Both read the flow store at call time and are therefore advisory under
//! concurrent starts for the same client.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use fleet_contracts::{
    error::{FleetError, FleetResult},
    ids::ClientId,
    payload::{AnyPayload, EmptyArgs},
};

use crate::{config::ThrottleConfig, traits::FlowStore};

/// Enforces the configured flow creation limits.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowThrottler {
    daily_request_limit: u32,
    duplicate_interval: Duration,
}

impl FlowThrottler {
    pub fn new(config: &ThrottleConfig) -> Self {
        let secs = i64::try_from(config.duplicate_interval_secs).unwrap_or(i64::MAX);
        Self {
            daily_request_limit: config.daily_request_limit,
            duplicate_interval: Duration::try_seconds(secs).unwrap_or(Duration::MAX),
        }
    }

    /// A throttler with both limits disabled.
    pub fn disabled() -> Self {
        Self {
            daily_request_limit: 0,
            duplicate_interval: Duration::zero(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.daily_request_limit == 0 && self.duplicate_interval.is_zero()
    }

    /// Check whether `user` may start `flow_name` with `flow_args` on `client_id` now.
    ///
    /// Missing arguments compare equal to `EmptyArgs`.
    pub fn enforce_limits(
        &self,
        store: &dyn FlowStore,
        client_id: &ClientId,
        user: &str,
        flow_name: &str,
        flow_args: Option<&AnyPayload>,
    ) -> FleetResult<()> {
        self.enforce_limits_at(store, client_id, user, flow_name, flow_args, Utc::now())
    }

    /// `enforce_limits` evaluated at a fixed instant.
    pub fn enforce_limits_at(
        &self,
        store: &dyn FlowStore,
        client_id: &ClientId,
        user: &str,
        flow_name: &str,
        flow_args: Option<&AnyPayload>,
        now: DateTime<Utc>,
    ) -> FleetResult<()> {
        if self.is_disabled() {
            return Ok(());
        }

        let yesterday = now - Duration::days(1);
        let dup_boundary = now
            .checked_sub_signed(self.duplicate_interval)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let min_create_time = yesterday.min(dup_boundary);

        let flows = store.read_all_flows(client_id, min_create_time, false)?;

        let empty_args;
        let args = match flow_args {
            Some(args) => args,
            None => {
                empty_args = AnyPayload::pack(&EmptyArgs::default())?;
                &empty_args
            }
        };

        if !self.duplicate_interval.is_zero() {
            if let Some(flow) = flows.iter().find(|f| {
                f.create_time > dup_boundary && f.flow_name == flow_name && f.args == *args
            }) {
                warn!(
                    client_id = %client_id,
                    flow_id = %flow.flow_id,
                    flow_name = %flow_name,
                    "duplicate flow rejected"
                );
                return Err(FleetError::DuplicateFlow {
                    flow_id: flow.flow_id.to_string(),
                    message: format!(
                        "Identical {} already run on {} at {}",
                        flow_name, client_id, flow.create_time
                    ),
                });
            }
        }

        if self.daily_request_limit > 0 {
            let count = flows
                .iter()
                .filter(|f| f.creator == user && f.create_time > yesterday)
                .count();
            let count = u32::try_from(count).unwrap_or(u32::MAX);
            if count >= self.daily_request_limit {
                warn!(
                    client_id = %client_id,
                    user = %user,
                    count,
                    limit = self.daily_request_limit,
                    "daily flow limit reached"
                );
                return Err(FleetError::DailyFlowRequestLimitExceeded {
                    count,
                    limit: self.daily_request_limit,
                    since: yesterday.to_rfc3339(),
                });
            }
        }

        debug!(client_id = %client_id, user = %user, flow_name = %flow_name, "flow within limits");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use fleet_contracts::{
        error::FleetError,
        flow::FlowState,
        ids::{ClientId, FlowId},
        payload::{AnyPayload, EmptyArgs},
    };

    use crate::{config::ThrottleConfig, testing::{record, Args, MockStore}, traits::FlowStore};

    use super::FlowThrottler;

    fn throttler(daily: u32, dup_secs: u64) -> FlowThrottler {
        FlowThrottler::new(&ThrottleConfig {
            daily_request_limit: daily,
            duplicate_interval_secs: dup_secs,
        })
    }

    fn args(path: &str) -> AnyPayload {
        AnyPayload::pack(&Args { path: path.to_string() }).unwrap()
    }

    #[test]
    fn disabled_throttler_never_reads_the_store() {
        let store = MockStore::failing_reads();
        let client = ClientId::new("C.1");
        FlowThrottler::disabled()
            .enforce_limits(&store, &client, "alice", "Collect", None)
            .unwrap();
    }

    #[test]
    fn identical_flow_within_window_is_a_duplicate() {
        let store = MockStore::new();
        let client = ClientId::new("C.1");
        let now = Utc::now();
        let mut first = record(&client, "F1", "Collect", "bob", args("/etc"));
        first.create_time = now - Duration::minutes(5);
        store.write_flow(&first).unwrap();

        let result = throttler(0, 1200).enforce_limits_at(
            &store,
            &client,
            "alice",
            "Collect",
            Some(&args("/etc")),
            now,
        );
        match result {
            Err(FleetError::DuplicateFlow { flow_id, message }) => {
                assert_eq!(flow_id, "F1");
                assert!(message.starts_with("Identical Collect already run on C.1"));
            }
            other => panic!("expected DuplicateFlow, got {:?}", other),
        }
    }

    #[test]
    fn different_args_or_old_flow_is_not_a_duplicate() {
        let store = MockStore::new();
        let client = ClientId::new("C.1");
        let now = Utc::now();

        let mut recent = record(&client, "F1", "Collect", "bob", args("/etc"));
        recent.create_time = now - Duration::minutes(5);
        store.write_flow(&recent).unwrap();

        let mut old = record(&client, "F2", "Collect", "bob", args("/var"));
        old.create_time = now - Duration::minutes(30);
        store.write_flow(&old).unwrap();

        let t = throttler(0, 1200);
        t.enforce_limits_at(&store, &client, "alice", "Collect", Some(&args("/tmp")), now)
            .unwrap();
        t.enforce_limits_at(&store, &client, "alice", "Collect", Some(&args("/var")), now)
            .unwrap();
        t.enforce_limits_at(&store, &client, "alice", "Other", Some(&args("/etc")), now)
            .unwrap();
    }

    #[test]
    fn missing_args_compare_equal_to_empty_args() {
        let store = MockStore::new();
        let client = ClientId::new("C.1");
        let empty = AnyPayload::pack(&EmptyArgs::default()).unwrap();
        store.write_flow(&record(&client, "F1", "Ping", "bob", empty)).unwrap();

        let result = throttler(0, 600).enforce_limits(&store, &client, "bob", "Ping", None);
        assert!(matches!(result, Err(FleetError::DuplicateFlow { .. })));
    }

    #[test]
    fn daily_limit_counts_only_the_users_flows() {
        let store = MockStore::new();
        let client = ClientId::new("C.1");
        for (i, creator) in ["alice", "alice", "bob"].iter().enumerate() {
            let id = format!("F{}", i);
            store
                .write_flow(&record(&client, &id, "Collect", creator, args(&id)))
                .unwrap();
        }

        let t = throttler(2, 0);
        match t.enforce_limits(&store, &client, "alice", "Collect", Some(&args("/new"))) {
            Err(FleetError::DailyFlowRequestLimitExceeded { count, limit, .. }) => {
                assert_eq!(count, 2);
                assert_eq!(limit, 2);
            }
            other => panic!("expected DailyFlowRequestLimitExceeded, got {:?}", other),
        }
        t.enforce_limits(&store, &client, "bob", "Collect", Some(&args("/new")))
            .unwrap();
    }

    #[test]
    fn daily_limit_ignores_flows_older_than_a_day() {
        let store = MockStore::new();
        let client = ClientId::new("C.1");
        let now = Utc::now();
        let mut old = record(&client, "F1", "Collect", "alice", args("/etc"));
        old.create_time = now - Duration::hours(25);
        old.state = FlowState::Finished;
        store.write_flow(&old).unwrap();

        throttler(1, 0)
            .enforce_limits_at(&store, &client, "alice", "Collect", None, now)
            .unwrap();
    }

    #[test]
    fn child_flows_are_not_counted() {
        let store = MockStore::new();
        let client = ClientId::new("C.1");
        let mut child = record(&client, "F1", "Collect", "alice", args("/etc"));
        child.parent_flow_id = Some(FlowId::new("F0"));
        store.write_flow(&child).unwrap();

        throttler(1, 600)
            .enforce_limits(&store, &client, "alice", "Collect", Some(&args("/etc")))
            .unwrap();
    }
}
