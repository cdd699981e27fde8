//! Scenario 4: Flow Throttling
//!
//! The orchestrator is configured from an embedded TOML file with a daily
//! limit of three flows per user and client, and a 20 minute window for
//! identical flows. Users start `ListMatchingValues` flows until both
//! limits trigger; a different user keeps working under their own limit.

use fleet_contracts::{
    error::{FleetError, FleetResult},
    ids::ClientId,
};
use fleet_core::{config::OrchestratorConfig, orchestrator::StartFlowOptions};

use crate::{
    fixtures::{list_values_handler, KeyValue},
    flows::ListMatchingValues,
    harness::Simulation,
    scenarios::report_audit,
};

/// Embedded orchestrator configuration for this scenario.
const THROTTLED: &str = include_str!("../../config/throttled.toml");

fn attempt(sim: &Simulation, client: &ClientId, user: &str, key: &str) -> FleetResult<()> {
    let options = StartFlowOptions::new(client.clone(), user);
    match sim.execute_flow(ListMatchingValues::new(key), options) {
        Ok(flow_id) => {
            let values = sim.results::<KeyValue>(client, &flow_id)?;
            let shown: Vec<String> = values.iter().map(|kv| format!("{}={}", kv.key, kv.value)).collect();
            println!("  {:<5} key={:<4} -> started {} [{}]", user, key, flow_id, shown.join(", "));
            Ok(())
        }
        Err(e @ FleetError::DuplicateFlow { .. }) | Err(e @ FleetError::DailyFlowRequestLimitExceeded { .. }) => {
            println!("  {:<5} key={:<4} -> REFUSED: {}", user, key, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

pub fn run_scenario() -> FleetResult<()> {
    println!("=== Scenario 4: Flow Throttling ===");
    println!();

    let config = OrchestratorConfig::from_toml_str(THROTTLED)?;
    println!(
        "  Limits: {} flow(s) per user per day, identical flows {}s apart",
        config.throttle.daily_request_limit, config.throttle.duplicate_interval_secs
    );
    println!();

    let sim = Simulation::new(&config).with_handlers(vec![list_values_handler(vec![
        KeyValue::new("Foo", "1"),
        KeyValue::new("Bar", "2"),
        KeyValue::new("Baz", "3"),
        KeyValue::new("Qux", "4"),
    ])]);
    let client = ClientId::new("C.4000000000000001");

    attempt(&sim, &client, "alice", "Foo")?;
    attempt(&sim, &client, "alice", "Foo")?;
    attempt(&sim, &client, "bob", "Foo")?;
    attempt(&sim, &client, "alice", "Bar")?;
    attempt(&sim, &client, "alice", "Baz")?;
    attempt(&sim, &client, "alice", "Qux")?;
    attempt(&sim, &client, "bob", "Qux")?;
    println!();

    report_audit(&sim)?;
    println!();
    println!("  Scenario 4 complete.");
    println!();

    Ok(())
}
