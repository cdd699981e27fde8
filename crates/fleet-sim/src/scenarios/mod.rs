//! Reference scenarios.
//!
//! Each scenario wires real components (datastore, audit chain,
//! orchestrator, foreman, sinks) to a simulated endpoint and walks through
//! one behaviour of the system, printing what happens.

pub mod file_collection;
pub mod foreman_hunt;
pub mod nested_flows;
pub mod throttling;

use fleet_contracts::error::FleetResult;

use crate::harness::Simulation;

/// Print the audit chain summary shared by every scenario.
pub(crate) fn report_audit(sim: &Simulation) -> FleetResult<()> {
    let integrity_ok = sim.audit.verify_integrity()?;
    let log = sim.audit.export_log()?;
    println!(
        "  Audit chain integrity:  {} ({} event(s), {} flow(s) finalized)",
        if integrity_ok { "VERIFIED" } else { "FAILED" },
        log.entries.len(),
        log.finalized.len()
    );
    Ok(())
}
