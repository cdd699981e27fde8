//! Scenario 2: Nested Flows
//!
//! A `HostSurvey` flow starts two child flows, `Interrogate` and
//! `CollectFile`, and records one `SurveyItem` per child. The first host
//! answers both actions. On the second host the platform action fails, so
//! its `Interrogate` child ends in `ERROR`; the survey receives a failed
//! completion, reports it, and still finishes.

use std::collections::BTreeMap;

use fleet_contracts::{
    error::FleetResult,
    ids::{ClientId, FlowKey},
};
use fleet_core::{
    config::OrchestratorConfig,
    flow::{FlowError, FlowResult},
    orchestrator::StartFlowOptions,
};

use crate::{
    fixtures::{file_handlers, PlatformInfo, GET_PLATFORM_INFO},
    flows::{HostSurvey, SurveyItem},
    harness::Simulation,
    scenarios::report_audit,
    session::Session,
};

const OS_RELEASE: &str = "/etc/os-release";

/// Clients whose platform action is broken.
const BROKEN: &str = "C.2000000000000002";

fn platform(session: &mut Session) -> FlowResult<()> {
    if session.client_id().0 == BROKEN {
        return Err(FlowError::new("uname: permission denied"));
    }
    session.reply(&PlatformInfo {
        system: "Linux".to_string(),
        release: "Debian".to_string(),
        version: "12.4".to_string(),
        fqdn: "web-01.example.com".to_string(),
        client_version: 3400,
    })?;
    Ok(())
}

pub fn run_scenario() -> FleetResult<()> {
    println!("=== Scenario 2: Nested Flows ===");
    println!();

    let mut files = BTreeMap::new();
    files.insert(
        OS_RELEASE.to_string(),
        b"PRETTY_NAME=\"Debian GNU/Linux 12 (bookworm)\"\n".to_vec(),
    );
    let sim = Simulation::new(&OrchestratorConfig::default())
        .with_handlers(file_handlers(files))
        .handle(GET_PLATFORM_INFO, platform);

    for client in [ClientId::new("C.2000000000000001"), ClientId::new(BROKEN)] {
        println!("  Host {}", client);
        let flow_id = sim.execute_flow(HostSurvey::new(OS_RELEASE), StartFlowOptions::new(client.clone(), "bob"))?;

        let parent = sim.flow(&client, &flow_id)?;
        println!("    HostSurvey {}: {}", flow_id, parent.state);
        for child in sim.store.child_flows(&FlowKey::new(client.clone(), flow_id.clone()))? {
            println!("      child {} {}: {}", child.flow_name, child.flow_id, child.state);
        }
        for item in sim.results::<SurveyItem>(&client, &flow_id)? {
            println!(
                "      [{}] {}: {}",
                if item.success { "OK" } else { "FAILED" },
                item.check,
                item.detail
            );
        }
        println!();
    }

    report_audit(&sim)?;
    println!();
    println!("  Scenario 2 complete.");
    println!();

    Ok(())
}
