//! Scenario 3: Foreman Hunt
//!
//! Foreman rules are loaded from a TOML file. Three clients check in; the
//! foreman evaluates each client against the rules and starts the hunt's
//! `Interrogate` flow on the single client that matches. A second check-in
//! of the same clients starts nothing, and the expired rule is purged on
//! the first pass.

use std::{collections::BTreeMap, sync::Arc};

use fleet_contracts::{
    error::FleetResult,
    foreman::ClientFullInfo,
    ids::{ClientId, FlowId, HuntId},
};
use fleet_core::{
    config::OrchestratorConfig,
    flow::{FlowError, FlowResult},
    traits::{ClientStore, RuleStore},
};
use fleet_foreman::{Foreman, HuntRegistry, RuleFile};

use crate::{
    fixtures::{PlatformInfo, GET_PLATFORM_INFO},
    flows::Interrogate,
    harness::Simulation,
    scenarios::report_audit,
    session::Session,
};

/// Embedded foreman rules for this scenario.
const FLEET_HUNTS: &str = include_str!("../../rules/fleet_hunts.toml");

const HUNT: &str = "H:5EC0DE";

fn client(id: &str, system: &str, release: &str, labels: &[&str]) -> ClientFullInfo {
    let mut info = ClientFullInfo::new(ClientId::new(id));
    info.system = system.to_string();
    info.os_release = release.to_string();
    info.fqdn = format!("{}.example.com", id.to_lowercase().replace('.', "-"));
    info.labels = labels.iter().map(|l| l.to_string()).collect();
    info.client_version = 3400;
    info
}

pub fn run_scenario() -> FleetResult<()> {
    println!("=== Scenario 3: Foreman Hunt ===");
    println!();

    let fleet = vec![
        client("C.3000000000000001", "Linux", "Debian", &["web"]),
        client("C.3000000000000002", "Linux", "Ubuntu", &["web"]),
        client("C.3000000000000003", "Windows", "10", &["web", "desktop"]),
    ];

    let platforms: BTreeMap<ClientId, PlatformInfo> = fleet
        .iter()
        .map(|c| {
            let info = PlatformInfo {
                system: c.system.clone(),
                release: c.os_release.clone(),
                version: c.os_version.clone(),
                fqdn: c.fqdn.clone(),
                client_version: c.client_version,
            };
            (c.client_id.clone(), info)
        })
        .collect();

    let sim = Simulation::new(&OrchestratorConfig::default()).handle(
        GET_PLATFORM_INFO,
        move |session: &mut Session| -> FlowResult<()> {
            let info = platforms
                .get(session.client_id())
                .ok_or_else(|| FlowError::new(format!("unknown client {}", session.client_id())))?;
            session.reply(info)?;
            Ok(())
        },
    );

    for info in &fleet {
        sim.store.write_client_info(info)?;
    }

    // ── Rules and hunts ───────────────────────────────────────────────────────

    let rules = RuleFile::from_toml_str(FLEET_HUNTS)?;
    rules.install(&sim.store)?;
    println!("  Foreman rules installed: {}", rules.rules.len());
    for rule in &rules.rules {
        println!("    {}: {}", rule.hunt_id, rule.description);
    }
    println!();

    let hunt_id = HuntId::new(HUNT);
    let hunts = Arc::new(HuntRegistry::new(Arc::clone(&sim.orchestrator)));
    hunts.register(&hunt_id, "hunt-scheduler", Interrogate::default)?;

    let store = Arc::new(sim.store.clone());
    let foreman = Foreman::new(store.clone(), store.clone(), store, hunts.clone());

    // ── First check-in ────────────────────────────────────────────────────────

    let client_ids: Vec<ClientId> = fleet.iter().map(|c| c.client_id.clone()).collect();
    let started = foreman.process_check_ins(&client_ids);
    sim.run_until_idle()?;

    println!("  First check-in:  {} hunt flow(s) started", started);
    for client_id in hunts.clients_started(&hunt_id)? {
        let flow_id = FlowId::from(&hunt_id);
        let record = sim.flow(&client_id, &flow_id)?;
        println!("    {} flow {}: {}", client_id, flow_id, record.state);
        for info in sim.results::<PlatformInfo>(&client_id, &flow_id)? {
            println!("      reported {} {} ({})", info.system, info.release, info.fqdn);
        }
    }
    println!(
        "  Rules left after purge: {}",
        sim.store.read_all_foreman_rules()?.len()
    );
    println!();

    // ── Second check-in ───────────────────────────────────────────────────────

    let started = foreman.process_check_ins(&client_ids);
    sim.run_until_idle()?;
    println!("  Second check-in: {} hunt flow(s) started", started);
    println!();

    report_audit(&sim)?;
    println!();
    println!("  Scenario 3 complete.");
    println!();

    Ok(())
}
