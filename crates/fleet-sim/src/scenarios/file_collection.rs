//! Scenario 1: File Collection
//!
//! A `CollectFile` flow fetches a file from a simulated Linux host. The agent
//! streams the content through the blob sink in chunks and replies with one
//! reference per chunk; the flow reassembles the file from the blob store and
//! checks it against the hash the agent reports.
//!
//! A second run asks for a path the host does not have and ends in `ERROR`.

use std::collections::BTreeMap;

use fleet_contracts::{error::FleetResult, ids::ClientId};
use fleet_core::{config::OrchestratorConfig, orchestrator::StartFlowOptions};

use crate::{
    fixtures::file_handlers_with_chunk_len,
    flows::{CollectFile, CollectedFile},
    harness::Simulation,
    scenarios::report_audit,
};

const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";
const AUTH_LOG: &str = "/var/log/auth.log";

/// Chunk size small enough that the log spans several blobs.
const CHUNK_LEN: usize = 64 * 1024;

fn filesystem() -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    files.insert(
        SSHD_CONFIG.to_string(),
        b"Port 22\nPermitRootLogin no\nPasswordAuthentication no\n".to_vec(),
    );
    let log: String = (0..4000)
        .map(|i| format!("Oct 16 06:{:02}:{:02} host-0 sshd[{}]: Accepted publickey for deploy\n", i / 60 % 60, i % 60, 1000 + i))
        .collect();
    files.insert(AUTH_LOG.to_string(), log.into_bytes());
    files
}

pub fn run_scenario() -> FleetResult<()> {
    println!("=== Scenario 1: File Collection ===");
    println!();

    let sim = Simulation::new(&OrchestratorConfig::default())
        .with_handlers(file_handlers_with_chunk_len(filesystem(), CHUNK_LEN));
    let client = ClientId::new("C.1000000000000001");

    for path in [SSHD_CONFIG, AUTH_LOG] {
        let flow_id = sim.execute_flow(CollectFile::new(path), StartFlowOptions::new(client.clone(), "alice"))?;
        let record = sim.flow(&client, &flow_id)?;
        println!("  Flow {} ({}): {}", flow_id, path, record.state);
        for file in sim.results::<CollectedFile>(&client, &flow_id)? {
            println!("    size:   {} bytes in {} chunk(s)", file.size, file.chunks);
            println!("    sha256: {}", file.sha256);
        }
    }
    println!("  Blobs stored:           {}", sim.store.blob_count()?);
    println!();

    println!("  Test: collect a path that does not exist");
    let flow_id = sim.execute_flow(
        CollectFile::new("/etc/shadow.bak"),
        StartFlowOptions::new(client.clone(), "alice"),
    )?;
    let record = sim.flow(&client, &flow_id)?;
    println!(
        "  Flow {}: {} ({})",
        flow_id,
        record.state,
        record.error_message.as_deref().unwrap_or("")
    );
    println!();

    report_audit(&sim)?;
    println!();
    println!("  Scenario 1 complete.");
    println!();

    Ok(())
}
