//! Fleet Flow Orchestrator: Demo CLI
//!
//! Runs one or all of the reference scenarios against a simulated agent
//! fleet, or validates orchestrator and foreman rule files.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- file-collection
//!   cargo run -p demo -- nested-flows
//!   cargo run -p demo -- foreman-hunt
//!   cargo run -p demo -- throttling
//!   cargo run -p demo -- check-config --config orchestrator.toml --rules hunts.toml

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleet_contracts::error::FleetResult;
use fleet_core::config::OrchestratorConfig;
use fleet_foreman::RuleFile;
use fleet_sim::scenarios::{file_collection, foreman_hunt, nested_flows, throttling};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Fleet flow orchestrator demo.
///
/// Each scenario wires the real orchestrator, foreman, store and audit chain
/// to an in-process simulated agent.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Fleet flow orchestrator demo",
    long_about = "Runs fleet orchestration scenarios showing multi-round flows, agent-side\n\
                  filtering, nested flows, foreman hunts and flow throttling."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all four scenarios in sequence.
    RunAll,
    /// Scenario 1: chunked file collection through the blob sink.
    FileCollection,
    /// Scenario 2: a parent flow with one failing child.
    NestedFlows,
    /// Scenario 3: foreman rules starting a hunt on matching clients.
    ForemanHunt,
    /// Scenario 4: duplicate and daily flow limits.
    Throttling,
    /// Parse an orchestrator config and/or a foreman rule file and report them.
    CheckConfig {
        /// Orchestrator TOML file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Foreman rules TOML file.
        #[arg(long)]
        rules: Option<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for orchestrator decisions.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(),
        Command::FileCollection => file_collection::run_scenario(),
        Command::NestedFlows => nested_flows::run_scenario(),
        Command::ForemanHunt => foreman_hunt::run_scenario(),
        Command::Throttling => throttling::run_scenario(),
        Command::CheckConfig { config, rules } => check_config(config, rules),
    };

    match result {
        Ok(()) => {
            println!("Done.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

fn run_all() -> FleetResult<()> {
    file_collection::run_scenario()?;
    nested_flows::run_scenario()?;
    foreman_hunt::run_scenario()?;
    throttling::run_scenario()?;
    Ok(())
}

fn check_config(config: Option<PathBuf>, rules: Option<PathBuf>) -> FleetResult<()> {
    let config = match config {
        Some(path) => {
            info!(path = %path.display(), "loading orchestrator config");
            OrchestratorConfig::from_file(&path)?
        }
        None => OrchestratorConfig::default(),
    };
    println!("Orchestrator");
    println!("  daily_request_limit:     {}", config.throttle.daily_request_limit);
    println!("  duplicate_interval_secs: {}", config.throttle.duplicate_interval_secs);
    println!(
        "  blob_wait:               {} attempt(s), {} ms apart",
        config.blob_wait.max_attempts, config.blob_wait.delay_ms
    );
    println!();

    if let Some(path) = rules {
        info!(path = %path.display(), "loading foreman rules");
        let file = RuleFile::from_file(&path)?;
        let now = Utc::now();
        println!("Foreman rules ({})", file.rules.len());
        for rule in &file.rules {
            let status = if rule.expiration_time < now { "expired" } else { "active" };
            println!(
                "  {:<12} {:<7} {:?} of {} sub-rule(s)  {}",
                rule.hunt_id.to_string(),
                status,
                rule.client_rule_set.match_mode,
                rule.client_rule_set.rules.len(),
                rule.description
            );
        }
        println!();
    }

    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Fleet Flow Orchestrator");
    println!("Simulated Fleet Demo");
    println!("=======================");
    println!();
    println!("Per flow step:");
    println!("  [1] Flow issues action requests; the orchestrator dispatches them to the agent");
    println!("  [2] Agent applies result filters, routes parcels to sinks, replies with a status");
    println!("  [3] Correlator runs the continuation once a request's replies are complete");
    println!("  [4] Every state change is appended to the SHA-256 audit chain");
    println!();
}
