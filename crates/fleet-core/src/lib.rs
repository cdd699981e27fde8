//! # fleet-core
//!
//! The flow orchestration runtime of the fleet.
//!
//! This crate provides:
//! - The collaborator traits (`Connector`, `FlowStore`, `RuleStore`,
//!   `ClientStore`, `BlobStore`, `Sink`, `AuditWriter`)
//! - The `Flow` trait and its `FlowContext`, the API task authors implement
//! - The `Correlator` that matches reply streams to continuations
//! - The `Orchestrator` that drives flows from start to FINISHED or ERROR
//! - The `SinkRouter` for out-of-band parcels
//! - The `FlowThrottler` that bounds per-user flow creation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleet_core::{Orchestrator, OrchestratorConfig, StartFlowOptions};
//!
//! let orchestrator = Orchestrator::new(store, connector, audit, &OrchestratorConfig::default());
//! orchestrator.start_flow(MyFlow::new(args), StartFlowOptions::new(client_id, "alice"))?;
//! ```

pub mod config;
pub mod correlator;
pub mod flow;
pub mod orchestrator;
pub mod sinks;
pub mod throttle;
pub mod traits;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{OrchestratorConfig, ThrottleConfig};
pub use correlator::{Correlator, Responses};
pub use flow::{Continuation, ContinuationTable, Flow, FlowContext, FlowError, FlowResult};
pub use orchestrator::{Orchestrator, StartFlowOptions};
pub use sinks::SinkRouter;
pub use throttle::FlowThrottler;
pub use wait::{wait_for, wait_for_blob, WaitPolicy};

// ── Tests ────────────────────────────────────────────────────────────────────
