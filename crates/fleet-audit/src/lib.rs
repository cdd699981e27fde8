//! # fleet-audit
//!
//! Append-only, SHA-256 hash-chained audit trail of flow decisions.
//!
//! Every `FlowEvent` the orchestrator emits is wrapped in an `AuditEntry`
//! that links to the previous entry via its hash. Altering any entry breaks
//! the chain and is detected by `verify_chain`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleet_audit::InMemoryAuditWriter;
//!
//! let audit = Arc::new(InMemoryAuditWriter::new("orchestrator"));
//! let orchestrator = Orchestrator::new(store, connector, audit.clone(), &config);
//! // ...
//! assert!(audit.verify_integrity()?);
//! ```

pub mod chain;
pub mod event;
pub mod memory;

pub use chain::{hash_event, verify_chain};
pub use event::{AuditEntry, AuditLog};
pub use memory::InMemoryAuditWriter;

// ── Tests ─────────────────────────────────────────────────────────────────────
