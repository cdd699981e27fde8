//! # fleet-contracts
//!
//! Shared types, wire messages, and contracts for the fleet flow
//! orchestrator.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate: only data definitions, the record accessor abstraction, and
//! the error type.

pub mod blob;
pub mod error;
pub mod event;
pub mod filter;
pub mod flow;
pub mod foreman;
pub mod ids;
pub mod message;
pub mod payload;
pub mod record;
