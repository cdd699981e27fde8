//! # fleet-filter
//!
//! Declarative result filtering for the fleet flow orchestrator.
//!
//! ## Overview
//!
//! A request carries a list of [`Filter`](fleet_contracts::filter::Filter)s.
//! Before a reply is kept, [`admit`] checks it against every filter: all
//! filters must hold, and a filter holds when any of its conditions does.
//! Each condition resolves a numeric field path on a
//! [`Record`](fleet_contracts::record::Record) and compares the value with
//! one operator.
//!
//! ```rust,ignore
//! use fleet_contracts::filter::{Condition, Filter, Operator};
//!
//! let only_foo = Filter::from(Condition::new(vec![1], Operator::StringEqual("Foo".into())));
//! assert!(fleet_filter::admit(&[only_foo], &reply)?);
//! ```

pub mod condition;
pub mod engine;

pub use condition::evaluate;
pub use engine::{admit, filter_holds};

// ── Tests ─────────────────────────────────────────────────────────────────────
