//! # fleet-store
//!
//! Process-local implementations of the fleet store traits, and the sink
//! consumers that write into them.
//!
//! ```rust,ignore
//! let store = Arc::new(InMemoryDatastore::new());
//! let router = SinkRouter::new()
//!     .with(SinkId::Blob, Arc::new(BlobSink::new(store.clone())))
//!     .with(SinkId::Startup, Arc::new(StartupSink::new(store.clone())));
//! ```

pub mod memory;
pub mod sinks;

pub use memory::{blob_id, InMemoryDatastore};
pub use sinks::{BlobSink, StartupInfo, StartupSink};

// ── Tests ─────────────────────────────────────────────────────────────────────
