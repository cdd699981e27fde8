//! Routing of out-of-band parcels to their registered consumers.

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, warn};

use fleet_contracts::{
    error::{FleetError, FleetResult},
    ids::ClientId,
    message::{Parcel, SinkId},
};

use crate::traits::Sink;

/// A table of sink consumers keyed by sink id.
///
/// ```rust,ignore
/// let mut router = SinkRouter::new();
/// router.register(SinkId::Blob, Arc::new(BlobSink::new(store)));
/// router.route(&client_id, &parcel)?;
/// ```
#[derive(Default, Clone)]
pub struct SinkRouter {
    sinks: HashMap<SinkId, Arc<dyn Sink>>,
}

impl SinkRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` as the consumer of `id`, replacing any earlier one.
    pub fn register(&mut self, id: SinkId, sink: Arc<dyn Sink>) {
        self.sinks.insert(id, sink);
    }

    /// Builder form of `register`.
    pub fn with(mut self, id: SinkId, sink: Arc<dyn Sink>) -> Self {
        self.register(id, sink);
        self
    }

    /// Deliver `parcel` to the consumer registered for its sink.
    ///
    /// Fails with `FleetError::UnknownSink` when nothing is registered, or
    /// with the consumer's own error when it rejects the parcel. The caller
    /// decides how the failure affects the producing request.
    pub fn route(&self, client_id: &ClientId, parcel: &Parcel) -> FleetResult<()> {
        let sink = self.sinks.get(&parcel.sink).ok_or_else(|| {
            warn!(client_id = %client_id, sink = %parcel.sink, "parcel for unregistered sink");
            FleetError::UnknownSink {
                sink: parcel.sink.to_string(),
            }
        })?;

        debug!(
            client_id = %client_id,
            sink = %parcel.sink,
            payload_type = %parcel.payload.type_name,
            "routing parcel"
        );
        sink.accept(client_id, parcel)
    }
}
