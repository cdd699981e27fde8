//! The agent side of one action request.

use tracing::trace;

use fleet_contracts::{
    error::FleetResult,
    filter::Filter,
    ids::ClientId,
    message::{ActionRequest, Parcel, SinkId},
    payload::{AnyPayload, TypedPayload},
    record::Record,
};

/// Collects what a handler produces while serving one request.
///
/// Replies pass through the request's filters before they are kept. A
/// filtered-out reply is only counted: it never receives a response id.
/// Both replies and parcels are stored packed, so later changes to the
/// handler's values do not leak into what was sent.
#[derive(Debug)]
pub struct Session {
    client_id: ClientId,
    args: AnyPayload,
    filters: Vec<Filter>,
    replies: Vec<AnyPayload>,
    parcels: Vec<Parcel>,
    filtered_out_count: usize,
}

impl Session {
    pub fn new(request: &ActionRequest) -> Self {
        Self {
            client_id: request.client_id.clone(),
            args: request.args.clone(),
            filters: request.filters.clone(),
            replies: Vec::new(),
            parcels: Vec::new(),
            filtered_out_count: 0,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Unpack the request arguments as `T`.
    pub fn args<T: TypedPayload>(&self) -> FleetResult<T> {
        self.args.unpack()
    }

    /// Queue `item` as the next reply, unless a filter rejects it.
    ///
    /// # Errors
    ///
    /// Filter evaluation errors (a field path the record does not have, an
    /// operator of the wrong family) and payload encoding failures.
    pub fn reply<T: TypedPayload + Record>(&mut self, item: &T) -> FleetResult<()> {
        if !fleet_filter::admit(&self.filters, item)? {
            self.filtered_out_count += 1;
            trace!(type_name = T::TYPE_NAME, "reply filtered out");
            return Ok(());
        }
        self.replies.push(AnyPayload::pack(item)?);
        Ok(())
    }

    /// Queue `item` as a parcel for `sink`.
    pub fn send<T: TypedPayload>(&mut self, sink: SinkId, item: &T) -> FleetResult<()> {
        self.parcels.push(Parcel {
            sink,
            payload: AnyPayload::pack(item)?,
        });
        Ok(())
    }

    pub fn replies(&self) -> &[AnyPayload] {
        &self.replies
    }

    pub fn parcels(&self) -> &[Parcel] {
        &self.parcels
    }

    /// Parcels addressed to `sink`, in send order.
    pub fn parcels_for(&self, sink: SinkId) -> impl Iterator<Item = &Parcel> {
        self.parcels.iter().filter(move |p| p.sink == sink)
    }

    /// Number of replies the filters rejected.
    pub fn filtered_out_count(&self) -> usize {
        self.filtered_out_count
    }

    pub(crate) fn into_parts(self) -> (Vec<AnyPayload>, Vec<Parcel>) {
        (self.replies, self.parcels)
    }
}
