//! Sink consumers backed by the datastore.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use fleet_contracts::{
    blob::{Blob, MAX_BLOB_LEN},
    error::{FleetError, FleetResult},
    foreman::ClientFullInfo,
    ids::ClientId,
    message::Parcel,
    payload::TypedPayload,
};
use fleet_core::traits::{BlobStore, ClientStore, Sink};

/// Stores the content of `Blob` parcels in a blob store.
pub struct BlobSink {
    blobs: Arc<dyn BlobStore>,
}

impl BlobSink {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }
}

impl Sink for BlobSink {
    fn accept(&self, client_id: &ClientId, parcel: &Parcel) -> FleetResult<()> {
        let blob: Blob = parcel.payload.unpack().map_err(|e| FleetError::SinkRejected {
            sink: parcel.sink.to_string(),
            reason: e.to_string(),
        })?;
        if blob.data.len() > MAX_BLOB_LEN {
            return Err(FleetError::SinkRejected {
                sink: parcel.sink.to_string(),
                reason: format!("blob of {} bytes exceeds {} bytes", blob.data.len(), MAX_BLOB_LEN),
            });
        }
        let id = self.blobs.write_blob(&blob.data)?;
        debug!(client_id = %client_id, blob_id = %id, len = blob.data.len(), "stored blob");
        Ok(())
    }
}

/// Metadata an agent reports when it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupInfo {
    pub client_version: u64,
    pub boot_time: Option<DateTime<Utc>>,
}

impl TypedPayload for StartupInfo {
    const TYPE_NAME: &'static str = "StartupInfo";
}

/// Folds `StartupInfo` parcels into the client's stored metadata.
pub struct StartupSink {
    clients: Arc<dyn ClientStore>,
}

impl StartupSink {
    pub fn new(clients: Arc<dyn ClientStore>) -> Self {
        Self { clients }
    }
}

impl Sink for StartupSink {
    fn accept(&self, client_id: &ClientId, parcel: &Parcel) -> FleetResult<()> {
        let startup: StartupInfo = parcel.payload.unpack().map_err(|e| FleetError::SinkRejected {
            sink: parcel.sink.to_string(),
            reason: e.to_string(),
        })?;

        let mut info = self
            .clients
            .read_client_full_info(client_id)?
            .unwrap_or_else(|| ClientFullInfo::new(client_id.clone()));
        info.client_version = startup.client_version;
        if startup.boot_time.is_some() {
            info.last_boot_time = startup.boot_time;
        }
        self.clients.write_client_info(&info)?;
        debug!(client_id = %client_id, client_version = startup.client_version, "recorded startup");
        Ok(())
    }
}
