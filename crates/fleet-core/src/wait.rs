//! Bounded waiting for data that is written asynchronously.
//!
//! Blob parcels travel on a different path than the replies that reference
//! them, so a flow may see a blob id before the blob itself is stored. Reads
//! of such references poll with a fixed delay and give up after a bounded
//! number of attempts.

use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use fleet_contracts::{
    blob::BlobId,
    error::{FleetError, FleetResult},
};

use crate::traits::BlobStore;

/// Delay and attempt bound of a wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitPolicy {
    pub delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            max_attempts: 10,
        }
    }
}

impl WaitPolicy {
    pub fn new(delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            delay_ms,
            max_attempts,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Call `poll` until it yields a value, sleeping between attempts.
///
/// Fails with `ReferencedDataNotFound` once `max_attempts` polls came back
/// empty. A poll error ends the wait immediately.
pub fn wait_for<T>(
    policy: &WaitPolicy,
    reference: &str,
    mut poll: impl FnMut() -> FleetResult<Option<T>>,
) -> FleetResult<T> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(value) = poll()? {
            return Ok(value);
        }
        if attempt < attempts {
            debug!(reference = %reference, attempt, "referenced data not yet available");
            thread::sleep(policy.delay());
        }
    }
    Err(FleetError::ReferencedDataNotFound {
        reference: reference.to_string(),
        attempts,
    })
}

/// Read a blob, waiting for it to be written if necessary.
pub fn wait_for_blob(store: &dyn BlobStore, id: &BlobId, policy: &WaitPolicy) -> FleetResult<Vec<u8>> {
    wait_for(policy, &format!("blob {}", id), || store.read_blob(id))
}
