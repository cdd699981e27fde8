//! Content-addressed blobs delivered through the blob sink.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::payload::TypedPayload;

/// Largest chunk an agent sends in one blob parcel (2 MiB).
pub const MAX_BLOB_LEN: usize = 2 * 1024 * 1024;

/// A chunk of raw content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl TypedPayload for Blob {
    const TYPE_NAME: &'static str = "Blob";
}

/// Lower-case hex SHA-256 of a blob's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobId(pub String);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
