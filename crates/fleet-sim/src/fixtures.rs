//! Fixture records and fake action handlers.
//!
//! All data is in memory and made up. The file handlers serve a fixed path to
//! content map; the platform handler reports fixed client metadata.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use fleet_contracts::{
    blob::{Blob, MAX_BLOB_LEN},
    ids::ActionId,
    message::SinkId,
    payload::TypedPayload,
    record::{FieldValue, Record},
};
use fleet_core::flow::{FlowError, FlowResult};

use crate::{endpoint::Handler, session::Session};

pub const GET_FILE_CONTENTS: &str = "get_file_contents";
pub const GET_FILE_SHA256: &str = "get_file_sha256";
pub const GET_PLATFORM_INFO: &str = "get_platform_info";
pub const LIST_VALUES: &str = "list_values";

// ── Records ──────────────────────────────────────────────────────────────────

/// A key/value pair. Field 1 is the key, field 2 the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl TypedPayload for KeyValue {
    const TYPE_NAME: &'static str = "KeyValue";
}

impl Record for KeyValue {
    fn type_name(&self) -> &'static str {
        "KeyValue"
    }

    fn field(&self, number: u32) -> Option<FieldValue<'_>> {
        match number {
            1 => Some(FieldValue::String(&self.key)),
            2 => Some(FieldValue::String(&self.value)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFileContentsArgs {
    pub paths: Vec<String>,
    pub offset: u64,
    /// Bytes to read from `offset`. `0` reads to the end.
    pub length: u64,
}

impl TypedPayload for GetFileContentsArgs {
    const TYPE_NAME: &'static str = "GetFileContentsArgs";
}

/// One chunk of a file. The chunk's content went to the blob sink; this
/// reply only references it. A non-empty `error` means the file could not
/// be read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContents {
    pub path: String,
    pub offset: u64,
    pub length: u64,
    /// Lower-case hex SHA-256 of the chunk.
    pub blob_sha256: String,
    pub error: String,
}

impl TypedPayload for FileContents {
    const TYPE_NAME: &'static str = "FileContents";
}

impl Record for FileContents {
    fn type_name(&self) -> &'static str {
        "FileContents"
    }

    fn field(&self, number: u32) -> Option<FieldValue<'_>> {
        match number {
            1 => Some(FieldValue::String(&self.path)),
            2 => Some(FieldValue::Uint64(self.offset)),
            3 => Some(FieldValue::Uint64(self.length)),
            4 => Some(FieldValue::String(&self.blob_sha256)),
            5 => Some(FieldValue::String(&self.error)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFileSha256Args {
    pub path: String,
    pub offset: u64,
    pub length: u64,
}

impl TypedPayload for GetFileSha256Args {
    const TYPE_NAME: &'static str = "GetFileSha256Args";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSha256 {
    pub path: String,
    pub offset: u64,
    pub length: u64,
    pub sha256: String,
}

impl TypedPayload for FileSha256 {
    const TYPE_NAME: &'static str = "FileSha256";
}

impl Record for FileSha256 {
    fn type_name(&self) -> &'static str {
        "FileSha256"
    }

    fn field(&self, number: u32) -> Option<FieldValue<'_>> {
        match number {
            1 => Some(FieldValue::String(&self.path)),
            2 => Some(FieldValue::Uint64(self.offset)),
            3 => Some(FieldValue::Uint64(self.length)),
            4 => Some(FieldValue::String(&self.sha256)),
            _ => None,
        }
    }
}

/// Operating system details an agent reports.
///
/// Fields: 1 system, 2 release, 3 version, 4 fqdn, 5 client version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub system: String,
    pub release: String,
    pub version: String,
    pub fqdn: String,
    pub client_version: u64,
}

impl TypedPayload for PlatformInfo {
    const TYPE_NAME: &'static str = "PlatformInfo";
}

impl Record for PlatformInfo {
    fn type_name(&self) -> &'static str {
        "PlatformInfo"
    }

    fn field(&self, number: u32) -> Option<FieldValue<'_>> {
        match number {
            1 => Some(FieldValue::String(&self.system)),
            2 => Some(FieldValue::String(&self.release)),
            3 => Some(FieldValue::String(&self.version)),
            4 => Some(FieldValue::String(&self.fqdn)),
            5 => Some(FieldValue::Uint64(self.client_version)),
            _ => None,
        }
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// Handlers serving `filesystem`, sending content in `MAX_BLOB_LEN` chunks.
pub fn file_handlers(filesystem: BTreeMap<String, Vec<u8>>) -> Vec<(ActionId, Handler)> {
    file_handlers_with_chunk_len(filesystem, MAX_BLOB_LEN)
}

/// `file_handlers` with a custom chunk length.
pub fn file_handlers_with_chunk_len(
    filesystem: BTreeMap<String, Vec<u8>>,
    chunk_len: usize,
) -> Vec<(ActionId, Handler)> {
    let chunk_len = chunk_len.max(1);
    let files = Arc::new(filesystem);

    let contents_files = Arc::clone(&files);
    let get_file_contents: Handler = Box::new(move |session: &mut Session| -> FlowResult<()> {
        let args: GetFileContentsArgs = session.args()?;

        for path in &args.paths {
            let Some(content) = contents_files.get(path) else {
                warn!(path = %path, "file does not exist");
                session.reply(&FileContents {
                    path: path.clone(),
                    error: "open failed".to_string(),
                    ..FileContents::default()
                })?;
                return Ok(());
            };

            let start = usize::try_from(args.offset).unwrap_or(usize::MAX).min(content.len());
            let end = match args.length {
                0 => content.len(),
                n => start.saturating_add(usize::try_from(n).unwrap_or(usize::MAX)).min(content.len()),
            };

            let mut offset = start;
            for chunk in content[start..end].chunks(chunk_len) {
                session.send(SinkId::Blob, &Blob { data: chunk.to_vec() })?;
                session.reply(&FileContents {
                    path: path.clone(),
                    offset: offset as u64,
                    length: chunk.len() as u64,
                    blob_sha256: sha256_hex(chunk),
                    error: String::new(),
                })?;
                offset += chunk.len();
            }
        }
        Ok(())
    });

    let sha256_files = Arc::clone(&files);
    let get_file_sha256: Handler = Box::new(move |session: &mut Session| -> FlowResult<()> {
        let args: GetFileSha256Args = session.args()?;
        let content = sha256_files
            .get(&args.path)
            .ok_or_else(|| FlowError::new(format!("no such file: {}", args.path)))?;

        let start = usize::try_from(args.offset).unwrap_or(usize::MAX).min(content.len());
        let end = match args.length {
            0 => content.len(),
            n => start.saturating_add(usize::try_from(n).unwrap_or(usize::MAX)).min(content.len()),
        };
        let data = &content[start..end];

        session.reply(&FileSha256 {
            path: args.path.clone(),
            offset: args.offset,
            length: data.len() as u64,
            sha256: sha256_hex(data),
        })?;
        Ok(())
    });

    vec![
        (ActionId::from(GET_FILE_CONTENTS), get_file_contents),
        (ActionId::from(GET_FILE_SHA256), get_file_sha256),
    ]
}

/// A handler that reports `info` once.
pub fn platform_handler(info: PlatformInfo) -> (ActionId, Handler) {
    let handler: Handler = Box::new(move |session: &mut Session| -> FlowResult<()> {
        session.reply(&info)?;
        Ok(())
    });
    (ActionId::from(GET_PLATFORM_INFO), handler)
}

/// A handler that replies with every pair of `pairs`, in order.
pub fn list_values_handler(pairs: Vec<KeyValue>) -> (ActionId, Handler) {
    let handler: Handler = Box::new(move |session: &mut Session| -> FlowResult<()> {
        for pair in &pairs {
            session.reply(pair)?;
        }
        Ok(())
    });
    (ActionId::from(LIST_VALUES), handler)
}
