//! Reference flows run by the scenarios.
//!
//! - `CollectFile`: fetch a file through the blob sink and verify its hash
//! - `ListMatchingValues`: list key/value pairs, filtered agent-side by key
//! - `Interrogate`: report the client's platform details
//! - `HostSurvey`: run `Interrogate` and `CollectFile` as child flows

use serde::{Deserialize, Serialize};

use fleet_contracts::{
    blob::BlobId,
    filter::{Condition, Filter, Operator},
    payload::{EmptyArgs, TypedPayload},
};
use fleet_core::{
    correlator::Responses,
    flow::{ContinuationTable, Flow, FlowContext, FlowError, FlowResult},
    flow_ensure,
};

use crate::fixtures::{
    sha256_hex, FileContents, FileSha256, GetFileContentsArgs, GetFileSha256Args, KeyValue, PlatformInfo,
    GET_FILE_CONTENTS, GET_FILE_SHA256, GET_PLATFORM_INFO, LIST_VALUES,
};

/// Turn a failed request into a flow error.
fn require_success(responses: &Responses, what: &str) -> FlowResult<()> {
    match responses.error_message() {
        None => Ok(()),
        Some(message) => Err(FlowError::new(format!("{} failed: {}", what, message))),
    }
}

// ── CollectFile ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectFileArgs {
    pub path: String,
}

impl TypedPayload for CollectFileArgs {
    const TYPE_NAME: &'static str = "CollectFileArgs";
}

/// Result of `CollectFile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedFile {
    pub path: String,
    pub size: u64,
    pub sha256: String,
    pub chunks: usize,
}

impl TypedPayload for CollectedFile {
    const TYPE_NAME: &'static str = "CollectedFile";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectFileState {
    ReceiveContents,
    ReceiveHash,
}

/// Fetches a file chunk by chunk, reassembles it from the blob store, and
/// checks the result against the hash the agent computes.
pub struct CollectFile {
    args: CollectFileArgs,
    content: Vec<u8>,
    chunks: usize,
}

impl CollectFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            args: CollectFileArgs { path: path.into() },
            content: Vec::new(),
            chunks: 0,
        }
    }

    fn receive_contents(
        &mut self,
        ctx: &mut FlowContext<'_, CollectFileState>,
        responses: Responses,
    ) -> FlowResult<()> {
        require_success(&responses, GET_FILE_CONTENTS)?;

        for chunk in responses.unpack_all::<FileContents>()? {
            if !chunk.error.is_empty() {
                return Err(FlowError::new(format!("cannot read '{}': {}", chunk.path, chunk.error)));
            }
            flow_ensure!(
                chunk.offset == self.content.len() as u64,
                "chunk at offset {} does not follow {} collected bytes",
                chunk.offset,
                self.content.len()
            );
            let data = ctx.read_blob(&BlobId(chunk.blob_sha256.clone()))?;
            flow_ensure!(
                data.len() as u64 == chunk.length,
                "blob {} has {} bytes, expected {}",
                chunk.blob_sha256,
                data.len(),
                chunk.length
            );
            self.content.extend_from_slice(&data);
            self.chunks += 1;
        }

        let args = GetFileSha256Args {
            path: self.args.path.clone(),
            offset: 0,
            length: 0,
        };
        ctx.call_action(GET_FILE_SHA256, &args, vec![], CollectFileState::ReceiveHash)?;
        Ok(())
    }

    fn receive_hash(&mut self, ctx: &mut FlowContext<'_, CollectFileState>, responses: Responses) -> FlowResult<()> {
        require_success(&responses, GET_FILE_SHA256)?;

        let hashes = responses.unpack_all::<FileSha256>()?;
        flow_ensure!(hashes.len() == 1, "expected one hash, got {}", hashes.len());

        let sha256 = sha256_hex(&self.content);
        flow_ensure!(
            hashes[0].sha256 == sha256,
            "hash mismatch for '{}': agent reported {}, collected {}",
            self.args.path,
            hashes[0].sha256,
            sha256
        );

        ctx.send_reply(&CollectedFile {
            path: self.args.path.clone(),
            size: self.content.len() as u64,
            sha256,
            chunks: self.chunks,
        })?;
        Ok(())
    }
}

impl Flow for CollectFile {
    const NAME: &'static str = "CollectFile";
    type Args = CollectFileArgs;
    type State = CollectFileState;

    fn args(&self) -> &CollectFileArgs {
        &self.args
    }

    fn continuations() -> ContinuationTable<Self> {
        ContinuationTable::new()
            .on(CollectFileState::ReceiveContents, Self::receive_contents)
            .on(CollectFileState::ReceiveHash, Self::receive_hash)
    }

    fn start(&mut self, ctx: &mut FlowContext<'_, CollectFileState>) -> FlowResult<()> {
        flow_ensure!(!self.args.path.is_empty(), "no path to collect");
        let args = GetFileContentsArgs {
            paths: vec![self.args.path.clone()],
            offset: 0,
            length: 0,
        };
        ctx.call_action(GET_FILE_CONTENTS, &args, vec![], CollectFileState::ReceiveContents)?;
        Ok(())
    }
}

// ── ListMatchingValues ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListValuesArgs {
    /// Only pairs with exactly this key are returned.
    pub key: String,
}

impl TypedPayload for ListValuesArgs {
    const TYPE_NAME: &'static str = "ListValuesArgs";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListValuesState {
    ReceiveValues,
}

/// Lists key/value pairs; the key filter is applied by the agent.
pub struct ListMatchingValues {
    args: ListValuesArgs,
}

impl ListMatchingValues {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            args: ListValuesArgs { key: key.into() },
        }
    }

    fn receive_values(&mut self, ctx: &mut FlowContext<'_, ListValuesState>, responses: Responses) -> FlowResult<()> {
        require_success(&responses, LIST_VALUES)?;
        for pair in responses.unpack_all::<KeyValue>()? {
            ctx.send_reply(&pair)?;
        }
        Ok(())
    }
}

impl Flow for ListMatchingValues {
    const NAME: &'static str = "ListMatchingValues";
    type Args = ListValuesArgs;
    type State = ListValuesState;

    fn args(&self) -> &ListValuesArgs {
        &self.args
    }

    fn continuations() -> ContinuationTable<Self> {
        ContinuationTable::new().on(ListValuesState::ReceiveValues, Self::receive_values)
    }

    fn start(&mut self, ctx: &mut FlowContext<'_, ListValuesState>) -> FlowResult<()> {
        let by_key = Filter::from(Condition::new(vec![1], Operator::StringEqual(self.args.key.clone())));
        ctx.call_action(LIST_VALUES, &EmptyArgs::default(), vec![by_key], ListValuesState::ReceiveValues)?;
        Ok(())
    }
}

// ── Interrogate ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterrogateState {
    ReceivePlatform,
}

#[derive(Default)]
pub struct Interrogate {
    args: EmptyArgs,
}

impl Interrogate {
    fn receive_platform(
        &mut self,
        ctx: &mut FlowContext<'_, InterrogateState>,
        responses: Responses,
    ) -> FlowResult<()> {
        require_success(&responses, GET_PLATFORM_INFO)?;
        let infos = responses.unpack_all::<PlatformInfo>()?;
        flow_ensure!(!infos.is_empty(), "agent reported no platform info");
        for info in &infos {
            ctx.send_reply(info)?;
        }
        Ok(())
    }
}

impl Flow for Interrogate {
    const NAME: &'static str = "Interrogate";
    type Args = EmptyArgs;
    type State = InterrogateState;

    fn args(&self) -> &EmptyArgs {
        &self.args
    }

    fn continuations() -> ContinuationTable<Self> {
        ContinuationTable::new().on(InterrogateState::ReceivePlatform, Self::receive_platform)
    }

    fn start(&mut self, ctx: &mut FlowContext<'_, InterrogateState>) -> FlowResult<()> {
        ctx.call_action(GET_PLATFORM_INFO, &EmptyArgs::default(), vec![], InterrogateState::ReceivePlatform)?;
        Ok(())
    }
}

// ── HostSurvey ───────────────────────────────────────────────────────────────

/// What one child flow of a survey produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyItem {
    pub check: String,
    pub success: bool,
    pub detail: String,
}

impl TypedPayload for SurveyItem {
    const TYPE_NAME: &'static str = "SurveyItem";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurveyState {
    Interrogated,
    FileCollected,
}

/// Interrogates the host and collects one file, as two child flows.
///
/// A failed child is reported as an unsuccessful `SurveyItem`; the survey
/// itself still finishes.
pub struct HostSurvey {
    args: CollectFileArgs,
    completed: usize,
}

impl HostSurvey {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            args: CollectFileArgs { path: path.into() },
            completed: 0,
        }
    }

    fn interrogated(&mut self, ctx: &mut FlowContext<'_, SurveyState>, responses: Responses) -> FlowResult<()> {
        self.completed += 1;
        let item = match responses.error_message() {
            Some(message) => SurveyItem {
                check: Interrogate::NAME.to_string(),
                success: false,
                detail: message.to_string(),
            },
            None => {
                let infos = responses.unpack_all::<PlatformInfo>()?;
                let detail = infos
                    .iter()
                    .map(|i| format!("{} {} ({})", i.system, i.release, i.fqdn))
                    .collect::<Vec<_>>()
                    .join(", ");
                SurveyItem {
                    check: Interrogate::NAME.to_string(),
                    success: true,
                    detail,
                }
            }
        };
        ctx.send_reply(&item)?;
        Ok(())
    }

    fn file_collected(&mut self, ctx: &mut FlowContext<'_, SurveyState>, responses: Responses) -> FlowResult<()> {
        self.completed += 1;
        let item = match responses.error_message() {
            Some(message) => SurveyItem {
                check: CollectFile::NAME.to_string(),
                success: false,
                detail: message.to_string(),
            },
            None => {
                let files = responses.unpack_all::<CollectedFile>()?;
                let detail = files
                    .iter()
                    .map(|f| format!("{} ({} bytes, sha256 {})", f.path, f.size, f.sha256))
                    .collect::<Vec<_>>()
                    .join(", ");
                SurveyItem {
                    check: CollectFile::NAME.to_string(),
                    success: true,
                    detail,
                }
            }
        };
        ctx.send_reply(&item)?;
        Ok(())
    }
}

impl Flow for HostSurvey {
    const NAME: &'static str = "HostSurvey";
    type Args = CollectFileArgs;
    type State = SurveyState;

    fn args(&self) -> &CollectFileArgs {
        &self.args
    }

    fn continuations() -> ContinuationTable<Self> {
        ContinuationTable::new()
            .on(SurveyState::Interrogated, Self::interrogated)
            .on(SurveyState::FileCollected, Self::file_collected)
    }

    fn start(&mut self, ctx: &mut FlowContext<'_, SurveyState>) -> FlowResult<()> {
        ctx.call_flow(Interrogate::default(), SurveyState::Interrogated);
        ctx.call_flow(CollectFile::new(self.args.path.clone()), SurveyState::FileCollected);
        Ok(())
    }

    fn end(&mut self, _ctx: &mut FlowContext<'_, SurveyState>) -> FlowResult<()> {
        flow_ensure!(self.completed == 2, "survey ended with {} of 2 checks", self.completed);
        Ok(())
    }
}
