//! In-memory [`ModelProvider`] for tests of the session layers.
//!
//! Every call is recorded so tests can assert on ordering (delete before
//! create, no network call after a validation failure) and on the exact
//! requests a turn produced.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use gemdesk_types::{Content, FileState, RemoteFile, StreamEvent};
use tokio::sync::mpsc;

use crate::{
    CacheHandle, CacheRequest, FileUpload, GenerateRequest, ModelProvider, ProviderError,
    ProviderFuture,
};

/// One recorded provider call.
#[derive(Debug, Clone)]
pub enum FakeCall {
    Upload { display_name: String, mime_type: String, bytes: usize },
    GetFile(String),
    CountTokens { turns: usize, parts: usize },
    CreateCache { files: usize, tools: usize },
    DeleteCache(String),
    Generate(GenerateRequest),
}

#[derive(Debug)]
struct FakeState {
    calls: Vec<FakeCall>,
    mime_types: HashMap<String, String>,
    next_file: u32,
    next_cache: u32,
    /// `get_file` answers still PROCESSING before the file turns ACTIVE.
    processing_polls: u32,
    ingestion_failure: Option<String>,
    tokens_per_part: u64,
    count_failure: Option<(u16, String)>,
    cache_failure: Option<(u16, String)>,
    delete_failure: Option<(u16, String)>,
    streams: VecDeque<Vec<StreamEvent>>,
}

/// Scripted provider. Defaults: files become ACTIVE immediately, every part
/// counts 10 tokens, caches are created, streams reply `"ok"`.
#[derive(Debug)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                calls: Vec::new(),
                mime_types: HashMap::new(),
                next_file: 0,
                next_cache: 0,
                processing_polls: 0,
                ingestion_failure: None,
                tokens_per_part: 10,
                count_failure: None,
                cache_failure: None,
                delete_failure: None,
                streams: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn set_processing_polls(&self, polls: u32) {
        self.lock().processing_polls = polls;
    }

    pub fn fail_ingestion(&self, reason: impl Into<String>) {
        self.lock().ingestion_failure = Some(reason.into());
    }

    pub fn set_tokens_per_part(&self, tokens: u64) {
        self.lock().tokens_per_part = tokens;
    }

    pub fn fail_count_tokens(&self, status: u16, message: impl Into<String>) {
        self.lock().count_failure = Some((status, message.into()));
    }

    pub fn fail_cache_create(&self, status: u16, message: impl Into<String>) {
        self.lock().cache_failure = Some((status, message.into()));
    }

    pub fn fail_cache_delete(&self, status: u16, message: impl Into<String>) {
        self.lock().delete_failure = Some((status, message.into()));
    }

    /// Queue the events the next `stream_generate` call emits.
    pub fn push_stream(&self, events: Vec<StreamEvent>) {
        self.lock().streams.push_back(events);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    #[must_use]
    pub fn generate_requests(&self) -> Vec<GenerateRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                FakeCall::Generate(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn api_error((status, message): &(u16, String)) -> ProviderError {
        ProviderError::Api {
            status: *status,
            message: message.clone(),
        }
    }
}

impl ModelProvider for FakeProvider {
    fn upload_file(&self, upload: FileUpload) -> ProviderFuture<'_, RemoteFile> {
        let mut state = self.lock();
        state.calls.push(FakeCall::Upload {
            display_name: upload.display_name.clone(),
            mime_type: upload.mime_type.clone(),
            bytes: upload.bytes.len(),
        });
        state.next_file += 1;
        let id = state.next_file;
        let file_state = if state.processing_polls == 0 && state.ingestion_failure.is_none() {
            FileState::Active
        } else {
            FileState::Processing
        };
        state
            .mime_types
            .insert(format!("files/f{id}"), upload.mime_type.clone());
        let remote = RemoteFile {
            name: format!("files/f{id}"),
            uri: format!("https://fake.test/files/f{id}"),
            mime_type: upload.mime_type,
            state: file_state,
        };
        Box::pin(async move { Ok(remote) })
    }

    fn get_file<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, RemoteFile> {
        let mut state = self.lock();
        state.calls.push(FakeCall::GetFile(name.to_string()));
        let file_state = if state.processing_polls > 0 {
            state.processing_polls -= 1;
            FileState::Processing
        } else if let Some(reason) = &state.ingestion_failure {
            FileState::Failed(Some(reason.clone()))
        } else {
            FileState::Active
        };
        let id = name.trim_start_matches("files/");
        let remote = RemoteFile {
            name: name.to_string(),
            uri: format!("https://fake.test/files/{id}"),
            mime_type: state
                .mime_types
                .get(name)
                .cloned()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            state: file_state,
        };
        Box::pin(async move { Ok(remote) })
    }

    fn count_tokens<'a>(&'a self, contents: &'a [Content]) -> ProviderFuture<'a, u64> {
        let mut state = self.lock();
        let parts: usize = contents.iter().map(|c| c.parts.len()).sum();
        state.calls.push(FakeCall::CountTokens {
            turns: contents.len(),
            parts,
        });
        let result = match &state.count_failure {
            Some(failure) => Err(Self::api_error(failure)),
            None => Ok(parts as u64 * state.tokens_per_part),
        };
        Box::pin(async move { result })
    }

    fn create_cache<'a>(&'a self, request: &'a CacheRequest) -> ProviderFuture<'a, CacheHandle> {
        let mut state = self.lock();
        let files = request.contents.iter().map(|c| c.parts.len()).sum();
        state.calls.push(FakeCall::CreateCache {
            files,
            tools: request.tools.len(),
        });
        let result = match &state.cache_failure {
            Some(failure) => Err(Self::api_error(failure)),
            None => {
                state.next_cache += 1;
                Ok(CacheHandle {
                    name: format!("cachedContents/c{}", state.next_cache),
                    expire_time: None,
                })
            }
        };
        Box::pin(async move { result })
    }

    fn delete_cache<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, ()> {
        let mut state = self.lock();
        state.calls.push(FakeCall::DeleteCache(name.to_string()));
        let result = match &state.delete_failure {
            Some(failure) => Err(Self::api_error(failure)),
            None => Ok(()),
        };
        Box::pin(async move { result })
    }

    fn stream_generate<'a>(
        &'a self,
        request: &'a GenerateRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> ProviderFuture<'a, ()> {
        let events = {
            let mut state = self.lock();
            state.calls.push(FakeCall::Generate(request.clone()));
            state.streams.pop_front().unwrap_or_else(|| {
                vec![
                    StreamEvent::Chunk(gemdesk_types::ResponseChunk::TextDelta("ok".into())),
                    StreamEvent::Done,
                ]
            })
        };
        Box::pin(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(())
        })
    }
}
