//! Test helper utilities: a scripted in-memory backend.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use verify_center::models::context::{Context, ContextId};
use verify_center::models::job::{JobId, StatusResponse};
use verify_center::models::verification::{BearerToken, DocumentSource, Submission};
use verify_center::services::backend::{BackendError, VerificationBackend};

pub fn token() -> BearerToken {
    BearerToken::new("test-token").unwrap()
}

/// What the fake saw on a submit call.
#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub structured_source: Option<String>,
    pub document_count: Option<usize>,
    pub folder_path: Option<String>,
    pub context_id: Option<ContextId>,
    pub token: String,
}

enum ScriptedStatus {
    Immediate(Result<StatusResponse, BackendError>),
    Triggered {
        response: Result<StatusResponse, BackendError>,
        trigger: oneshot::Receiver<()>,
    },
}

#[derive(Default)]
struct FakeState {
    submit_responses: VecDeque<Result<JobId, BackendError>>,
    status_responses: VecDeque<ScriptedStatus>,
    fallback_status: Option<StatusResponse>,
    submit_calls: Vec<SubmitCall>,
    status_calls: Vec<JobId>,
    delivered: usize,
    contexts: Vec<Context>,
}

/// Backend whose responses are queued up front. Status responses are handed
/// out FIFO; once the queue is empty the fallback (if any) repeats.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_submit(&self, response: Result<JobId, BackendError>) {
        self.state.lock().unwrap().submit_responses.push_back(response);
    }

    pub fn push_status(&self, response: Result<StatusResponse, BackendError>) {
        self.state
            .lock()
            .unwrap()
            .status_responses
            .push_back(ScriptedStatus::Immediate(response));
    }

    /// Queue a status response that is held until the returned sender fires
    /// (or is dropped).
    pub fn push_status_triggered(
        &self,
        response: Result<StatusResponse, BackendError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .unwrap()
            .status_responses
            .push_back(ScriptedStatus::Triggered {
                response,
                trigger: rx,
            });
        tx
    }

    pub fn set_fallback_status(&self, response: StatusResponse) {
        self.state.lock().unwrap().fallback_status = Some(response);
    }

    pub fn add_context(&self, id: &str, name: &str) {
        self.state.lock().unwrap().contexts.push(Context {
            id: ContextId::new(id),
            name: name.to_string(),
        });
    }

    pub fn submit_calls(&self) -> Vec<SubmitCall> {
        self.state.lock().unwrap().submit_calls.clone()
    }

    pub fn status_calls(&self) -> Vec<JobId> {
        self.state.lock().unwrap().status_calls.clone()
    }

    /// Status responses that actually completed and were returned.
    pub fn delivered(&self) -> usize {
        self.state.lock().unwrap().delivered
    }
}

#[async_trait]
impl VerificationBackend for FakeBackend {
    async fn submit(
        &self,
        submission: &Submission,
        token: &BearerToken,
    ) -> Result<JobId, BackendError> {
        let mut state = self.state.lock().unwrap();
        state.submit_calls.push(SubmitCall {
            structured_source: submission
                .structured_source
                .as_ref()
                .map(|f| f.file_name.clone()),
            document_count: submission.documents.as_ref().and_then(|d| d.document_count()),
            folder_path: match &submission.documents {
                Some(DocumentSource::FolderPath(path)) => Some(path.clone()),
                _ => None,
            },
            context_id: submission.context_id.clone(),
            token: token.expose().to_string(),
        });
        state.submit_responses.pop_front().unwrap_or_else(|| {
            Err(BackendError::Status {
                status: 500,
                message: "no scripted submit response".to_string(),
            })
        })
    }

    async fn fetch_status(
        &self,
        job_id: &JobId,
        _token: &BearerToken,
    ) -> Result<StatusResponse, BackendError> {
        let scripted = {
            let mut state = self.state.lock().unwrap();
            state.status_calls.push(job_id.clone());
            match state.status_responses.pop_front() {
                Some(scripted) => scripted,
                None => match &state.fallback_status {
                    Some(fallback) => ScriptedStatus::Immediate(Ok(fallback.clone())),
                    None => ScriptedStatus::Immediate(Err(BackendError::Status {
                        status: 404,
                        message: "Job not found".to_string(),
                    })),
                },
            }
        };

        let response = match scripted {
            ScriptedStatus::Immediate(response) => response,
            ScriptedStatus::Triggered { response, trigger } => {
                let _ = trigger.await;
                response
            }
        };

        self.state.lock().unwrap().delivered += 1;
        response
    }

    async fn list_contexts(&self, _token: &BearerToken) -> Result<Vec<Context>, BackendError> {
        Ok(self.state.lock().unwrap().contexts.clone())
    }

    async fn create_context(
        &self,
        name: &str,
        _token: &BearerToken,
    ) -> Result<Context, BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.contexts.iter().find(|c| c.name == name) {
            return Ok(existing.clone());
        }
        let context = Context {
            id: ContextId::new((state.contexts.len() + 1).to_string()),
            name: name.to_string(),
        };
        state.contexts.push(context.clone());
        Ok(context)
    }
}
