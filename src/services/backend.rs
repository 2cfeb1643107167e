//! Backend API client.
//!
//! [`VerificationBackend`] is the seam between the workflow and the processing
//! service. [`ReqwestBackend`] talks to the real HTTP API; tests substitute
//! scripted fakes.

use async_trait::async_trait;
use reqwest::{multipart, Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::models::context::{Context, NewContext};
use crate::models::job::{JobId, StatusResponse, SubmitResponse};
use crate::models::verification::{BearerToken, DocumentSource, Submission, UploadFile};

#[async_trait]
pub trait VerificationBackend: Send + Sync {
    /// Upload the structured source and documents and start a job.
    async fn submit(&self, submission: &Submission, token: &BearerToken)
        -> Result<JobId, BackendError>;

    /// Fetch the job's current status and all results produced so far.
    async fn fetch_status(&self, job_id: &JobId, token: &BearerToken)
        -> Result<StatusResponse, BackendError>;

    async fn list_contexts(&self, token: &BearerToken) -> Result<Vec<Context>, BackendError>;

    async fn create_context(&self, name: &str, token: &BearerToken)
        -> Result<Context, BackendError>;
}

/// HTTP client for the verification pipeline API.
pub struct ReqwestBackend {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ReqwestBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("verify-center/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(BackendError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn file_part(file: &UploadFile) -> Result<multipart::Part, BackendError> {
        multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(BackendError::Http)
    }

    fn build_form(submission: &Submission) -> Result<multipart::Form, BackendError> {
        let source = submission
            .structured_source
            .as_ref()
            .ok_or(BackendError::Incomplete("structured source"))?;
        let documents = submission
            .documents
            .as_ref()
            .ok_or(BackendError::Incomplete("documents"))?;

        let mut form = multipart::Form::new().part("master_csv", Self::file_part(source)?);

        match documents {
            DocumentSource::Files(files) => {
                for file in files {
                    form = form.part("source_files", Self::file_part(file)?);
                }
            }
            DocumentSource::FolderPath(path) => {
                form = form.text("folder_path", path.trim().to_string());
            }
        }

        if let Some(context_id) = &submission.context_id {
            form = form.text("context_id", context_id.to_string());
        }

        Ok(form)
    }

    /// Map non-success responses onto [`BackendError`], keeping the server's message.
    async fn check(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized(status.as_u16()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);

        Err(BackendError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl VerificationBackend for ReqwestBackend {
    #[tracing::instrument(skip_all, fields(context_id = ?submission.context_id))]
    async fn submit(
        &self,
        submission: &Submission,
        token: &BearerToken,
    ) -> Result<JobId, BackendError> {
        let form = Self::build_form(submission)?;

        let response = self
            .http
            .post(self.url("pipeline/start/"))
            .bearer_auth(token.expose())
            .multipart(form)
            .send()
            .await
            .map_err(BackendError::Http)?;

        let body: SubmitResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(BackendError::Http)?;

        tracing::debug!(job_id = %body.id, "Submit accepted");
        Ok(body.id)
    }

    async fn fetch_status(
        &self,
        job_id: &JobId,
        token: &BearerToken,
    ) -> Result<StatusResponse, BackendError> {
        let response = self
            .http
            .get(self.url(&format!("pipeline/status/{}/", job_id)))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(BackendError::Http)?;

        let text = Self::check(response)
            .await?
            .text()
            .await
            .map_err(BackendError::Http)?;

        serde_json::from_str(&text).map_err(BackendError::Decode)
    }

    async fn list_contexts(&self, token: &BearerToken) -> Result<Vec<Context>, BackendError> {
        let response = self
            .http
            .get(self.url("advertisements/"))
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(BackendError::Http)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(BackendError::Http)
    }

    async fn create_context(
        &self,
        name: &str,
        token: &BearerToken,
    ) -> Result<Context, BackendError> {
        let response = self
            .http
            .post(self.url("advertisements/"))
            .bearer_auth(token.expose())
            .json(&NewContext { name })
            .send()
            .await
            .map_err(BackendError::Http)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(BackendError::Http)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("Backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Submission is missing its {0}")]
    Incomplete(&'static str),
}
