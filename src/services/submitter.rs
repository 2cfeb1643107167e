use garde::Validate;
use std::sync::Arc;

use crate::error::{Result, WorkflowError};
use crate::models::job::JobId;
use crate::models::verification::{BearerToken, Submission};
use crate::services::backend::VerificationBackend;

/// A job the backend accepted, with the credential it was accepted under.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub job_id: JobId,
    pub token: BearerToken,
}

/// Validates a submission locally, then starts a job on the backend.
pub struct JobSubmitter {
    backend: Arc<dyn VerificationBackend>,
}

impl JobSubmitter {
    pub fn new(backend: Arc<dyn VerificationBackend>) -> Self {
        Self { backend }
    }

    /// Submit a verification job and return its identifier together with the
    /// credential used, so polling can reuse it.
    ///
    /// Input and credential preconditions fail without touching the network.
    /// Backend failures are returned as-is; nothing is retried.
    pub async fn submit(
        &self,
        submission: &Submission,
        token: Option<&BearerToken>,
    ) -> Result<SubmittedJob> {
        submission
            .validate()
            .map_err(|report| WorkflowError::Validation(report.to_string()))?;

        let token = token.ok_or_else(WorkflowError::missing_credential)?;

        match self.backend.submit(submission, token).await {
            Ok(job_id) => {
                metrics::counter!("verification_jobs_submitted_total").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    documents = ?submission.documents.as_ref().and_then(|d| d.document_count()),
                    "Verification job submitted"
                );
                Ok(SubmittedJob {
                    job_id,
                    token: token.clone(),
                })
            }
            Err(e) => {
                metrics::counter!("verification_submissions_failed_total").increment(1);
                tracing::error!(error = %e, "Verification job submission failed");
                Err(WorkflowError::from_submit(e))
            }
        }
    }
}
