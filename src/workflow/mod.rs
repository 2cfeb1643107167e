//! Verification workflow state machine.
//!
//! ```text
//! Idle → ContextSelected ⇄ Configuring → Submitting → Processing → Settled{Complete|Failed}
//!   ↑__________________________ reset (any state) _______________________________|
//! ```
//!
//! The controller is the single owner of job and report state. Poll results
//! reach it only through [`WorkflowController::pump`], so nothing mutates the
//! state behind its back.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, WorkflowError};
use crate::models::context::Context;
use crate::models::job::{JobId, JobStatus, Progress, VerificationJob};
use crate::models::report::{MatchReport, OverallStatus};
use crate::models::verification::{BearerToken, DocumentSource, Submission, UploadFile};
use crate::services::backend::VerificationBackend;
use crate::services::poller::{PollEvent, PollEventKind, PollUpdate, StatusPoller, DEFAULT_POLL_INTERVAL};
use crate::services::submitter::{JobSubmitter, SubmittedJob};
use crate::services::transform::FieldSchema;

pub const AWAITING_FILES: &str = "Awaiting files...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowPhase {
    Idle,
    ContextSelected,
    Configuring,
    Submitting,
    Processing,
    Settled(Outcome),
}

impl WorkflowPhase {
    pub fn is_settled(self) -> bool {
        matches!(self, WorkflowPhase::Settled(_))
    }

    fn is_busy(self) -> bool {
        matches!(self, WorkflowPhase::Submitting | WorkflowPhase::Processing)
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowPhase::Idle => f.write_str("idle"),
            WorkflowPhase::ContextSelected => f.write_str("context selected"),
            WorkflowPhase::Configuring => f.write_str("configuring"),
            WorkflowPhase::Submitting => f.write_str("submitting"),
            WorkflowPhase::Processing => f.write_str("processing"),
            WorkflowPhase::Settled(Outcome::Complete) => f.write_str("settled (complete)"),
            WorkflowPhase::Settled(Outcome::Failed) => f.write_str("settled (failed)"),
        }
    }
}

/// Tunables for a controller instance.
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub poll_interval: Duration,
    pub schema: FieldSchema,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            schema: FieldSchema::default(),
        }
    }
}

pub struct WorkflowController {
    backend: Arc<dyn VerificationBackend>,
    submitter: JobSubmitter,
    poller: StatusPoller,
    token: Option<BearerToken>,

    phase: WorkflowPhase,
    context: Option<Context>,
    structured_source: Option<UploadFile>,
    documents: Option<DocumentSource>,

    job: Option<VerificationJob>,
    reports: Vec<MatchReport>,
    status_message: String,
    last_error: Option<String>,
}

impl WorkflowController {
    pub fn new(
        backend: Arc<dyn VerificationBackend>,
        token: Option<BearerToken>,
        options: WorkflowOptions,
    ) -> Self {
        let poller = StatusPoller::new(
            Arc::clone(&backend),
            Arc::new(options.schema),
            options.poll_interval,
        );

        Self {
            submitter: JobSubmitter::new(Arc::clone(&backend)),
            backend,
            poller,
            token,
            phase: WorkflowPhase::Idle,
            context: None,
            structured_source: None,
            documents: None,
            job: None,
            reports: Vec::new(),
            status_message: AWAITING_FILES.to_string(),
            last_error: None,
        }
    }

    // ── Observed state ──────────────────────────────────────────────

    pub fn phase(&self) -> WorkflowPhase {
        self.phase
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    pub fn job(&self) -> Option<&VerificationJob> {
        self.job.as_ref()
    }

    pub fn reports(&self) -> &[MatchReport] {
        &self.reports
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            received: self.reports.len(),
            expected: self.job.as_ref().and_then(|j| j.expected_count),
        }
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    /// True when both inputs are present and no job is in flight.
    pub fn can_run(&self) -> bool {
        let inputs_ready = self.structured_source.is_some()
            && self.documents.as_ref().is_some_and(|d| !d.is_empty());
        let phase_ok = matches!(
            self.phase,
            WorkflowPhase::ContextSelected | WorkflowPhase::Configuring | WorkflowPhase::Settled(_)
        );
        inputs_ready && phase_ok
    }

    // ── Context ─────────────────────────────────────────────────────

    /// Choose the grouping context; `None` proceeds without one.
    ///
    /// Choosing a different context than the current one resets the workflow
    /// first, cancelling any polling.
    pub fn select_context(&mut self, context: Option<Context>) -> Result<()> {
        if self.phase == WorkflowPhase::Submitting {
            return Err(WorkflowError::InvalidTransition {
                phase: self.phase,
                action: "change context",
            });
        }

        if self.phase != WorkflowPhase::Idle {
            if self.context == context {
                return Ok(());
            }
            self.reset();
        }

        tracing::info!(context = ?context.as_ref().map(|c| &c.name), "Context selected");
        self.context = context;
        self.phase = WorkflowPhase::ContextSelected;
        Ok(())
    }

    pub async fn list_contexts(&self) -> Result<Vec<Context>> {
        let token = self.token.as_ref().ok_or_else(WorkflowError::missing_credential)?;
        self.backend
            .list_contexts(token)
            .await
            .map_err(WorkflowError::Context)
    }

    /// Register a new context with the backend and select it.
    pub async fn create_context(&mut self, name: &str) -> Result<Context> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkflowError::Validation("context name is required".to_string()));
        }
        let token = self.token.as_ref().ok_or_else(WorkflowError::missing_credential)?;

        let context = self
            .backend
            .create_context(name, token)
            .await
            .map_err(WorkflowError::Context)?;

        self.select_context(Some(context.clone()))?;
        Ok(context)
    }

    // ── Inputs ──────────────────────────────────────────────────────

    pub fn set_structured_source(&mut self, file: Option<UploadFile>) -> Result<()> {
        self.ensure_configurable("set the structured source")?;
        self.structured_source = file;
        self.after_input_change();
        Ok(())
    }

    pub fn set_documents(&mut self, documents: Option<DocumentSource>) -> Result<()> {
        self.ensure_configurable("set documents")?;
        self.documents = documents;
        self.after_input_change();
        Ok(())
    }

    fn ensure_configurable(&self, action: &'static str) -> Result<()> {
        match self.phase {
            WorkflowPhase::Processing => Err(WorkflowError::AlreadyProcessing),
            WorkflowPhase::Idle | WorkflowPhase::Submitting => {
                Err(WorkflowError::InvalidTransition {
                    phase: self.phase,
                    action,
                })
            }
            _ => Ok(()),
        }
    }

    fn after_input_change(&mut self) {
        let has_inputs = self.structured_source.is_some() || self.documents.is_some();
        self.phase = if has_inputs {
            WorkflowPhase::Configuring
        } else {
            WorkflowPhase::ContextSelected
        };
    }

    // ── Run ─────────────────────────────────────────────────────────

    /// Submit the configured inputs and start polling the new job.
    ///
    /// On failure the controller returns to `Configuring` with its inputs
    /// intact and the error reflected in the status message.
    pub async fn run(&mut self) -> Result<JobId> {
        if self.phase.is_busy() {
            return Err(WorkflowError::AlreadyProcessing);
        }
        if self.phase == WorkflowPhase::Idle {
            return Err(WorkflowError::InvalidTransition {
                phase: self.phase,
                action: "run",
            });
        }

        let submission = Submission {
            structured_source: self.structured_source.clone(),
            documents: self.documents.clone(),
            context_id: self.context.as_ref().map(|c| c.id.clone()),
        };

        self.phase = WorkflowPhase::Submitting;
        self.status_message = "Uploading files and starting job...".to_string();
        self.last_error = None;

        match self.submitter.submit(&submission, self.token.as_ref()).await {
            Ok(SubmittedJob { job_id, token }) => {
                let expected = submission.documents.as_ref().and_then(|d| d.document_count());
                self.job = Some(VerificationJob::submitted(job_id.clone(), expected));
                self.reports.clear();
                self.poller.start(job_id.clone(), token);

                self.phase = WorkflowPhase::Processing;
                self.status_message = "Job started! Fetching results...".to_string();
                Ok(job_id)
            }
            Err(e) => {
                self.after_input_change();
                self.status_message = format!("Error starting pipeline: {e}");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Wait for the next poll event and apply it.
    ///
    /// Returns the phase after the event, or `None` if nothing is polling.
    pub async fn pump(&mut self) -> Option<WorkflowPhase> {
        if self.phase != WorkflowPhase::Processing {
            return None;
        }

        match self.poller.next_event().await {
            Some(event) => self.apply(event),
            None => {
                // Loop ended without a terminal event (e.g. the task panicked).
                self.settle_with_error("polling stopped unexpectedly".to_string());
            }
        }
        Some(self.phase)
    }

    /// Pump until the job settles or polling is torn down.
    pub async fn run_until_settled(&mut self) -> WorkflowPhase {
        while let Some(phase) = self.pump().await {
            if phase.is_settled() {
                break;
            }
        }
        self.phase
    }

    fn apply(&mut self, event: PollEvent) {
        let current = self.job.as_ref().map(|j| &j.id);
        if self.phase != WorkflowPhase::Processing || current != Some(&event.job_id) {
            tracing::debug!(job_id = %event.job_id, "Ignoring event for inactive job");
            return;
        }

        match event.kind {
            PollEventKind::Update(update) => self.apply_update(update),
            PollEventKind::Failed(e) => {
                let err = WorkflowError::Polling(e);
                self.settle_with_error(err.to_string());
            }
        }
    }

    fn apply_update(&mut self, update: PollUpdate) {
        let PollUpdate {
            status,
            reports,
            expected_count,
        } = update;

        self.reports = reports;
        if let Some(job) = self.job.as_mut() {
            job.status = status;
            if expected_count.is_some() {
                job.expected_count = expected_count;
            }
        }

        let progress = self.progress();
        match status {
            JobStatus::Complete => {
                let failed = self
                    .reports
                    .iter()
                    .filter(|r| r.overall_status == OverallStatus::Failed)
                    .count();
                metrics::counter!("verification_records_failed_total").increment(failed as u64);
                self.settle(Outcome::Complete);
                self.status_message =
                    format!("Process complete! Processed {} files.", progress.received);
            }
            JobStatus::Failed => {
                self.settle(Outcome::Failed);
                self.status_message = "Process failed.".to_string();
            }
            JobStatus::Pending | JobStatus::Running => {
                let expected = progress
                    .expected
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string());
                self.status_message = format!(
                    "Processing... {} / {} files complete.",
                    progress.received, expected
                );
            }
        }
    }

    fn settle(&mut self, outcome: Outcome) {
        self.poller.cancel_active();
        self.phase = WorkflowPhase::Settled(outcome);

        let label = match outcome {
            Outcome::Complete => "complete",
            Outcome::Failed => "failed",
        };
        metrics::counter!("verification_jobs_settled_total", "outcome" => label).increment(1);
        tracing::info!(
            job_id = ?self.job.as_ref().map(|j| j.id.as_str()),
            outcome = label,
            records = self.reports.len(),
            "Verification job settled"
        );
    }

    fn settle_with_error(&mut self, reason: String) {
        if let Some(job) = self.job.as_mut() {
            job.status = JobStatus::Failed;
        }
        self.settle(Outcome::Failed);
        self.status_message = format!("Error fetching results: {reason}");
        self.last_error = Some(reason);
    }

    // ── Reset ───────────────────────────────────────────────────────

    /// Return to `Idle`: cancel polling and discard the job, reports, inputs
    /// and context.
    pub fn reset(&mut self) {
        if self.poller.cancel_active() {
            tracing::info!("Polling cancelled by reset");
        }
        self.phase = WorkflowPhase::Idle;
        self.context = None;
        self.structured_source = None;
        self.documents = None;
        self.job = None;
        self.reports.clear();
        self.status_message = AWAITING_FILES.to_string();
        self.last_error = None;
    }
}
