//! Fixed-cadence job status polling.
//!
//! A [`StatusPoller`] owns at most one [`PollingSession`]. The session owns the
//! spawned poll loop, its cancellation token and the receiving end of the
//! event channel; dropping the session releases all three, so a response that
//! arrives after cancellation has nowhere to go.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::job::{JobId, JobStatus};
use crate::models::report::MatchReport;
use crate::models::verification::BearerToken;
use crate::services::backend::{BackendError, VerificationBackend};
use crate::services::transform::{transform_all, FieldSchema};

/// Default time between status requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

const EVENT_BUFFER: usize = 16;

/// Identifies one `start` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollHandle {
    pub session_id: Uuid,
    pub job_id: JobId,
}

/// Result of one successful status request, already transformed.
#[derive(Debug, Clone)]
pub struct PollUpdate {
    pub status: JobStatus,
    pub reports: Vec<MatchReport>,
    pub expected_count: Option<usize>,
}

#[derive(Debug)]
pub enum PollEventKind {
    Update(PollUpdate),
    /// Transport or decode failure; always the last event of a session.
    Failed(BackendError),
}

#[derive(Debug)]
pub struct PollEvent {
    pub session_id: Uuid,
    pub job_id: JobId,
    pub kind: PollEventKind,
}

impl PollEvent {
    pub fn is_terminal(&self) -> bool {
        match &self.kind {
            PollEventKind::Update(update) => update.status.is_terminal(),
            PollEventKind::Failed(_) => true,
        }
    }
}

/// A live poll loop. Cancelled and released on drop.
struct PollingSession {
    handle: PollHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    events: mpsc::Receiver<PollEvent>,
}

impl PollingSession {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for PollingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
        tracing::debug!(
            session_id = %self.handle.session_id,
            job_id = %self.handle.job_id,
            "Polling session released"
        );
    }
}

/// Decrements the running-loop counter when the poll loop future is dropped,
/// whether it finished, was cancelled or was aborted.
struct RunningGuard {
    running: Arc<AtomicUsize>,
}

impl RunningGuard {
    fn acquire(running: Arc<AtomicUsize>) -> Self {
        running.fetch_add(1, Ordering::SeqCst);
        Self { running }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct StatusPoller {
    backend: Arc<dyn VerificationBackend>,
    schema: Arc<FieldSchema>,
    interval: Duration,
    session: Option<PollingSession>,
    running: Arc<AtomicUsize>,
}

impl StatusPoller {
    pub fn new(
        backend: Arc<dyn VerificationBackend>,
        schema: Arc<FieldSchema>,
        interval: Duration,
    ) -> Self {
        Self {
            backend,
            schema,
            interval: interval.max(Duration::from_millis(1)),
            session: None,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin polling `job_id`, cancelling any session still running.
    ///
    /// The first request goes out one interval after this call.
    pub fn start(&mut self, job_id: JobId, token: BearerToken) -> PollHandle {
        if let Some(previous) = self.session.take() {
            tracing::info!(
                session_id = %previous.handle.session_id,
                job_id = %previous.handle.job_id,
                "Cancelling previous polling session"
            );
        }

        let handle = PollHandle {
            session_id: Uuid::new_v4(),
            job_id,
        };
        let cancel = CancellationToken::new();
        let (tx, events) = mpsc::channel(EVENT_BUFFER);

        let poll_loop = PollLoop {
            backend: Arc::clone(&self.backend),
            schema: Arc::clone(&self.schema),
            handle: handle.clone(),
            token,
            interval: self.interval,
            cancel: cancel.clone(),
            tx,
            _guard: RunningGuard::acquire(Arc::clone(&self.running)),
        };
        let task = tokio::spawn(poll_loop.run());

        tracing::info!(
            session_id = %handle.session_id,
            job_id = %handle.job_id,
            interval_ms = self.interval.as_millis() as u64,
            "Polling session started"
        );

        self.session = Some(PollingSession {
            handle: handle.clone(),
            cancel,
            task,
            events,
        });
        handle
    }

    /// Cancel the session identified by `handle`.
    ///
    /// Returns false if that session is no longer the current one.
    pub fn cancel(&mut self, handle: &PollHandle) -> bool {
        match &self.session {
            Some(session) if session.handle == *handle => {
                self.session = None;
                true
            }
            _ => false,
        }
    }

    /// Cancel whatever session is current. Returns true if one existed.
    pub fn cancel_active(&mut self) -> bool {
        self.session.take().is_some()
    }

    /// Handle of the current session, if its loop is still running.
    pub fn active(&self) -> Option<&PollHandle> {
        self.session
            .as_ref()
            .filter(|s| s.is_active())
            .map(|s| &s.handle)
    }

    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }

    /// Number of poll loops that have not yet been dropped by the runtime.
    pub fn running_loops(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait for the next event of the current session.
    ///
    /// Returns `None` when there is no session or its loop has ended. The
    /// session is released after its terminal event is handed out.
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        let session = self.session.as_mut()?;
        let current = session.handle.session_id;

        loop {
            let Some(event) = session.events.recv().await else {
                self.session = None;
                return None;
            };

            if event.session_id != current {
                tracing::debug!(session_id = %event.session_id, "Dropping event from stale session");
                continue;
            }

            if event.is_terminal() {
                self.session = None;
            }
            return Some(event);
        }
    }
}

struct PollLoop {
    backend: Arc<dyn VerificationBackend>,
    schema: Arc<FieldSchema>,
    handle: PollHandle,
    token: BearerToken,
    interval: Duration,
    cancel: CancellationToken,
    tx: mpsc::Sender<PollEvent>,
    _guard: RunningGuard,
}

impl PollLoop {
    async fn run(self) {
        let job_id = &self.handle.job_id;
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            metrics::counter!("verification_poll_ticks_total").increment(1);

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.backend.fetch_status(job_id, &self.token) => result,
            };

            let kind = match result {
                Ok(response) => {
                    let expected_count = response.expected_count();
                    let reports = transform_all(&response.results, &self.schema);
                    tracing::debug!(
                        job_id = %job_id,
                        status = %response.status,
                        received = reports.len(),
                        expected = ?expected_count,
                        "Status tick"
                    );
                    PollEventKind::Update(PollUpdate {
                        status: response.status,
                        reports,
                        expected_count,
                    })
                }
                Err(e) => {
                    metrics::counter!("verification_poll_failures_total").increment(1);
                    tracing::warn!(job_id = %job_id, error = %e, "Status request failed, ending session");
                    PollEventKind::Failed(e)
                }
            };

            let event = PollEvent {
                session_id: self.handle.session_id,
                job_id: job_id.clone(),
                kind,
            };
            let terminal = event.is_terminal();

            let delivered = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                sent = self.tx.send(event) => sent.is_ok(),
            };

            if !delivered || terminal {
                break;
            }
        }

        tracing::debug!(session_id = %self.handle.session_id, "Poll loop exited");
    }
}
