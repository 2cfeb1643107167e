//! Job submitter accounting against a scripted backend.

mod fixtures;
mod helpers;

use fixtures::*;
use helpers::*;
use metrics::{Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use verify_center::models::job::JobId;
use verify_center::models::verification::Submission;
use verify_center::services::backend::{BackendError, VerificationBackend};
use verify_center::services::submitter::JobSubmitter;
use verify_center::WorkflowError;

struct Count(Arc<AtomicU64>);

impl CounterFn for Count {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::SeqCst);
    }

    fn absolute(&self, value: u64) {
        self.0.fetch_max(value, Ordering::SeqCst);
    }
}

/// Records counter totals by name; gauges and histograms are ignored.
#[derive(Default)]
struct CountingRecorder {
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

impl CountingRecorder {
    fn count(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(name)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let count = self
            .counters
            .lock()
            .unwrap()
            .entry(key.name().to_string())
            .or_default()
            .clone();
        Counter::from_arc(Arc::new(Count(count)))
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

fn submitter(backend: &FakeBackend) -> JobSubmitter {
    let backend: Arc<dyn VerificationBackend> = Arc::new(backend.clone());
    JobSubmitter::new(backend)
}

fn submission() -> Submission {
    Submission {
        structured_source: Some(master_csv()),
        documents: Some(documents(2)),
        context_id: None,
    }
}

#[test]
fn test_rejected_submit_counts_only_as_failed() {
    let backend = FakeBackend::new();
    backend.push_submit(Err(BackendError::Status {
        status: 500,
        message: "Internal error".to_string(),
    }));
    let recorder = CountingRecorder::default();

    let result = metrics::with_local_recorder(&recorder, || {
        tokio_test::block_on(submitter(&backend).submit(&submission(), Some(&token())))
    });

    assert!(matches!(result, Err(WorkflowError::Submission(_))));
    assert_eq!(recorder.count("verification_jobs_submitted_total"), 0);
    assert_eq!(recorder.count("verification_submissions_failed_total"), 1);
}

#[test]
fn test_accepted_submit_counts_once_and_returns_credential() {
    let backend = FakeBackend::new();
    backend.push_submit(Ok(JobId::new("42")));
    let recorder = CountingRecorder::default();

    let submitted = metrics::with_local_recorder(&recorder, || {
        tokio_test::block_on(submitter(&backend).submit(&submission(), Some(&token())))
    })
    .unwrap();

    assert_eq!(submitted.job_id, JobId::new("42"));
    assert_eq!(submitted.token, token());
    assert_eq!(recorder.count("verification_jobs_submitted_total"), 1);
    assert_eq!(recorder.count("verification_submissions_failed_total"), 0);
}

#[test]
fn test_invalid_submission_is_not_counted() {
    let backend = FakeBackend::new();
    let recorder = CountingRecorder::default();
    let incomplete = Submission {
        documents: None,
        ..submission()
    };

    let result = metrics::with_local_recorder(&recorder, || {
        tokio_test::block_on(submitter(&backend).submit(&incomplete, Some(&token())))
    });

    assert!(matches!(result, Err(WorkflowError::Validation(_))));
    assert!(backend.submit_calls().is_empty());
    assert_eq!(recorder.count("verification_jobs_submitted_total"), 0);
}
