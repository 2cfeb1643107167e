//! End-to-end verification run against a scripted backend.
//!
//! One master CSV and three scorecards are submitted; the backend reports one
//! record on the first tick and all three on the second, one of which could
//! not be read.

mod fixtures;
mod helpers;

use fixtures::*;
use helpers::*;
use std::sync::Arc;
use std::time::Duration;

use verify_center::models::job::{JobId, JobStatus};
use verify_center::models::report::OverallStatus;
use verify_center::services::transform::COMPRESSION_FAILED;
use verify_center::{Outcome, WorkflowController, WorkflowOptions, WorkflowPhase};

#[tokio::test(start_paused = true)]
async fn test_e2e_batch_verification() {
    let backend = FakeBackend::new();
    backend.push_submit(Ok(JobId::new("42")));
    backend.push_status(Ok(status(JobStatus::Running, vec![record(1001, "Asha Rao")])));
    backend.push_status(Ok(status(
        JobStatus::Complete,
        vec![
            record(1001, "Asha Rao"),
            record(1002, COMPRESSION_FAILED),
            record_with(1003, "Vikram Shah", &[true, true, false, true, true, true, false, true]),
        ],
    )));

    let options = WorkflowOptions {
        poll_interval: Duration::from_secs(3),
        ..WorkflowOptions::default()
    };
    let mut controller = WorkflowController::new(Arc::new(backend.clone()), Some(token()), options);

    // 1. Configure inputs
    controller.select_context(None).unwrap();
    controller.set_structured_source(Some(master_csv())).unwrap();
    controller.set_documents(Some(documents(3))).unwrap();
    assert!(controller.can_run());

    // 2. Submit
    let job_id = controller.run().await.expect("submit");
    assert_eq!(job_id, JobId::new("42"));
    assert_eq!(controller.phase(), WorkflowPhase::Processing);
    assert_eq!(controller.status_message(), "Job started! Fetching results...");

    let calls = backend.submit_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].structured_source.as_deref(), Some("master.csv"));
    assert_eq!(calls[0].document_count, Some(3));
    assert_eq!(calls[0].token, "test-token");

    // 3. First tick: RUNNING, 1 of 3
    assert_eq!(controller.pump().await, Some(WorkflowPhase::Processing));
    assert_eq!(controller.progress().to_string(), "1/3");
    assert_eq!(controller.status_message(), "Processing... 1 / 3 files complete.");
    assert_eq!(controller.job().unwrap().status, JobStatus::Running);

    // 4. Second tick: COMPLETE, 3 of 3
    assert_eq!(
        controller.pump().await,
        Some(WorkflowPhase::Settled(Outcome::Complete))
    );
    assert_eq!(controller.progress().to_string(), "3/3");
    assert_eq!(controller.status_message(), "Process complete! Processed 3 files.");

    let reports = controller.reports();
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].overall_status, OverallStatus::Complete);
    assert_eq!(reports[1].overall_status, OverallStatus::Failed);
    assert_eq!(reports[2].overall_status, OverallStatus::Complete);

    // The unreadable record still matched every field; the sentinel wins.
    assert!(reports[1].is_full_match());
    assert_eq!(reports[1].source_label, "1002_GATE");

    assert_eq!(reports[2].matched_count, 6);
    assert!(!reports[2].field("registration_id").unwrap().matched);
    assert!(reports.iter().all(|r| r.total_fields == 8));

    // 5. Polling has stopped
    assert!(!controller.poller().is_active());
    assert!(controller.pump().await.is_none());
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.status_calls().len(), 2);
}
