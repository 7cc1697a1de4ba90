//! Job manager behaviour: validation, ownership, cancellation, listing,
//! identifier resolution and startup recovery.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use common::{design_params, harness, harness_with, wait_until, DESIGN_ENDPOINT, OTHER_OWNER, OWNER};
use helix_core::job_kind::JobKind;
use helix_db::models::job::{JobListQuery, JobRecord};
use helix_db::models::status::JobStatus;
use helix_db::{JobStore, StoreError};
use helix_nims::error::JobError;
use helix_nims::manager::ResumeSummary;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Provider that accepts every design job and reports it running forever.
async fn mount_endless_design(server: &wiremock::MockServer, request_id: &str) {
    Mock::given(method("POST"))
        .and(path(DESIGN_ENDPOINT))
        .respond_with(ResponseTemplate::new(202).insert_header("nvcf-reqid", request_id))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/status/{request_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .mount(server)
        .await;
}

/// Provider that takes `delay` to answer a design submission.
async fn mount_slow_submission(server: &wiremock::MockServer, delay: Duration) {
    Mock::given(method("POST"))
        .and(path(DESIGN_ENDPOINT))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("nvcf-reqid", "req-late")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

fn seeded_record(id: &str, status: JobStatus, request_id: Option<&str>) -> JobRecord {
    let now = Utc::now();
    JobRecord {
        id: id.to_string(),
        owner_id: OWNER.to_string(),
        kind: "design".to_string(),
        input_parameters: design_params(),
        status_id: status.id(),
        provider_request_id: request_id.map(str::to_string),
        progress: 5.0,
        progress_message: None,
        result_reference: None,
        error_message: None,
        created_at: now,
        started_at: (status == JobStatus::Running).then_some(now),
        completed_at: None,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_parameters_never_create_a_job() {
    let h = harness().await;

    let err = h
        .manager
        .submit(JobKind::Design, OWNER, json!({"diffusion_steps": 0}), None)
        .await
        .unwrap_err();

    assert_matches!(err, JobError::Validation(report) => {
        assert!(report.mentions("contigs"));
        assert!(report.mentions("diffusion_steps"));
    });
    let jobs = h.manager.list(OWNER, &JobListQuery::default()).await.unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn missing_api_key_is_a_synchronous_configuration_error() {
    let h = harness_with(|config| config.api_key = None).await;

    let err = h
        .manager
        .submit(JobKind::Design, OWNER, design_params(), None)
        .await
        .unwrap_err();

    assert_matches!(err, JobError::Configuration(msg) if msg.contains("NVIDIA_API_KEY"));
    assert!(h.store.list_unfinished().await.unwrap().is_empty());
}

#[tokio::test]
async fn submit_returns_before_polling_finishes() {
    let h = harness().await;
    mount_endless_design(&h.server, "endless").await;

    let job = h
        .manager
        .submit(JobKind::Design, OWNER, design_params(), Some("run-1".into()))
        .await
        .unwrap();

    assert_eq!(job.id, "run-1");
    assert!(!job.is_terminal());
    assert_eq!(h.manager.active_campaigns().await, 1);

    h.manager.shutdown().await;
}

#[tokio::test]
async fn duplicate_job_ids_are_rejected() {
    let h = harness().await;
    mount_endless_design(&h.server, "dup").await;

    h.manager
        .submit(JobKind::Design, OWNER, design_params(), Some("same".into()))
        .await
        .unwrap();
    let err = h
        .manager
        .submit(JobKind::Design, OWNER, design_params(), Some("same".into()))
        .await
        .unwrap_err();

    assert_matches!(err, JobError::Store(StoreError::Duplicate(id)) if id == "same");
    h.manager.shutdown().await;
}

#[tokio::test]
async fn pdb_id_is_resolved_through_rcsb() {
    let h = harness().await;

    let pdb = "HEADER    TEST\nATOM      1  N   MET A   1\nHETATM    2  O   HOH A 101\nATOM      3  CA  MET A   1\nEND\n";
    Mock::given(method("GET"))
        .and(path("/rcsb/1R42.pdb"))
        .respond_with(ResponseTemplate::new(200).set_body_string(pdb))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(DESIGN_ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output_pdb": "ATOM OUT\n"})))
        .expect(1)
        .mount(&h.server)
        .await;

    let params = json!({"contigs": "A1-50", "pdb_id": "1r42"});
    let job = h
        .manager
        .submit(JobKind::Design, OWNER, params, None)
        .await
        .unwrap();
    h.manager.wait_for(&job.id).await;

    let record = h.manager.get_status(&job.id, OWNER).await.unwrap();
    assert_eq!(record.status(), JobStatus::Completed);

    let requests = h.server.received_requests().await.unwrap();
    let submission = requests
        .iter()
        .find(|r| r.url.path() == DESIGN_ENDPOINT)
        .unwrap();
    let body: Value = serde_json::from_slice(&submission.body).unwrap();
    assert_eq!(
        body["input_pdb"],
        "ATOM      1  N   MET A   1\nATOM      3  CA  MET A   1"
    );
    assert_eq!(body["diffusion_steps"], 15);
}

#[tokio::test]
async fn unknown_pdb_id_fails_the_job() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/rcsb/9ZZZ.pdb"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(DESIGN_ENDPOINT))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let job = h
        .manager
        .submit(JobKind::Design, OWNER, json!({"contigs": "50", "pdb_id": "9ZZZ"}), None)
        .await
        .unwrap();
    h.manager.wait_for(&job.id).await;

    let record = h.manager.get_status(&job.id, OWNER).await.unwrap();
    assert_eq!(record.status(), JobStatus::Error);
    assert!(record.error_message.unwrap().contains("does not exist"));
}

// ---------------------------------------------------------------------------
// Ownership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn foreign_jobs_are_indistinguishable_from_missing_ones() {
    let h = harness().await;
    mount_endless_design(&h.server, "mine").await;

    let job = h
        .manager
        .submit(JobKind::Design, OWNER, design_params(), None)
        .await
        .unwrap();

    let foreign = h.manager.get_status(&job.id, OTHER_OWNER).await.unwrap_err();
    let missing = h.manager.get_status("no-such-job", OTHER_OWNER).await.unwrap_err();
    assert_matches!(foreign, JobError::NotFound(_));
    assert_matches!(missing, JobError::NotFound(_));

    assert_matches!(
        h.manager.cancel(&job.id, OTHER_OWNER).await,
        Err(JobError::NotFound(_))
    );
    assert_matches!(
        h.manager.result(&job.id, OTHER_OWNER).await,
        Err(JobError::NotFound(_))
    );
    assert!(h
        .manager
        .list(OTHER_OWNER, &JobListQuery::default())
        .await
        .unwrap()
        .is_empty());

    h.manager.shutdown().await;
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_stops_polling_and_is_idempotent() {
    let h = harness().await;
    mount_endless_design(&h.server, "to-cancel").await;

    let job = h
        .manager
        .submit(JobKind::Design, OWNER, design_params(), None)
        .await
        .unwrap();
    wait_until(&h.store, &job.id, |r| r.provider_request_id.is_some()).await;

    let first = h.manager.cancel(&job.id, OWNER).await.unwrap();
    assert!(first.cancelled);
    assert_eq!(first.status, "cancelled");

    h.manager.wait_for(&job.id).await;
    let polls_after_cancel = h.server.received_requests().await.unwrap().len();

    let second = h.manager.cancel(&job.id, OWNER).await.unwrap();
    assert!(!second.cancelled);
    assert_eq!(second.status, "cancelled");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        h.server.received_requests().await.unwrap().len(),
        polls_after_cancel
    );

    let record = h.manager.get_status(&job.id, OWNER).await.unwrap();
    assert_eq!(record.status(), JobStatus::Cancelled);
    assert!(record.error_message.is_none());
    assert!(record.result_reference.is_none());
}

#[tokio::test]
async fn cancel_during_submission_abandons_the_request() {
    let h = harness().await;
    mount_slow_submission(&h.server, Duration::from_secs(3)).await;

    let job = h
        .manager
        .submit(JobKind::Design, OWNER, design_params(), None)
        .await
        .unwrap();
    wait_until(&h.store, &job.id, |r| r.status() == JobStatus::Running).await;

    let started = tokio::time::Instant::now();
    let ack = h.manager.cancel(&job.id, OWNER).await.unwrap();
    assert!(ack.cancelled);
    h.manager.wait_for(&job.id).await;
    assert!(started.elapsed() < Duration::from_secs(2));

    // A request id arriving after cancellation is refused by the store.
    assert!(!h.store.set_provider_request_id(&job.id, "req-late").await.unwrap());

    let record = h.manager.get_status(&job.id, OWNER).await.unwrap();
    assert_eq!(record.status(), JobStatus::Cancelled);
    assert!(record.provider_request_id.is_none());
    assert!(record.error_message.is_none());
}

#[tokio::test]
async fn cancelling_a_completed_job_changes_nothing() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(DESIGN_ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output_pdb": "ATOM\n"})))
        .mount(&h.server)
        .await;

    let job = h
        .manager
        .submit(JobKind::Design, OWNER, design_params(), None)
        .await
        .unwrap();
    h.manager.wait_for(&job.id).await;

    let ack = h.manager.cancel(&job.id, OWNER).await.unwrap();
    assert!(!ack.cancelled);
    assert_eq!(ack.status, "completed");
    assert_eq!(
        h.manager.get_status(&job.id, OWNER).await.unwrap().status(),
        JobStatus::Completed
    );
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_rejects_unknown_status_filter() {
    let h = harness().await;

    let query = JobListQuery {
        status: Some("finished".into()),
        ..Default::default()
    };
    let err = h.manager.list(OWNER, &query).await.unwrap_err();
    assert_matches!(err, JobError::Validation(report) if report.mentions("status"));
}

// ---------------------------------------------------------------------------
// Startup recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accepted_jobs_resume_and_unaccepted_jobs_fail() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/status/req-resume"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output_pdb": "ATOM RESUMED\n"})))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    h.store
        .insert(seeded_record("resume-me", JobStatus::Running, Some("req-resume")))
        .await;
    h.store
        .insert(seeded_record("never-sent", JobStatus::Queued, None))
        .await;

    let summary = h.manager.resume_interrupted().await.unwrap();
    assert_eq!(
        summary,
        ResumeSummary {
            resumed: 1,
            failed: 1
        }
    );

    h.manager.wait_for("resume-me").await;
    let resumed = h.manager.get_status("resume-me", OWNER).await.unwrap();
    assert_eq!(resumed.status(), JobStatus::Completed);

    let failed = h.manager.get_status("never-sent", OWNER).await.unwrap();
    assert_eq!(failed.status(), JobStatus::Error);
    assert!(failed
        .error_message
        .unwrap()
        .to_lowercase()
        .contains("interrupted before the provider accepted"));
}

#[tokio::test]
async fn shutdown_leaves_accepted_jobs_running() {
    let h = harness().await;
    mount_endless_design(&h.server, "long").await;

    let job = h
        .manager
        .submit(JobKind::Design, OWNER, design_params(), None)
        .await
        .unwrap();
    wait_until(&h.store, &job.id, |r| r.provider_request_id.is_some()).await;

    h.manager.shutdown().await;

    let record = h.manager.get_status(&job.id, OWNER).await.unwrap();
    assert_eq!(record.status(), JobStatus::Running);
    assert_eq!(record.provider_request_id.as_deref(), Some("long"));
    assert_eq!(h.manager.active_campaigns().await, 0);
}

#[tokio::test]
async fn shutdown_during_submission_fails_the_job_promptly() {
    let h = harness().await;
    mount_slow_submission(&h.server, Duration::from_secs(3)).await;

    let job = h
        .manager
        .submit(JobKind::Design, OWNER, design_params(), None)
        .await
        .unwrap();
    wait_until(&h.store, &job.id, |r| r.status() == JobStatus::Running).await;

    let started = tokio::time::Instant::now();
    h.manager.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(h.manager.active_campaigns().await, 0);

    let record = h.manager.get_status(&job.id, OWNER).await.unwrap();
    assert_eq!(record.status(), JobStatus::Error);
    assert!(record.provider_request_id.is_none());
    assert!(record
        .error_message
        .unwrap()
        .to_lowercase()
        .contains("interrupted before the provider accepted"));
}

#[tokio::test]
async fn shutdown_while_fetching_a_structure_never_submits() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/rcsb/1R42.pdb"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("ATOM      1  N   MET A   1\n")
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202).insert_header("nvcf-reqid", "never"))
        .expect(0)
        .mount(&h.server)
        .await;

    let params = json!({"contigs": "A1-50", "pdb_id": "1R42"});
    let job = h
        .manager
        .submit(JobKind::Design, OWNER, params, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = tokio::time::Instant::now();
    h.manager.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(2));

    let record = h.manager.get_status(&job.id, OWNER).await.unwrap();
    assert_eq!(record.status(), JobStatus::Error);
    assert!(record.provider_request_id.is_none());
}
