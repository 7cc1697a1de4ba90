//! Integration tests for `JobRepo` / `PgJobStore` against a real database.
//!
//! Require `DATABASE_URL`; run with `cargo test -- --ignored`.

use helix_core::job_kind::JobKind;
use helix_db::models::job::{JobListQuery, NewJob};
use helix_db::models::status::JobStatus;
use helix_db::{CancelOutcome, JobStore, PgJobStore};
use sqlx::PgPool;

fn new_job(owner: &str) -> NewJob {
    NewJob {
        id: None,
        owner_id: owner.to_string(),
        kind: JobKind::Design,
        input_parameters: serde_json::json!({ "contigs": "A20-60/0 50-100" }),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn full_lifecycle_respects_invariants(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let job = store.create(&new_job("alice")).await.unwrap();
    assert_eq!(job.status(), JobStatus::Queued);

    assert!(store.mark_running(&job.id).await.unwrap());
    assert!(store.set_provider_request_id(&job.id, "abc123").await.unwrap());
    assert!(!store.set_provider_request_id(&job.id, "again").await.unwrap());
    assert!(store.update_progress(&job.id, 42.5, "Polling").await.unwrap());
    assert!(store.complete(&job.id, "/tmp/design/x.pdb").await.unwrap());
    assert!(!store.fail(&job.id, "late").await.unwrap());

    let job = store.find_for_owner(&job.id, "alice").await.unwrap().unwrap();
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.provider_request_id.as_deref(), Some("abc123"));
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn cancel_and_owner_isolation(pool: PgPool) {
    let store = PgJobStore::new(pool);
    let job = store.create(&new_job("alice")).await.unwrap();

    assert!(store.find_for_owner(&job.id, "bob").await.unwrap().is_none());
    assert_eq!(store.cancel(&job.id, "bob").await.unwrap(), CancelOutcome::NotFound);
    assert_eq!(store.cancel(&job.id, "alice").await.unwrap(), CancelOutcome::Cancelled);
    assert_eq!(
        store.cancel(&job.id, "alice").await.unwrap(),
        CancelOutcome::AlreadyTerminal(JobStatus::Cancelled)
    );

    let listed = store
        .list_for_owner("alice", &JobListQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(store.list_unfinished().await.unwrap().is_empty());
}
