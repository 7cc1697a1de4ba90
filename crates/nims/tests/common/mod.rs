#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use helix_db::models::job::JobRecord;
use helix_db::{JobStore, MemoryJobStore};
use helix_nims::backoff::RetryBackoff;
use helix_nims::config::ProviderConfig;
use helix_nims::manager::JobManager;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::MockServer;

pub const OWNER: &str = "owner-a";
pub const OTHER_OWNER: &str = "owner-b";

pub const DESIGN_ENDPOINT: &str = "/biology/ipd/rfdiffusion/generate";

/// A fake provider, an in-memory store and a manager wired to both.
pub struct Harness {
    pub server: MockServer,
    pub store: Arc<MemoryJobStore>,
    pub manager: Arc<JobManager>,
    pub results: TempDir,
}

/// Provider configuration pointing at `server`, with millisecond timings.
pub fn test_config(server: &MockServer, results: &TempDir) -> ProviderConfig {
    let uri = server.uri();
    ProviderConfig {
        api_key: Some("nvapi-test".to_string()),
        base_url: uri.clone(),
        status_url: format!("{uri}/status"),
        poll_interval: Duration::from_millis(10),
        max_transient_failures: 50,
        max_poll_duration: Duration::from_secs(30),
        request_timeout: Duration::from_secs(5),
        submit_attempts: 3,
        ca_bundle: None,
        insecure_tls: false,
        rcsb_base_url: format!("{uri}/rcsb"),
        uniprot_base_url: format!("{uri}/uniprot"),
        result_dir: results.path().to_path_buf(),
        backoff: RetryBackoff {
            base: Duration::from_millis(10),
            cap: Duration::from_millis(50),
        },
    }
}

pub async fn harness() -> Harness {
    harness_with(|_| {}).await
}

/// Build a harness, letting the test adjust the configuration first.
pub async fn harness_with<F>(adjust: F) -> Harness
where
    F: FnOnce(&mut ProviderConfig),
{
    let server = MockServer::start().await;
    let results = tempfile::tempdir().expect("temp dir");
    let mut config = test_config(&server, &results);
    adjust(&mut config);

    let store = Arc::new(MemoryJobStore::new());
    let manager = JobManager::new(store.clone() as Arc<dyn JobStore>, Arc::new(config))
        .expect("manager builds");

    Harness {
        server,
        store,
        manager,
        results,
    }
}

/// Minimal valid RFdiffusion parameters with inline structure.
pub fn design_params() -> Value {
    json!({
        "contigs": "A20-60/0 50-100",
        "hotspot_res": ["A50"],
        "diffusion_steps": 15,
        "input_pdb": "ATOM      1  N   MET A   1      11.104   6.134  -6.504  1.00  0.00           N",
    })
}

/// Poll the store until `check` holds, failing the test after 5 seconds.
pub async fn wait_until<F>(store: &MemoryJobStore, job_id: &str, check: F) -> JobRecord
where
    F: Fn(&JobRecord) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = store
            .find_by_id(job_id)
            .await
            .expect("store read")
            .expect("job exists");
        if check(&record) {
            return record;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting on job {job_id}: {record:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
