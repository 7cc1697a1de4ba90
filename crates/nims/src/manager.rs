//! Job handler and orchestrator.
//!
//! [`JobManager`] validates submissions, records them in the job store and
//! runs one background campaign per job (submit, then poll until a terminal
//! outcome). The store is authoritative; the in-memory campaign map only
//! tracks running tasks so they can be cancelled and awaited.
//!
//! Lifecycle events are broadcast via a [`tokio::sync::broadcast`] channel.
//! Call [`JobManager::subscribe`] to receive them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use helix_core::job_kind::JobKind;
use helix_core::types::JobId;
use helix_core::validation::ValidationReport;
use helix_db::models::job::{JobListQuery, JobRecord, NewJob};
use helix_db::models::status::JobStatus;
use helix_db::{CancelOutcome, JobStore};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api::{NimsApi, SubmitResponse};
use crate::artifact::{extract_artifact, render_artifact, ArtifactStore};
use crate::capability::{capability_for, Capability};
use crate::config::ProviderConfig;
use crate::error::JobError;
use crate::events::JobEvent;
use crate::poller::{poll_until_done, PollContext, PollOutcome, PollSettings, ACCEPTED_PERCENT};
use crate::session::SessionFactory;
use crate::sources::ExternalSources;

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long shutdown waits for each campaign to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Longest caller-supplied job id.
const MAX_JOB_ID_LEN: usize = 64;

/// Acknowledgement of a cancel request.
#[derive(Debug, Clone, Serialize)]
pub struct CancelAck {
    pub job_id: JobId,
    pub status: &'static str,
    /// `true` if this request moved the job to `cancelled`.
    pub cancelled: bool,
}

/// A completed job's stored artifact.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub job_id: JobId,
    pub kind: JobKind,
    pub extension: &'static str,
    pub content: String,
}

/// Outcome of startup recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumeSummary {
    pub resumed: usize,
    pub failed: usize,
}

/// Where a campaign starts.
enum CampaignMode {
    /// Build the payload and submit it.
    Submit,
    /// The provider already accepted the job; keep polling.
    Resume {
        request_id: String,
        already_elapsed: Duration,
    },
}

/// Bookkeeping for one running campaign.
struct Campaign {
    task_handle: tokio::task::JoinHandle<()>,
    /// Per-job token (child of the master token).
    cancel: CancellationToken,
}

/// Runs provider jobs in the background and tracks their campaigns.
///
/// Created once at startup via [`JobManager::new`]. The returned `Arc` can
/// be cheaply cloned into request handlers.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    config: Arc<ProviderConfig>,
    sessions: SessionFactory,
    artifacts: ArtifactStore,
    campaigns: RwLock<HashMap<JobId, Campaign>>,
    event_tx: broadcast::Sender<JobEvent>,
    /// Master cancellation token, cancelled during shutdown.
    cancel: CancellationToken,
}

impl JobManager {
    /// Build a manager over `store`.
    ///
    /// Fails if the configured trust store cannot be loaded, so TLS
    /// misconfiguration surfaces at startup instead of on every job.
    pub fn new(
        store: Arc<dyn JobStore>,
        config: Arc<ProviderConfig>,
    ) -> Result<Arc<Self>, JobError> {
        let sessions = SessionFactory::new(Arc::clone(&config))?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Arc::new(Self {
            store,
            sessions,
            artifacts: ArtifactStore::new(config.result_dir.clone()),
            config,
            campaigns: RwLock::new(HashMap::new()),
            event_tx,
            cancel: CancellationToken::new(),
        }))
    }

    /// Subscribe to job lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Validate and record a job, then start its campaign in the background.
    ///
    /// Returns as soon as the job is stored as `queued`. Validation and
    /// configuration errors are returned here and never create a job.
    pub async fn submit(
        self: &Arc<Self>,
        kind: JobKind,
        owner_id: &str,
        params: Value,
        job_id: Option<JobId>,
    ) -> Result<JobRecord, JobError> {
        let capability = capability_for(kind);

        let mut report = capability.validate(&params);
        if let Some(id) = job_id.as_deref() {
            check_job_id(&mut report, id);
        }
        report.into_result().map_err(JobError::Validation)?;
        self.config.api_key()?;

        let record = self
            .store
            .create(&NewJob {
                id: job_id,
                owner_id: owner_id.to_string(),
                kind,
                input_parameters: params,
            })
            .await?;

        tracing::info!(
            job_id = %record.id,
            owner_id,
            kind = %kind,
            "Job submitted",
        );

        self.spawn_campaign(record.clone(), CampaignMode::Submit)
            .await;
        Ok(record)
    }

    /// Snapshot of an owner's job. Foreign and missing jobs are both
    /// `NotFound`.
    pub async fn get_status(&self, job_id: &str, owner_id: &str) -> Result<JobRecord, JobError> {
        self.store
            .find_for_owner(job_id, owner_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Cancel an owner's job. Idempotent once the job is terminal.
    pub async fn cancel(&self, job_id: &str, owner_id: &str) -> Result<CancelAck, JobError> {
        match self.store.cancel(job_id, owner_id).await? {
            CancelOutcome::Cancelled => {
                if let Some(campaign) = self.campaigns.read().await.get(job_id) {
                    campaign.cancel.cancel();
                }
                tracing::info!(job_id, owner_id, "Job cancelled");
                let _ = self.event_tx.send(JobEvent::JobCancelled {
                    job_id: job_id.to_string(),
                });
                Ok(CancelAck {
                    job_id: job_id.to_string(),
                    status: JobStatus::Cancelled.as_str(),
                    cancelled: true,
                })
            }
            CancelOutcome::AlreadyTerminal(status) => Ok(CancelAck {
                job_id: job_id.to_string(),
                status: status.as_str(),
                cancelled: false,
            }),
            CancelOutcome::NotFound => Err(JobError::NotFound(job_id.to_string())),
        }
    }

    /// Owner-scoped listing, newest first.
    pub async fn list(
        &self,
        owner_id: &str,
        query: &JobListQuery,
    ) -> Result<Vec<JobRecord>, JobError> {
        if let Err(name) = query.status_filter() {
            let mut report = ValidationReport::new();
            report.push(
                "status",
                format!("unknown status '{name}'; expected one of {}", status_names()),
            );
            return Err(JobError::Validation(report));
        }
        Ok(self.store.list_for_owner(owner_id, query).await?)
    }

    /// Read the stored artifact of a completed job.
    pub async fn result(&self, job_id: &str, owner_id: &str) -> Result<JobResult, JobError> {
        let record = self.get_status(job_id, owner_id).await?;
        let status = record.status();
        let (Some(kind), Some(reference), JobStatus::Completed) =
            (record.job_kind(), record.result_reference.as_deref(), status)
        else {
            return Err(JobError::ResultUnavailable {
                job_id: record.id,
                status: status.as_str(),
            });
        };

        let content = self.artifacts.read(reference).await?;
        Ok(JobResult {
            job_id: record.id.clone(),
            kind,
            extension: capability_for(kind).artifact_extension(),
            content,
        })
    }

    /// Startup recovery for jobs left active by a previous process.
    ///
    /// Jobs the provider already accepted resume polling with whatever is
    /// left of their budget. Jobs that never got a provider request id are
    /// failed; nothing is resubmitted automatically.
    pub async fn resume_interrupted(self: &Arc<Self>) -> Result<ResumeSummary, JobError> {
        let unfinished = self.store.list_unfinished().await?;
        let mut summary = ResumeSummary::default();

        for job in unfinished {
            if self.campaigns.read().await.contains_key(&job.id) {
                continue;
            }

            match job.provider_request_id.clone() {
                Some(request_id) if job.status() == JobStatus::Running => {
                    let since = job.started_at.unwrap_or(job.created_at);
                    let already_elapsed = (Utc::now() - since).to_std().unwrap_or(Duration::ZERO);
                    tracing::info!(
                        job_id = %job.id,
                        request_id = %request_id,
                        elapsed_secs = already_elapsed.as_secs(),
                        "Resuming polling for interrupted job",
                    );
                    self.spawn_campaign(
                        job,
                        CampaignMode::Resume {
                            request_id,
                            already_elapsed,
                        },
                    )
                    .await;
                    summary.resumed += 1;
                }
                _ => {
                    tracing::warn!(job_id = %job.id, "Failing job interrupted before acceptance");
                    self.record_failure(&job.id, &JobError::InterruptedBeforeAcceptance)
                        .await;
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            resumed = summary.resumed,
            failed = summary.failed,
            "Startup recovery finished",
        );
        Ok(summary)
    }

    /// Wait for a job's campaign to end. Returns at once when none is running.
    pub async fn wait_for(&self, job_id: &str) {
        let handle = self.campaigns.write().await.remove(job_id);
        if let Some(campaign) = handle {
            let _ = campaign.task_handle.await;
        }
    }

    /// Number of campaigns currently running.
    pub async fn active_campaigns(&self) -> usize {
        self.campaigns.read().await.len()
    }

    /// Gracefully stop all campaigns.
    ///
    /// Cancels the master token, then waits up to 5 seconds per task and
    /// aborts any task still running after that. Jobs already accepted by
    /// the provider stay `running` for the next start; jobs still being
    /// submitted are failed.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job manager");
        self.cancel.cancel();

        let drained: Vec<(JobId, Campaign)> = self.campaigns.write().await.drain().collect();
        for (job_id, mut campaign) in drained {
            tracing::info!(job_id = %job_id, "Stopping campaign");
            campaign.cancel.cancel();
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut campaign.task_handle)
                .await
                .is_err()
            {
                tracing::warn!(job_id = %job_id, "Campaign did not stop in time, aborting");
                campaign.task_handle.abort();
            }
        }

        tracing::info!("Job manager shut down complete");
    }

    // ---- private helpers ----

    /// Spawn the background task for one job.
    ///
    /// The campaign map stays locked while spawning so a task that finishes
    /// immediately cannot try to deregister before it is registered.
    async fn spawn_campaign(self: &Arc<Self>, job: JobRecord, mode: CampaignMode) {
        let mut campaigns = self.campaigns.write().await;

        let job_id = job.id.clone();
        let cancel = self.cancel.child_token();
        let task_cancel = cancel.clone();
        let manager = Arc::clone(self);

        let task_handle = tokio::spawn(async move {
            let job_id = job.id.clone();
            manager.run_campaign(job, mode, &task_cancel).await;
            manager.campaigns.write().await.remove(&job_id);
        });

        campaigns.insert(
            job_id,
            Campaign {
                task_handle,
                cancel,
            },
        );
    }

    async fn run_campaign(&self, job: JobRecord, mode: CampaignMode, cancel: &CancellationToken) {
        let Some(kind) = job.job_kind() else {
            let error = JobError::MalformedResponse(format!("unknown job kind '{}'", job.kind));
            self.record_failure(&job.id, &error).await;
            return;
        };
        let capability = capability_for(kind);

        // The client lives for this campaign only and is dropped on every
        // exit path below.
        let client = match self.sessions.build() {
            Ok(client) => client,
            Err(e) => {
                self.record_failure(&job.id, &e).await;
                return;
            }
        };
        let api = NimsApi::new(client.clone(), Arc::clone(&self.config));
        let ctx = CampaignContext {
            manager: self,
            job_id: &job.id,
        };

        let outcome = match mode {
            CampaignMode::Submit => {
                let sources = ExternalSources::new(client, &self.config);
                self.submit_and_poll(&job, capability, &api, &sources, &ctx, cancel)
                    .await
            }
            CampaignMode::Resume {
                request_id,
                already_elapsed,
            } => {
                let settings = PollSettings::from_config(&self.config).resumed(already_elapsed);
                poll_until_done(&api, &request_id, &settings, &ctx, cancel).await
            }
        };

        let result = match outcome {
            Ok(PollOutcome::Completed(body)) => self.store_result(&job, capability, &body).await,
            Ok(PollOutcome::Cancelled) => {
                tracing::info!(job_id = %job.id, "Campaign ended by cancellation");
                Ok(())
            }
            Ok(PollOutcome::Interrupted) => {
                tracing::info!(job_id = %job.id, "Campaign interrupted by shutdown");
                Ok(())
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.record_failure(&job.id, &e).await;
        }
    }

    async fn submit_and_poll(
        &self,
        job: &JobRecord,
        capability: &dyn Capability,
        api: &NimsApi,
        sources: &ExternalSources,
        ctx: &CampaignContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, JobError> {
        ctx.report("Submitting job to provider", 0.0).await;

        let params = &job.input_parameters;
        let Some(payload) =
            unless_cancelled(ctx, cancel, capability.build_payload(params, sources)).await?
        else {
            return Ok(PollOutcome::Cancelled);
        };

        if !self.store.mark_running(&job.id).await? {
            return Ok(PollOutcome::Cancelled);
        }

        let submission = api.submit(
            capability.endpoint_path(params),
            &payload,
            capability.result_keys(),
        );
        let Some(response) = unless_cancelled(ctx, cancel, submission).await? else {
            return Ok(PollOutcome::Cancelled);
        };

        match response {
            SubmitResponse::Inline(body) => {
                tracing::info!(job_id = %job.id, "Provider returned the result inline");
                Ok(PollOutcome::Completed(body))
            }
            SubmitResponse::Accepted { request_id } => {
                if !self
                    .store
                    .set_provider_request_id(&job.id, &request_id)
                    .await?
                {
                    return Ok(PollOutcome::Cancelled);
                }
                tracing::info!(
                    job_id = %job.id,
                    request_id = %request_id,
                    "Provider accepted job",
                );
                let _ = self.event_tx.send(JobEvent::JobAccepted {
                    job_id: job.id.clone(),
                    request_id: request_id.clone(),
                });
                ctx.report("Accepted by provider; waiting for result", ACCEPTED_PERCENT)
                    .await;

                let settings = PollSettings::from_config(&self.config);
                poll_until_done(api, &request_id, &settings, ctx, cancel).await
            }
        }
    }

    /// Extract, persist and attach the artifact of a finished job.
    async fn store_result(
        &self,
        job: &JobRecord,
        capability: &dyn Capability,
        body: &Value,
    ) -> Result<(), JobError> {
        let keys = capability.result_keys();
        let artifact = extract_artifact(body, keys).ok_or_else(|| {
            JobError::MalformedResponse(format!(
                "provider response has none of the expected result fields ({})",
                keys.join(", ")
            ))
        })?;

        let extension = capability.artifact_extension();
        let content = render_artifact(&artifact, extension);
        if content.trim().is_empty() {
            return Err(JobError::MalformedResponse(
                "provider returned an empty result".to_string(),
            ));
        }

        let path = self
            .artifacts
            .write(capability.kind(), &job.id, extension, &content)
            .await?;
        let reference = path.to_string_lossy().into_owned();

        if self.store.complete(&job.id, &reference).await? {
            tracing::info!(job_id = %job.id, result = %reference, "Job completed");
            let _ = self.event_tx.send(JobEvent::JobCompleted {
                job_id: job.id.clone(),
                result_reference: reference,
            });
        } else {
            tracing::info!(job_id = %job.id, "Job no longer active, discarding result");
            self.artifacts.discard(&path).await;
        }
        Ok(())
    }

    /// Record a terminal failure; a job that is already terminal is left alone.
    async fn record_failure(&self, job_id: &str, error: &JobError) {
        let message = error.to_string();
        match self.store.fail(job_id, &message).await {
            Ok(true) => {
                tracing::error!(job_id, error = %message, "Job failed");
                let _ = self.event_tx.send(JobEvent::JobFailed {
                    job_id: job_id.to_string(),
                    error: message,
                });
            }
            Ok(false) => {
                tracing::debug!(job_id, error = %message, "Failure ignored, job already terminal");
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to record job failure");
            }
        }
    }
}

/// Store-backed [`PollContext`] for one job.
struct CampaignContext<'a> {
    manager: &'a JobManager,
    job_id: &'a str,
}

#[async_trait]
impl PollContext for CampaignContext<'_> {
    async fn report(&self, message: &str, percent: f64) {
        if let Err(e) = self
            .manager
            .store
            .update_progress(self.job_id, percent, message)
            .await
        {
            tracing::warn!(job_id = self.job_id, error = %e, "Failed to record progress");
        }
        let _ = self.manager.event_tx.send(JobEvent::JobProgress {
            job_id: self.job_id.to_string(),
            percent,
            message: message.to_string(),
        });
    }

    /// `true` once the job is no longer active in the store.
    async fn is_cancelled(&self) -> bool {
        match self.manager.store.find_by_id(self.job_id).await {
            Ok(Some(job)) => job.is_terminal(),
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(job_id = self.job_id, error = %e, "Failed to re-read job status");
                false
            }
        }
    }
}

/// Run a step that happens before the provider has accepted the job.
///
/// Returns `None` when the owner cancelled the job meanwhile. A shutdown
/// fails the job: without a request id it cannot be resumed.
async fn unless_cancelled<T>(
    ctx: &CampaignContext<'_>,
    cancel: &CancellationToken,
    step: impl Future<Output = Result<T, JobError>>,
) -> Result<Option<T>, JobError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if ctx.is_cancelled().await {
                Ok(None)
            } else {
                tracing::info!(job_id = ctx.job_id, "Shutdown before provider acceptance");
                Err(JobError::InterruptedBeforeAcceptance)
            }
        }
        result = step => result.map(Some),
    }
}

fn check_job_id(report: &mut ValidationReport, id: &str) {
    let valid = !id.is_empty()
        && id.len() <= MAX_JOB_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        report.push(
            "job_id",
            format!("must be 1-{MAX_JOB_ID_LEN} letters, digits, '-' or '_'"),
        );
    }
}

fn status_names() -> String {
    JobStatus::ALL
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
