//! Alignment job lifecycle (application-level orchestration).
//!
//! ## Create
//!
//! ```text
//! CreateAlignJob + input file id
//!   ↓
//! 1. Resolve the input file record (missing → InvalidRequest, nothing submitted)
//!   ↓
//! 2. Submit to the engine: RetryPolicy inside an overall timeout
//!   ↓
//! 3. Persist the job with the engine's task id and initial status
//!   ↓
//! 4. Publish the JobEvent
//! ```
//!
//! ## Update (engine completion callback)
//!
//! ```text
//! CompletionUpdate
//!   ↓
//! 1. SUCCESS with a non-empty output name → register the output file record
//!   ↓
//! 2. Load the job by task id (missing → JobNotFound)
//!   ↓
//! 3. Apply the status change (state machine checked)
//!   ↓
//! 4. Persist, then publish the persisted state
//! ```
//!
//! Publication always follows a successful write, so for one task the event
//! sequence matches the write sequence. Any failure before the write leaves
//! nothing persisted and nothing published. Publishing itself never fails from
//! the orchestrator's point of view.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use seqalign_core::{
    AlignJobStatus, AlignTool, CompletionUpdate, DomainError, FileRecordId, NewAlignJob, TaskId,
    UserId,
};
use seqalign_events::{EventBus, JobEvent};

use crate::retry::RetryPolicy;
use crate::store::{AlignJobStore, FileRecordStore, StoreError};
use crate::submission::{SubmissionClient, SubmissionError, SubmitRequest, SubmitResponse};

pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SUBMIT_ATTEMPTS: u32 = 3;
pub const DEFAULT_SUBMIT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Caller-supplied part of a new job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAlignJob {
    pub user_id: UserId,
    pub align_tool: AlignTool,
    #[serde(default)]
    pub options: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("engine rejected submission: HTTP {status}: {body}")]
    RemoteRejected { status: u16, body: String },

    #[error("engine unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("no job for task id: {0}")]
    JobNotFound(TaskId),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: AlignJobStatus,
        to: AlignJobStatus,
    },

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl LifecycleError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::InvalidRequest(_) => "invalid_request",
            LifecycleError::RemoteRejected { .. } => "remote_rejected",
            LifecycleError::RemoteUnavailable(_) => "remote_unavailable",
            LifecycleError::JobNotFound(_) => "job_not_found",
            LifecycleError::InvalidTransition { .. } => "invalid_transition",
            LifecycleError::StorageFailure(_) => "storage_failure",
        }
    }
}

impl From<SubmissionError> for LifecycleError {
    fn from(value: SubmissionError) -> Self {
        match value {
            SubmissionError::InvalidRequest(msg) => LifecycleError::InvalidRequest(msg),
            SubmissionError::RemoteRejected { status, body } => {
                LifecycleError::RemoteRejected { status, body }
            }
            SubmissionError::RemoteUnavailable(msg) => LifecycleError::RemoteUnavailable(msg),
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        LifecycleError::StorageFailure(value.to_string())
    }
}

impl From<DomainError> for LifecycleError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidTransition { from, to } => {
                LifecycleError::InvalidTransition { from, to }
            }
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                LifecycleError::InvalidRequest(msg)
            }
        }
    }
}

/// Owns the job state machine and ties together the engine, the stores and
/// the event bus.
///
/// ## Generic Parameters
///
/// - `J`: job store
/// - `F`: file-record store
/// - `C`: engine submission client
/// - `B`: event bus carrying `JobEvent`s
pub struct AlignJobOrchestrator<J, F, C, B> {
    jobs: J,
    files: F,
    client: C,
    bus: B,
    retry: RetryPolicy<SubmissionError>,
    submit_timeout: Duration,
}

impl<J, F, C, B> AlignJobOrchestrator<J, F, C, B> {
    pub fn new(jobs: J, files: F, client: C, bus: B) -> Self {
        Self {
            jobs,
            files,
            client,
            bus,
            retry: RetryPolicy::exponential(DEFAULT_SUBMIT_ATTEMPTS, DEFAULT_SUBMIT_BASE_DELAY)
                .retry_if(SubmissionError::is_retryable),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy<SubmissionError>) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }
}

impl<J, F, C, B> AlignJobOrchestrator<J, F, C, B>
where
    J: AlignJobStore,
    F: FileRecordStore,
    C: SubmissionClient,
    B: EventBus<JobEvent>,
{
    /// Submit a new job for the input file `input_file_id` and record it.
    pub async fn create(
        &self,
        input_file_id: FileRecordId,
        request: CreateAlignJob,
    ) -> Result<JobEvent, LifecycleError> {
        let input = self.files.find_by_id(input_file_id).await?.ok_or_else(|| {
            LifecycleError::InvalidRequest(format!("input file not found: {input_file_id}"))
        })?;

        let submit = SubmitRequest {
            align_tool: request.align_tool,
            options: request.options.clone(),
            input_path: input.unique_filename.clone(),
        };
        let accepted = self.submit(&submit).await?;

        let job = self
            .jobs
            .insert(NewAlignJob {
                user_id: request.user_id,
                align_tool: request.align_tool,
                options: request.options,
                input_file_record_id: input.id,
                input_file_path: input.filename,
                task_id: accepted.task_id,
                status: accepted.status,
            })
            .await
            .inspect_err(|e| error!(error = %e, "failed to persist accepted job"))?;
        debug!(job_id = %job.id, task_id = %job.task_id, "job persisted");

        Ok(self.publish(JobEvent::from(&job)))
    }

    /// Apply an engine completion callback.
    pub async fn update(&self, update: CompletionUpdate) -> Result<JobEvent, LifecycleError> {
        if update.task_id.is_blank() {
            return Err(LifecycleError::InvalidRequest("task id must not be empty".into()));
        }

        let output_file_record_id = match update.output_artifact() {
            Some(name) if update.carries_output() => {
                let record = self.files.register_output(name).await?;
                debug!(task_id = %update.task_id, file_record_id = %record.id, "output file registered");
                Some(record.id)
            }
            _ => None,
        };

        let mut job = self
            .jobs
            .find_by_task_id(&update.task_id)
            .await?
            .ok_or_else(|| LifecycleError::JobNotFound(update.task_id.clone()))?;

        job.apply_completion(update.status, update.error, output_file_record_id, Utc::now())
            .inspect_err(|e| warn!(task_id = %update.task_id, error = %e, "completion rejected"))?;

        let saved = self.jobs.save(&job).await?;
        debug!(job_id = %saved.id, task_id = %saved.task_id, status = %saved.status, "job updated");

        Ok(self.publish(JobEvent::from(&saved)))
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, LifecycleError> {
        let attempts = self.retry.run(|attempt| {
            debug!(attempt, align_tool = %request.align_tool, "submission attempt");
            self.client.submit(request)
        });

        match tokio::time::timeout(self.submit_timeout, attempts).await {
            Ok(Ok(accepted)) => Ok(accepted),
            Ok(Err(err)) => {
                error!(error = %err, "submission failed");
                Err(err.into())
            }
            Err(_) => {
                error!(timeout_secs = self.submit_timeout.as_secs(), "submission timed out");
                Err(LifecycleError::RemoteUnavailable(format!(
                    "submission timed out after {}s",
                    self.submit_timeout.as_secs()
                )))
            }
        }
    }

    fn publish(&self, event: JobEvent) -> JobEvent {
        let report = self.bus.publish(event.clone());
        info!(
            task_id = %event.task_id,
            status = %event.status,
            delivered = report.delivered,
            dropped = report.dropped,
            "job event published"
        );
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use seqalign_core::{AlignJob, FileRecord, NewFileRecord, PageRequest, SortSpec};
    use seqalign_events::{BroadcastEventBus, Subscription};

    use crate::store::{InMemoryAlignJobStore, InMemoryFileRecordStore};

    /// Replays canned replies in order; the last reply repeats.
    struct ScriptedClient {
        replies: Mutex<VecDeque<Result<SubmitResponse, SubmissionError>>>,
        calls: AtomicU32,
        seen: Mutex<Vec<SubmitRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<SubmitResponse, SubmissionError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl SubmissionClient for ScriptedClient {
        async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, SubmissionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                replies.front().cloned().unwrap()
            }
        }
    }

    struct StalledClient;

    #[async_trait::async_trait]
    impl SubmissionClient for StalledClient {
        async fn submit(&self, _: &SubmitRequest) -> Result<SubmitResponse, SubmissionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(SubmissionError::RemoteUnavailable("never".into()))
        }
    }

    /// Job store whose writes always fail.
    struct BrokenJobStore;

    #[async_trait::async_trait]
    impl AlignJobStore for BrokenJobStore {
        async fn insert(&self, _: NewAlignJob) -> Result<AlignJob, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }
        async fn save(&self, _: &AlignJob) -> Result<AlignJob, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }
        async fn find_by_task_id(&self, _: &TaskId) -> Result<Option<AlignJob>, StoreError> {
            Ok(None)
        }
        async fn find_page(&self, _: PageRequest, _: &SortSpec) -> Result<Vec<AlignJob>, StoreError> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    fn accepted(task: &str) -> Result<SubmitResponse, SubmissionError> {
        Ok(SubmitResponse {
            status: AlignJobStatus::Pending,
            task_id: TaskId::new(task),
        })
    }

    fn unavailable() -> Result<SubmitResponse, SubmissionError> {
        Err(SubmissionError::RemoteUnavailable("HTTP 503: busy".into()))
    }

    fn create_request() -> CreateAlignJob {
        CreateAlignJob {
            user_id: UserId::new(7),
            align_tool: AlignTool::Mafft,
            options: "--auto".into(),
        }
    }

    fn completion(task: &str, status: AlignJobStatus, output: Option<&str>) -> CompletionUpdate {
        CompletionUpdate {
            task_id: TaskId::new(task),
            status,
            output_file: output.map(str::to_string),
            error: None,
        }
    }

    struct Harness<C> {
        orchestrator: AlignJobOrchestrator<
            Arc<InMemoryAlignJobStore>,
            Arc<InMemoryFileRecordStore>,
            C,
            Arc<BroadcastEventBus<JobEvent>>,
        >,
        jobs: Arc<InMemoryAlignJobStore>,
        files: Arc<InMemoryFileRecordStore>,
        events: Subscription<JobEvent>,
        input: FileRecord,
    }

    async fn harness<C: SubmissionClient>(client: C) -> Harness<C> {
        let jobs = InMemoryAlignJobStore::arc();
        let files = InMemoryFileRecordStore::arc();
        let bus = Arc::new(BroadcastEventBus::new(16));
        let events = bus.subscribe();
        let input = files
            .insert(NewFileRecord::input("reads.fasta", "0b1f-reads.fasta", 2048, Utc::now()))
            .await
            .unwrap();

        Harness {
            orchestrator: AlignJobOrchestrator::new(jobs.clone(), files.clone(), client, bus),
            jobs,
            files,
            events,
            input,
        }
    }

    fn drain(events: &mut Subscription<JobEvent>) -> Vec<JobEvent> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    #[tokio::test]
    async fn create_persists_one_job_and_publishes_one_event() {
        let client = ScriptedClient::new(vec![accepted("task-1")]);
        let mut h = harness(client.clone()).await;

        let event = h.orchestrator.create(h.input.id, create_request()).await.unwrap();

        assert_eq!(event.task_id, TaskId::new("task-1"));
        assert_eq!(event.status, AlignJobStatus::Pending);
        assert_eq!(event.input_path.as_deref(), Some("reads.fasta"));
        assert_eq!(client.seen.lock().unwrap()[0].input_path, "0b1f-reads.fasta");

        let stored = h.jobs.find_by_task_id(&TaskId::new("task-1")).await.unwrap().unwrap();
        assert_eq!(stored.input_file_record_id, h.input.id);
        assert_eq!(h.jobs.count().await.unwrap(), 1);
        assert_eq!(drain(&mut h.events), vec![event]);
    }

    #[tokio::test]
    async fn missing_input_file_is_rejected_before_submission() {
        let client = ScriptedClient::new(vec![accepted("task-1")]);
        let mut h = harness(client.clone()).await;

        let err = h
            .orchestrator
            .create(FileRecordId::new(999), create_request())
            .await
            .unwrap_err();

        assert_eq!(err, LifecycleError::InvalidRequest("input file not found: 999".into()));
        assert_eq!(client.calls(), 0);
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let client = ScriptedClient::new(vec![unavailable(), unavailable(), accepted("task-3")]);
        let mut h = harness(client.clone()).await;

        let event = h.orchestrator.create(h.input.id, create_request()).await.unwrap();

        assert_eq!(client.calls(), 3);
        assert_eq!(event.task_id, TaskId::new("task-3"));
        assert_eq!(drain(&mut h.events).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_leave_nothing_behind() {
        let client = ScriptedClient::new(vec![unavailable()]);
        let mut h = harness(client.clone()).await;

        let err = h.orchestrator.create(h.input.id, create_request()).await.unwrap_err();

        assert_eq!(err.kind(), "remote_unavailable");
        assert_eq!(client.calls(), 3);
        assert_eq!(h.jobs.count().await.unwrap(), 0);
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_submission_is_not_retried() {
        let client = ScriptedClient::new(vec![Err(SubmissionError::RemoteRejected {
            status: 400,
            body: "bad options".into(),
        })]);
        let mut h = harness(client.clone()).await;

        let err = h.orchestrator.create(h.input.id, create_request()).await.unwrap_err();

        assert_eq!(
            err,
            LifecycleError::RemoteRejected {
                status: 400,
                body: "bad options".into()
            }
        );
        assert_eq!(client.calls(), 1);
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_engine_times_out() {
        let mut h = harness(StalledClient).await;

        let err = h.orchestrator.create(h.input.id, create_request()).await.unwrap_err();

        assert_eq!(
            err,
            LifecycleError::RemoteUnavailable("submission timed out after 30s".into())
        );
        assert_eq!(h.jobs.count().await.unwrap(), 0);
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn storage_failure_on_create_publishes_nothing() {
        let files = InMemoryFileRecordStore::arc();
        let input = files
            .insert(NewFileRecord::input("a.fasta", "u-a.fasta", 1, Utc::now()))
            .await
            .unwrap();
        let bus = Arc::new(BroadcastEventBus::new(4));
        let mut events = bus.subscribe();
        let orchestrator = AlignJobOrchestrator::new(
            BrokenJobStore,
            files,
            ScriptedClient::new(vec![accepted("task-1")]),
            bus,
        );

        let err = orchestrator.create(input.id, create_request()).await.unwrap_err();

        assert_eq!(err.kind(), "storage_failure");
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn unknown_task_is_job_not_found() {
        let mut h = harness(ScriptedClient::new(vec![accepted("task-1")])).await;

        let err = h
            .orchestrator
            .update(completion("ghost", AlignJobStatus::Error, None))
            .await
            .unwrap_err();

        assert_eq!(err, LifecycleError::JobNotFound(TaskId::new("ghost")));
        assert!(drain(&mut h.events).is_empty());
    }

    #[tokio::test]
    async fn success_without_output_creates_no_file_record() {
        let mut h = harness(ScriptedClient::new(vec![accepted("task-1")])).await;
        h.orchestrator.create(h.input.id, create_request()).await.unwrap();
        drain(&mut h.events);
        let files_before = h.files.len();

        let event = h
            .orchestrator
            .update(completion("task-1", AlignJobStatus::Success, Some("")))
            .await
            .unwrap();

        assert_eq!(event.status, AlignJobStatus::Success);
        assert_eq!(event.output_file_record_id, None);
        assert_eq!(h.files.len(), files_before);
        assert_eq!(drain(&mut h.events), vec![event]);
    }

    #[tokio::test]
    async fn success_with_output_registers_exactly_one_record() {
        let mut h = harness(ScriptedClient::new(vec![accepted("task-1")])).await;
        h.orchestrator.create(h.input.id, create_request()).await.unwrap();
        drain(&mut h.events);
        let files_before = h.files.len();

        let event = h
            .orchestrator
            .update(completion("task-1", AlignJobStatus::Success, Some("r.out")))
            .await
            .unwrap();

        assert_eq!(h.files.len(), files_before + 1);
        let output_id = event.output_file_record_id.unwrap();
        let record = h.files.find_by_id(output_id).await.unwrap().unwrap();
        assert_eq!(record.filename, "r.out");

        let stored = h.jobs.find_by_task_id(&TaskId::new("task-1")).await.unwrap().unwrap();
        assert_eq!(stored.output_file_record_id, Some(output_id));
        assert_eq!(drain(&mut h.events), vec![event]);
    }

    #[tokio::test]
    async fn error_completion_carries_message_and_ignores_output() {
        let mut h = harness(ScriptedClient::new(vec![accepted("task-1")])).await;
        h.orchestrator.create(h.input.id, create_request()).await.unwrap();
        let files_before = h.files.len();

        let mut update = completion("task-1", AlignJobStatus::Error, Some("partial.out"));
        update.error = Some("mafft exited with 1".into());
        let event = h.orchestrator.update(update).await.unwrap();

        assert_eq!(event.status, AlignJobStatus::Error);
        assert_eq!(event.message.as_deref(), Some("mafft exited with 1"));
        assert_eq!(event.output_file_record_id, None);
        assert_eq!(h.files.len(), files_before);
    }

    #[tokio::test]
    async fn events_for_one_task_follow_write_order() {
        let mut h = harness(ScriptedClient::new(vec![accepted("task-1")])).await;
        h.orchestrator.create(h.input.id, create_request()).await.unwrap();
        h.orchestrator
            .update(completion("task-1", AlignJobStatus::Running, None))
            .await
            .unwrap();
        h.orchestrator
            .update(completion("task-1", AlignJobStatus::Success, None))
            .await
            .unwrap();

        let statuses: Vec<_> = drain(&mut h.events).into_iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![AlignJobStatus::Pending, AlignJobStatus::Running, AlignJobStatus::Success]
        );
    }

    #[tokio::test]
    async fn terminal_job_rejects_further_updates() {
        let mut h = harness(ScriptedClient::new(vec![accepted("task-1")])).await;
        h.orchestrator.create(h.input.id, create_request()).await.unwrap();
        h.orchestrator
            .update(completion("task-1", AlignJobStatus::Error, None))
            .await
            .unwrap();
        drain(&mut h.events);
        let before = h.jobs.find_by_task_id(&TaskId::new("task-1")).await.unwrap();

        let err = h
            .orchestrator
            .update(completion("task-1", AlignJobStatus::Running, None))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_transition");
        assert_eq!(h.jobs.find_by_task_id(&TaskId::new("task-1")).await.unwrap(), before);
        assert!(drain(&mut h.events).is_empty());
    }
}
