//! Generation job coordinator.
//!
//! Owns every outstanding generation task. A task is created only after the
//! request passed validation, authentication and (in prepaid mode) a
//! successful debit. Each accepted job gets its own polling loop, spawned on
//! the runtime, which resolves the task exactly once: success pushes the
//! result frame into the shared history, failure surfaces a message.
//!
//! ```text
//!  submit ──▶ debit ──▶ Pending ──submit_job──▶ Polling ──done──▶ Succeeded
//!                          │                       │
//!                          └──── rejected ─────────┴──failed──▶ Failed
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use editor_core::{EditFrame, FrameOrigin, SharedHistory};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{AuthGate, Balance, BackendError, JobBackend, JobRequest, JobState};
use crate::config::PollConfig;
use crate::metrics;
use crate::prefs::ResourceMode;

/// Message shown when a job fails without saying why.
pub const GENERIC_FAILURE_MESSAGE: &str = "Generation failed. Please try again.";

/// Capacity of the task event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why a generation request was refused before any task existed.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The prompt is empty or whitespace.
    #[error("Prompt is empty")]
    EmptyPrompt,
    /// No base image is loaded.
    #[error("No image loaded")]
    NoImage,
    /// The user dismissed the resource mode prompt.
    #[error("No resource mode selected")]
    ModeNotSelected,
    /// The user is not signed in. Login has been requested.
    #[error("Not signed in")]
    Unauthenticated,
    /// The balance cannot cover the cost.
    #[error(
        "Insufficient balance: need {cost}, have {}",
        .available.map_or_else(|| "unknown".to_string(), |b| b.to_string())
    )]
    LowBalance {
        /// Balance after the refused debit, if it could be read.
        available: Option<u64>,
        /// Cost of the request.
        cost: u64,
    },
    /// The coordinator was shut down.
    #[error("Session is shut down")]
    ShutDown,
    /// A collaborator failed while preparing the request.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl GenerateError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::EmptyPrompt | Self::NoImage | Self::ModeNotSelected => "validation",
            Self::Unauthenticated => "unauthenticated",
            Self::LowBalance { .. } => "low_balance",
            Self::ShutDown => "shutdown",
            Self::Backend(_) => "backend",
        }
    }
}

/// Unique identifier for a generation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Create a new unique task ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, waiting for the backend to accept it.
    Pending,
    /// Accepted; status is being polled.
    Polling,
    /// Finished with a result frame.
    Succeeded,
    /// Finished without a result.
    Failed,
}

impl TaskStatus {
    /// Whether the task has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTask {
    /// Task ID.
    pub id: TaskId,
    /// Prompt as submitted.
    pub prompt: String,
    /// Submission time, Unix milliseconds.
    pub submitted_at: u64,
    /// Current status.
    pub status: TaskStatus,
    /// Remote job ID once accepted.
    pub job_id: Option<String>,
}

/// How a task failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The backend refused the job.
    Rejected,
    /// A request to the backend did not complete.
    Transport,
    /// The job failed remotely.
    Remote,
}

impl FailureKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::Transport => "transport",
            Self::Remote => "remote",
        }
    }
}

/// Lifecycle notifications for tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task was created.
    Submitted {
        /// Task.
        task_id: TaskId,
        /// Prompt.
        prompt: String,
    },
    /// The backend accepted the job; polling started.
    Polling {
        /// Task.
        task_id: TaskId,
        /// Remote job ID.
        job_id: String,
    },
    /// The result frame was pushed to history.
    Succeeded {
        /// Task.
        task_id: TaskId,
        /// Frame pushed.
        frame: EditFrame,
    },
    /// The task failed.
    Failed {
        /// Task.
        task_id: TaskId,
        /// Failure class.
        kind: FailureKind,
        /// User-facing message.
        message: String,
    },
}

impl TaskEvent {
    /// Task this event is about.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        match self {
            Self::Submitted { task_id, .. }
            | Self::Polling { task_id, .. }
            | Self::Succeeded { task_id, .. }
            | Self::Failed { task_id, .. } => *task_id,
        }
    }
}

/// A request that passed admission, holding the credits debited for it.
#[derive(Debug)]
#[must_use = "dispatch or release the admission"]
pub struct Admission {
    mode: ResourceMode,
    debited: u64,
}

impl Admission {
    /// Resource mode the request was admitted under.
    #[must_use]
    pub const fn mode(&self) -> ResourceMode {
        self.mode
    }

    /// Credits taken at admission.
    #[must_use]
    pub const fn debited(&self) -> u64 {
        self.debited
    }
}

struct TaskEntry {
    task: GenerationTask,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    backend: Arc<dyn JobBackend>,
    balance: Arc<dyn Balance>,
    auth: Arc<dyn AuthGate>,
    history: SharedHistory,
    poll: PollConfig,
    tasks: RwLock<HashMap<TaskId, TaskEntry>>,
    events: broadcast::Sender<TaskEvent>,
    shut_down: AtomicBool,
}

/// Submits generation jobs and drives them to completion.
pub struct GenerationCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GenerationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationCoordinator")
            .field("active", &self.active_count())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl GenerationCoordinator {
    /// Create a coordinator that commits results into `history`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn JobBackend>,
        balance: Arc<dyn Balance>,
        auth: Arc<dyn AuthGate>,
        history: SharedHistory,
        poll: PollConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                backend,
                balance,
                auth,
                history,
                poll,
                tasks: RwLock::new(HashMap::new()),
                events,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to task events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Submit a generation job.
    ///
    /// In prepaid mode `cost` is debited once, before the job is sent. In
    /// own-credential mode nothing is debited. Returns the task ID once the
    /// task exists; a task that fails at submission is reported through a
    /// [`TaskEvent::Failed`] event.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerateError`] if the request is refused before a task is
    /// created. Nothing is debited in that case.
    pub async fn submit(
        &self,
        request: JobRequest,
        mode: ResourceMode,
        cost: u64,
    ) -> Result<TaskId, GenerateError> {
        let admission = self.admit(&request.prompt, mode, cost).await?;
        self.dispatch(admission, request).await
    }

    /// Check a request and take its credits, without creating a task.
    ///
    /// The returned [`Admission`] must be passed to
    /// [`dispatch`](Self::dispatch) or [`release`](Self::release).
    ///
    /// # Errors
    ///
    /// Returns a [`GenerateError`] if the request is refused. Nothing is
    /// debited in that case.
    pub async fn admit(
        &self,
        prompt: &str,
        mode: ResourceMode,
        cost: u64,
    ) -> Result<Admission, GenerateError> {
        let result = self.check_and_debit(prompt, mode, cost).await;
        if let Err(e) = &result {
            tracing::info!(reason = e.reason(), error = %e, "Generation request rejected");
            metrics::record_rejected(e.reason());
        }
        result
    }

    async fn check_and_debit(
        &self,
        prompt: &str,
        mode: ResourceMode,
        cost: u64,
    ) -> Result<Admission, GenerateError> {
        if self.is_shut_down() {
            return Err(GenerateError::ShutDown);
        }
        if prompt.trim().is_empty() {
            return Err(GenerateError::EmptyPrompt);
        }
        if !self.inner.auth.is_authenticated() {
            self.inner.auth.request_login();
            return Err(GenerateError::Unauthenticated);
        }
        let debited = match mode {
            ResourceMode::Prepaid => {
                if !self.inner.balance.debit(cost).await? {
                    let available = self.inner.balance.available().await.ok();
                    return Err(GenerateError::LowBalance { available, cost });
                }
                cost
            }
            ResourceMode::OwnCredential => 0,
        };
        Ok(Admission { mode, debited })
    }

    /// Give back the credits of an admission that will not be dispatched.
    pub async fn release(&self, admission: Admission) {
        if admission.debited == 0 {
            return;
        }
        match self.inner.balance.credit(admission.debited).await {
            Ok(()) => tracing::debug!(amount = admission.debited, "Released admission credits"),
            Err(e) => tracing::warn!(
                amount = admission.debited,
                error = %e,
                "Failed to release admission credits"
            ),
        }
    }

    /// Create the task for an admitted request and send it to the backend.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::ShutDown`] if the coordinator shut down after
    /// admission. The admission's credits are given back in that case.
    pub async fn dispatch(
        &self,
        admission: Admission,
        request: JobRequest,
    ) -> Result<TaskId, GenerateError> {
        let task = GenerationTask {
            id: TaskId::new(),
            prompt: request.prompt.clone(),
            submitted_at: current_timestamp_ms(),
            status: TaskStatus::Pending,
            job_id: None,
        };
        let task_id = task.id;

        let refused = {
            let mut tasks = self.inner.write_tasks();
            if self.is_shut_down() {
                true
            } else {
                tasks.insert(
                    task_id,
                    TaskEntry {
                        task,
                        shutdown_tx: None,
                        handle: None,
                    },
                );
                metrics::set_active_tasks(tasks.len());
                false
            }
        };
        if refused {
            self.release(admission).await;
            metrics::record_rejected(GenerateError::ShutDown.reason());
            return Err(GenerateError::ShutDown);
        }

        metrics::record_submitted();
        tracing::info!(task_id = %task_id, mode = %admission.mode, "Generation task created");
        self.inner.emit(TaskEvent::Submitted {
            task_id,
            prompt: request.prompt.clone(),
        });

        let job_id = match self.inner.backend.submit_job(&request).await {
            Ok(submission) if submission.success => match submission.job_id {
                Some(job_id) if !job_id.is_empty() => job_id,
                _ => {
                    self.inner.fail(
                        task_id,
                        FailureKind::Rejected,
                        "Job accepted without an ID".to_string(),
                    );
                    return Ok(task_id);
                }
            },
            Ok(_) => {
                self.inner.fail(
                    task_id,
                    FailureKind::Rejected,
                    GENERIC_FAILURE_MESSAGE.to_string(),
                );
                return Ok(task_id);
            }
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Job submission failed");
                let kind = if e.is_transport() {
                    FailureKind::Transport
                } else {
                    FailureKind::Rejected
                };
                self.inner.fail(task_id, kind, e.to_string());
                return Ok(task_id);
            }
        };

        self.start_polling(task_id, job_id);
        Ok(task_id)
    }

    fn start_polling(&self, task_id: TaskId, job_id: String) {
        let mut tasks = self.inner.write_tasks();
        let Some(entry) = tasks.get_mut(&task_id) else {
            return;
        };
        if self.is_shut_down() {
            return;
        }

        entry.task.status = TaskStatus::Polling;
        entry.task.job_id = Some(job_id.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(poll_job(
            Arc::clone(&self.inner),
            task_id,
            job_id.clone(),
            shutdown_rx,
        ));
        entry.shutdown_tx = Some(shutdown_tx);
        entry.handle = Some(handle);
        drop(tasks);

        tracing::debug!(task_id = %task_id, job_id = %job_id, "Polling started");
        self.inner.emit(TaskEvent::Polling { task_id, job_id });
    }

    /// Snapshot of unresolved tasks, oldest first.
    #[must_use]
    pub fn active_tasks(&self) -> Vec<GenerationTask> {
        let tasks = self
            .inner
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<GenerationTask> = tasks.values().map(|e| e.task.clone()).collect();
        active.sort_by_key(|t| t.submitted_at);
        active
    }

    /// Number of unresolved tasks.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether any task is unresolved.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active_count() > 0
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Stop every polling loop and drop all unresolved tasks.
    ///
    /// After this returns no task will push a frame, and new submissions are
    /// refused. Calling it again is a no-op.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<TaskEntry> = {
            let mut tasks = self.inner.write_tasks();
            let drained = tasks.drain().map(|(_, entry)| entry).collect();
            metrics::set_active_tasks(0);
            drained
        };
        tracing::info!(tasks = drained.len(), "Generation coordinator shutting down");

        for mut entry in drained {
            if let Some(tx) = entry.shutdown_tx.take() {
                let _ = tx.send(());
            }
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for GenerationCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn write_tasks(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TaskId, TaskEntry>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TaskEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Resolve a task with its result frame.
    fn succeed(&self, task_id: TaskId, url: String) {
        let frame = EditFrame::new(url, FrameOrigin::Generation);
        {
            let mut tasks = self.write_tasks();
            if tasks.remove(&task_id).is_none() {
                return;
            }
            // Pushed under the task lock so shutdown cannot interleave.
            self.history.push(frame.clone());
            metrics::set_active_tasks(tasks.len());
        }
        metrics::record_commit(FrameOrigin::Generation);
        metrics::record_completed("succeeded");
        tracing::info!(task_id = %task_id, frame_id = %frame.id, "Generation succeeded");
        self.emit(TaskEvent::Succeeded { task_id, frame });
    }

    /// Resolve a task as failed.
    fn fail(&self, task_id: TaskId, kind: FailureKind, message: String) {
        {
            let mut tasks = self.write_tasks();
            if tasks.remove(&task_id).is_none() {
                return;
            }
            metrics::set_active_tasks(tasks.len());
        }
        metrics::record_completed(kind.as_str());
        tracing::warn!(
            task_id = %task_id,
            kind = kind.as_str(),
            message = %message,
            "Generation failed"
        );
        self.emit(TaskEvent::Failed {
            task_id,
            kind,
            message,
        });
    }
}

/// Poll a job until it resolves or the coordinator shuts down.
async fn poll_job(
    inner: Arc<Inner>,
    task_id: TaskId,
    job_id: String,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut attempt: u32 = 0;
    loop {
        let delay = Duration::from_millis(inner.poll.delay_for_attempt(attempt));
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!(task_id = %task_id, "Poll loop received shutdown signal");
                return;
            }
            () = tokio::time::sleep(delay) => {}
        }
        attempt = attempt.saturating_add(1);
        metrics::record_poll();

        match inner.backend.job_status(&job_id).await {
            Ok(status) => match status.status {
                JobState::Done => {
                    let url = status
                        .result_image_urls
                        .into_iter()
                        .find(|u| !u.trim().is_empty());
                    match url {
                        Some(url) => inner.succeed(task_id, url),
                        None => inner.fail(
                            task_id,
                            FailureKind::Remote,
                            failure_message(status.message),
                        ),
                    }
                    return;
                }
                JobState::Failed => {
                    inner.fail(task_id, FailureKind::Remote, failure_message(status.message));
                    return;
                }
                JobState::Pending | JobState::Processing | JobState::Unknown => {
                    tracing::debug!(
                        task_id = %task_id,
                        attempt,
                        status = ?status.status,
                        "Job not finished"
                    );
                }
            },
            Err(e) => {
                inner.fail(task_id, FailureKind::Transport, e.to_string());
                return;
            }
        }
    }
}

/// The remote message, or the generic fallback when it is missing or blank.
fn failure_message(message: Option<String>) -> String {
    message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
}

/// Current Unix timestamp in milliseconds.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{JobStatus, JobSubmission, LocalBalance, StaticAuth};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Backend that answers polls from a script, then repeats `pending`.
    struct ScriptedBackend {
        accept: bool,
        statuses: Mutex<VecDeque<Result<JobStatus, BackendError>>>,
        submits: Mutex<u32>,
    }

    impl ScriptedBackend {
        fn new(accept: bool, statuses: Vec<Result<JobStatus, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                accept,
                statuses: Mutex::new(statuses.into()),
                submits: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl JobBackend for ScriptedBackend {
        async fn submit_job(&self, _request: &JobRequest) -> Result<JobSubmission, BackendError> {
            *self.submits.lock().expect("lock") += 1;
            Ok(JobSubmission {
                success: self.accept,
                job_id: self.accept.then(|| "job-1".to_string()),
            })
        }

        async fn job_status(&self, _job_id: &str) -> Result<JobStatus, BackendError> {
            self.statuses.lock().expect("lock").pop_front().unwrap_or(Ok(JobStatus {
                status: JobState::Pending,
                result_image_urls: Vec::new(),
                message: None,
            }))
        }
    }

    fn status(
        state: JobState,
        urls: &[&str],
        message: Option<&str>,
    ) -> Result<JobStatus, BackendError> {
        Ok(JobStatus {
            status: state,
            result_image_urls: urls.iter().map(ToString::to_string).collect(),
            message: message.map(ToString::to_string),
        })
    }

    fn request(prompt: &str) -> JobRequest {
        JobRequest {
            prompt: prompt.to_string(),
            reference_images: vec!["https://cdn.example/base.png".into()],
            model_id: "m".into(),
            aspect_ratio: "1:1".into(),
            credential: None,
        }
    }

    fn coordinator(
        backend: Arc<ScriptedBackend>,
        balance: Arc<LocalBalance>,
        history: SharedHistory,
    ) -> GenerationCoordinator {
        GenerationCoordinator::new(
            backend,
            balance,
            Arc::new(StaticAuth::signed_in()),
            history,
            PollConfig::fixed(1_000),
        )
    }

    async fn next_terminal(rx: &mut broadcast::Receiver<TaskEvent>) -> TaskEvent {
        loop {
            let event = rx.recv().await.expect("event");
            if matches!(event, TaskEvent::Succeeded { .. } | TaskEvent::Failed { .. }) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_pushes_first_result() {
        let backend = ScriptedBackend::new(
            true,
            vec![
                status(JobState::Processing, &[], None),
                status(
                    JobState::Done,
                    &["https://cdn.example/r1.png", "https://cdn.example/r2.png"],
                    None,
                ),
            ],
        );
        let balance = Arc::new(LocalBalance::new(500));
        let history = SharedHistory::default();
        let coordinator = coordinator(backend, Arc::clone(&balance), history.clone());
        let mut rx = coordinator.subscribe();

        coordinator
            .submit(request("a cat"), ResourceMode::Prepaid, 150)
            .await
            .expect("submit");
        assert!(coordinator.is_busy());
        assert_eq!(coordinator.active_tasks()[0].status, TaskStatus::Polling);

        let event = next_terminal(&mut rx).await;
        assert!(matches!(event, TaskEvent::Succeeded { .. }));
        assert_eq!(
            history.current().map(|f| f.uri),
            Some("https://cdn.example/r1.png".to_string())
        );
        assert!(!coordinator.is_busy());
        assert_eq!(balance.available().await.expect("balance"), 350);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_message_is_verbatim() {
        let backend = ScriptedBackend::new(
            true,
            vec![status(JobState::Failed, &[], Some("content policy"))],
        );
        let balance = Arc::new(LocalBalance::new(500));
        let coordinator = coordinator(backend, Arc::clone(&balance), SharedHistory::default());
        let mut rx = coordinator.subscribe();

        coordinator
            .submit(request("x"), ResourceMode::Prepaid, 150)
            .await
            .expect("submit");
        match next_terminal(&mut rx).await {
            TaskEvent::Failed { kind, message, .. } => {
                assert_eq!(kind, FailureKind::Remote);
                assert_eq!(message, "content policy");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        // No refund.
        assert_eq!(balance.available().await.expect("balance"), 350);
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_without_results_fails() {
        let backend = ScriptedBackend::new(true, vec![status(JobState::Done, &[], None)]);
        let history = SharedHistory::default();
        let coordinator = coordinator(backend, Arc::new(LocalBalance::new(500)), history.clone());
        let mut rx = coordinator.subscribe();

        coordinator
            .submit(request("x"), ResourceMode::Prepaid, 1)
            .await
            .expect("submit");
        match next_terminal(&mut rx).await {
            TaskEvent::Failed { kind, message, .. } => {
                assert_eq!(kind, FailureKind::Remote);
                assert_eq!(message, GENERIC_FAILURE_MESSAGE);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_transport_error_is_terminal() {
        let backend = ScriptedBackend::new(
            true,
            vec![Err(BackendError::Transport("connection reset".into()))],
        );
        let coordinator = coordinator(
            Arc::clone(&backend),
            Arc::new(LocalBalance::new(500)),
            SharedHistory::default(),
        );
        let mut rx = coordinator.subscribe();

        coordinator
            .submit(request("x"), ResourceMode::Prepaid, 1)
            .await
            .expect("submit");
        match next_terminal(&mut rx).await {
            TaskEvent::Failed { kind, .. } => assert_eq!(kind, FailureKind::Transport),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(backend.statuses.lock().expect("lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_fails_task_without_refund() {
        let backend = ScriptedBackend::new(false, Vec::new());
        let balance = Arc::new(LocalBalance::new(200));
        let coordinator = coordinator(backend, Arc::clone(&balance), SharedHistory::default());
        let mut rx = coordinator.subscribe();

        coordinator
            .submit(request("x"), ResourceMode::Prepaid, 150)
            .await
            .expect("task created");
        match next_terminal(&mut rx).await {
            TaskEvent::Failed { kind, .. } => assert_eq!(kind, FailureKind::Rejected),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(balance.available().await.expect("balance"), 50);
        assert!(!coordinator.is_busy());
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_without_debit() {
        let backend = ScriptedBackend::new(true, Vec::new());
        let balance = Arc::new(LocalBalance::new(200));
        let coordinator = coordinator(
            Arc::clone(&backend),
            Arc::clone(&balance),
            SharedHistory::default(),
        );

        let err = coordinator
            .submit(request("   "), ResourceMode::Prepaid, 150)
            .await
            .expect_err("rejected");
        assert!(matches!(err, GenerateError::EmptyPrompt));
        assert_eq!(balance.available().await.expect("balance"), 200);
        assert_eq!(*backend.submits.lock().expect("lock"), 0);
    }

    #[tokio::test]
    async fn test_own_credential_skips_debit() {
        let backend = ScriptedBackend::new(true, Vec::new());
        let balance = Arc::new(LocalBalance::new(0));
        let coordinator = coordinator(backend, Arc::clone(&balance), SharedHistory::default());

        coordinator
            .submit(request("x"), ResourceMode::OwnCredential, 150)
            .await
            .expect("submit");
        assert_eq!(balance.available().await.expect("balance"), 0);
        coordinator.shutdown();
    }

    #[tokio::test]
    async fn test_unauthenticated_is_rejected() {
        let coordinator = GenerationCoordinator::new(
            ScriptedBackend::new(true, Vec::new()),
            Arc::new(LocalBalance::new(500)),
            Arc::new(StaticAuth::signed_out()),
            SharedHistory::default(),
            PollConfig::default(),
        );
        let err = coordinator
            .submit(request("x"), ResourceMode::Prepaid, 150)
            .await
            .expect_err("rejected");
        assert!(matches!(err, GenerateError::Unauthenticated));
        assert!(!coordinator.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_new_work() {
        let coordinator = coordinator(
            ScriptedBackend::new(true, Vec::new()),
            Arc::new(LocalBalance::new(500)),
            SharedHistory::default(),
        );
        coordinator
            .submit(request("x"), ResourceMode::Prepaid, 1)
            .await
            .expect("submit");
        coordinator.shutdown();
        assert!(!coordinator.is_busy());

        let err = coordinator
            .submit(request("y"), ResourceMode::Prepaid, 1)
            .await
            .expect_err("rejected");
        assert!(matches!(err, GenerateError::ShutDown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_result_url_fails_task() {
        let backend = ScriptedBackend::new(
            true,
            vec![status(JobState::Done, &["", "   "], Some(""))],
        );
        let history = SharedHistory::default();
        let coordinator = coordinator(backend, Arc::new(LocalBalance::new(500)), history.clone());
        let mut rx = coordinator.subscribe();

        coordinator
            .submit(request("x"), ResourceMode::Prepaid, 1)
            .await
            .expect("submit");
        match next_terminal(&mut rx).await {
            TaskEvent::Failed { kind, message, .. } => {
                assert_eq!(kind, FailureKind::Remote);
                assert_eq!(message, GENERIC_FAILURE_MESSAGE);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_result_url_is_skipped() {
        let backend = ScriptedBackend::new(
            true,
            vec![status(JobState::Done, &["", "https://cdn.example/r.png"], None)],
        );
        let history = SharedHistory::default();
        let coordinator = coordinator(backend, Arc::new(LocalBalance::new(500)), history.clone());
        let mut rx = coordinator.subscribe();

        coordinator
            .submit(request("x"), ResourceMode::Prepaid, 1)
            .await
            .expect("submit");
        assert!(matches!(
            next_terminal(&mut rx).await,
            TaskEvent::Succeeded { .. }
        ));
        assert_eq!(
            history.current().map(|f| f.uri),
            Some("https://cdn.example/r.png".to_string())
        );
    }

    #[test]
    fn test_empty_done_message_uses_fallback() {
        assert_eq!(failure_message(Some(String::new())), GENERIC_FAILURE_MESSAGE);
        assert_eq!(failure_message(Some("  ".into())), GENERIC_FAILURE_MESSAGE);
        assert_eq!(failure_message(None), GENERIC_FAILURE_MESSAGE);
        assert_eq!(failure_message(Some("Blocked".into())), "Blocked");
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_returns_credits() {
        let backend = ScriptedBackend::new(true, Vec::new());
        let balance = Arc::new(LocalBalance::new(500));
        let coordinator = coordinator(
            Arc::clone(&backend),
            Arc::clone(&balance),
            SharedHistory::default(),
        );

        let admission = coordinator
            .admit("x", ResourceMode::Prepaid, 150)
            .await
            .expect("admit");
        assert_eq!(admission.debited(), 150);
        assert_eq!(balance.available().await.expect("balance"), 350);

        coordinator.shutdown();
        let err = coordinator
            .dispatch(admission, request("x"))
            .await
            .expect_err("refused");

        assert!(matches!(err, GenerateError::ShutDown));
        assert_eq!(balance.available().await.expect("balance"), 500);
        assert_eq!(*backend.submits.lock().expect("lock"), 0);
    }

    #[tokio::test]
    async fn test_release_returns_credits() {
        let balance = Arc::new(LocalBalance::new(500));
        let coordinator = coordinator(
            ScriptedBackend::new(true, Vec::new()),
            Arc::clone(&balance),
            SharedHistory::default(),
        );

        let admission = coordinator
            .admit("x", ResourceMode::Prepaid, 150)
            .await
            .expect("admit");
        coordinator.release(admission).await;
        assert_eq!(balance.available().await.expect("balance"), 500);

        let own = coordinator
            .admit("x", ResourceMode::OwnCredential, 150)
            .await
            .expect("admit");
        assert_eq!(own.debited(), 0);
        coordinator.release(own).await;
        assert_eq!(balance.available().await.expect("balance"), 500);
    }

    #[test]
    fn test_low_balance_message() {
        let err = GenerateError::LowBalance {
            available: Some(100),
            cost: 150,
        };
        assert_eq!(err.to_string(), "Insufficient balance: need 150, have 100");
        assert_eq!(err.reason(), "low_balance");
    }
}
