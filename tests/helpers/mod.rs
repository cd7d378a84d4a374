//! Scripted detection service for driving the orchestrator without a network

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{oneshot, mpsc::UnboundedReceiver, Notify};
use tokio::time::Instant;

use cloud_label::models::job::{JobId, RemoteStatus};
use cloud_label::models::response::{
    BatchSubmitResponse, ResultResponse, StatusResponse, SubmitResponse,
};
use cloud_label::services::api::{ApiError, DetectionApi, ImageUpload, JobForm};
use cloud_label::LabelerEvent;

pub const DEFAULT_YOLO: &str = "0 0.5 0.5 0.2 0.3\n";

/// One request as the service saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Submit(String),
    SubmitBatch(Vec<String>),
    Status(JobId),
    Result(JobId),
}

/// In-memory `DetectionApi`.
///
/// Every job succeeds on its first status poll and returns [`DEFAULT_YOLO`]
/// unless a test scripts something else.
pub struct MockApi {
    next_id: AtomicI64,
    submit_failures: AtomicU32,
    result_failures: AtomicU32,
    batch_ids: Mutex<Option<Vec<JobId>>>,
    statuses: Mutex<HashMap<JobId, VecDeque<Result<StatusResponse, ApiError>>>>,
    results: Mutex<HashMap<JobId, ResultResponse>>,
    result_errors: Mutex<HashMap<JobId, ApiError>>,
    submit_gate: Mutex<Option<oneshot::Receiver<()>>>,
    calls: Mutex<Vec<(Instant, Call)>>,
    forms: Mutex<Vec<JobForm>>,
    pub submit_started: Notify,
    pub status_started: Notify,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            submit_failures: AtomicU32::new(0),
            result_failures: AtomicU32::new(0),
            batch_ids: Mutex::new(None),
            statuses: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            result_errors: Mutex::new(HashMap::new()),
            submit_gate: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            forms: Mutex::new(Vec::new()),
            submit_started: Notify::new(),
            status_started: Notify::new(),
        }
    }
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` submit requests (single or batch) fail with a transport error.
    pub fn fail_submits(&self, n: u32) {
        self.submit_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` result requests fail with a transport error.
    pub fn fail_results(&self, n: u32) {
        self.result_failures.store(n, Ordering::SeqCst);
    }

    /// Answer the next batch submit with exactly these ids.
    pub fn batch_ids(&self, ids: Vec<JobId>) {
        *self.batch_ids.lock().unwrap() = Some(ids);
    }

    /// Queue status answers for `job_id`. Once the script runs out the job succeeds.
    pub fn script_status(&self, job_id: JobId, answers: Vec<Result<StatusResponse, ApiError>>) {
        self.statuses
            .lock()
            .unwrap()
            .entry(job_id)
            .or_default()
            .extend(answers);
    }

    pub fn script_result(&self, job_id: JobId, result: ResultResponse) {
        self.results.lock().unwrap().insert(job_id, result);
    }

    /// Answer every result request for `job_id` with `error`.
    pub fn script_result_error(&self, job_id: JobId, error: ApiError) {
        self.result_errors.lock().unwrap().insert(job_id, error);
    }

    /// Hold the next submit until the returned sender fires (or is dropped).
    pub fn defer_submit(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.submit_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn forms(&self) -> Vec<JobForm> {
        self.forms.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn wait_gate(&self) {
        let gate = self.submit_gate.lock().unwrap().take();
        self.submit_started.notify_one();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
    }
}

pub fn status(status: RemoteStatus) -> Result<StatusResponse, ApiError> {
    Ok(StatusResponse {
        status,
        error_message: None,
    })
}

pub fn failed_status(message: &str) -> Result<StatusResponse, ApiError> {
    Ok(StatusResponse {
        status: RemoteStatus::Failed,
        error_message: Some(message.to_string()),
    })
}

#[async_trait]
impl DetectionApi for MockApi {
    async fn submit_job(&self, image: ImageUpload, form: &JobForm) -> Result<SubmitResponse, ApiError> {
        self.record(Call::Submit(image.file_name));
        self.forms.lock().unwrap().push(form.clone());
        self.wait_gate().await;

        if Self::take_failure(&self.submit_failures) {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        Ok(SubmitResponse {
            job_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn submit_batch(
        &self,
        images: Vec<ImageUpload>,
        form: &JobForm,
    ) -> Result<BatchSubmitResponse, ApiError> {
        let count = images.len() as i64;
        self.record(Call::SubmitBatch(images.into_iter().map(|i| i.file_name).collect()));
        self.forms.lock().unwrap().push(form.clone());
        self.wait_gate().await;

        if Self::take_failure(&self.submit_failures) {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        if let Some(job_ids) = self.batch_ids.lock().unwrap().take() {
            return Ok(BatchSubmitResponse { job_ids });
        }
        let first = self.next_id.fetch_add(count, Ordering::SeqCst);
        Ok(BatchSubmitResponse {
            job_ids: (first..first + count).collect(),
        })
    }

    async fn job_status(&self, job_id: JobId) -> Result<StatusResponse, ApiError> {
        self.record(Call::Status(job_id));
        self.status_started.notify_one();
        let scripted = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(&job_id)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| status(RemoteStatus::Succeeded))
    }

    async fn job_result(&self, job_id: JobId) -> Result<ResultResponse, ApiError> {
        self.record(Call::Result(job_id));
        if Self::take_failure(&self.result_failures) {
            return Err(ApiError::Transport("connection reset".to_string()));
        }
        if let Some(error) = self.result_errors.lock().unwrap().get(&job_id) {
            return Err(match error {
                ApiError::Transport(m) => ApiError::Transport(m.clone()),
                ApiError::Protocol(m) => ApiError::Protocol(m.clone()),
            });
        }
        let scripted = self.results.lock().unwrap().get(&job_id).cloned();
        Ok(scripted.unwrap_or_else(|| ResultResponse {
            yolo_txt: DEFAULT_YOLO.to_string(),
            compute_ms: 42,
            class_names: None,
        }))
    }
}

/// Everything emitted so far.
pub fn drain(rx: &mut UnboundedReceiver<LabelerEvent>) -> Vec<LabelerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn statuses(events: &[LabelerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            LabelerEvent::Status { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
