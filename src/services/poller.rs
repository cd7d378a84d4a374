use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::LabelerConfig;
use crate::error::LabelerError;
use crate::models::job::{Job, JobId, JobStatus, RemoteStatus};
use crate::models::response::StatusResponse;
use crate::services::api::{ApiError, DetectionApi};
use crate::services::cancellation::GenerationGuard;

/// Terminal counts for one polled chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPollSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Polls job status on a fixed tick until every job is terminal or the
/// tick budget runs out.
///
/// A tick never overlaps the previous one: the loop awaits every request it
/// issued before it looks at the ticker again, and ticks that elapse in the
/// meantime are skipped rather than queued. Skipped ticks do not count
/// towards `max_polls`.
#[derive(Clone)]
pub struct JobPoller {
    api: Arc<dyn DetectionApi>,
    interval: Duration,
    max_polls: u32,
    max_concurrent: usize,
}

impl JobPoller {
    pub fn new(api: Arc<dyn DetectionApi>, config: &LabelerConfig) -> Self {
        Self {
            api,
            interval: config.poll_interval(),
            max_polls: config.max_polls,
            max_concurrent: config.max_concurrent_polls.max(1),
        }
    }

    fn ticker(&self) -> Interval {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    }

    /// Poll a single job until it succeeds.
    ///
    /// `failed` on the server is fatal and carries the server's message.
    /// Queued, running, unknown and undecodable answers all mean "ask again".
    pub async fn poll_single(
        &self,
        job: &mut Job,
        guard: &GenerationGuard,
    ) -> Result<(), LabelerError> {
        let mut ticker = self.ticker();
        let mut polls = 0u32;

        loop {
            tokio::select! {
                _ = guard.cancelled() => return Err(LabelerError::Cancelled),
                _ = ticker.tick() => {}
            }

            polls += 1;
            if polls > self.max_polls {
                warn!(job_id = job.id, polls = self.max_polls, "Job timed out");
                return Err(LabelerError::Timeout("Job timed out. Please try again.".to_string()));
            }

            let response = self.api.job_status(job.id).await;
            if !guard.is_current() {
                return Err(LabelerError::Cancelled);
            }

            let server_message = server_error(&response);
            match classify(response) {
                JobStatus::Succeeded => {
                    job.status = JobStatus::Succeeded;
                    debug!(job_id = job.id, polls, "Job succeeded");
                    return Ok(());
                }
                JobStatus::Failed => {
                    let message = server_message.unwrap_or_default();
                    warn!(job_id = job.id, error = %message, "Job failed on server");
                    job.status = JobStatus::Failed;
                    job.error = Some(message.clone());
                    return Err(LabelerError::JobFailed(message));
                }
                JobStatus::Pending => {}
            }
        }
    }

    /// Poll every job of a chunk, at most `max_concurrent_polls` per tick.
    ///
    /// Pending jobs are visited round-robin so a slow head of the list cannot
    /// starve the rest. Fails with `AllJobsFailed` when no job succeeded.
    pub async fn poll_batch(
        &self,
        jobs: &mut [Job],
        guard: &GenerationGuard,
    ) -> Result<BatchPollSummary, LabelerError> {
        let mut ticker = self.ticker();
        let mut polls = 0u32;
        let mut cursor = 0usize;

        while jobs.iter().any(|j| !j.status.is_terminal()) {
            tokio::select! {
                _ = guard.cancelled() => return Err(LabelerError::Cancelled),
                _ = ticker.tick() => {}
            }

            polls += 1;
            if polls > self.max_polls {
                let pending = jobs.iter().filter(|j| !j.status.is_terminal()).count();
                warn!(pending, total = jobs.len(), "Batch jobs timed out");
                return Err(LabelerError::Timeout(format!(
                    "Batch jobs timed out: {pending}/{} jobs still pending.",
                    jobs.len()
                )));
            }

            let window = next_window(jobs, &mut cursor, self.max_concurrent);
            debug!(tick = polls, requests = window.len(), "Polling batch jobs");

            let api = &self.api;
            let requests = window.iter().map(move |&(idx, job_id)| async move {
                (idx, api.job_status(job_id).await)
            });
            let responses = join_all(requests).await;

            // Stale fan-in: every request has resolved, drop what they said.
            if !guard.is_current() {
                return Err(LabelerError::Cancelled);
            }

            for (idx, response) in responses {
                let job = &mut jobs[idx];
                job.error = server_error(&response);
                job.status = classify(response);
                if job.status == JobStatus::Failed {
                    warn!(job_id = job.id, error = ?job.error, "Batch job failed on server");
                }
            }
        }

        let succeeded = jobs.iter().filter(|j| j.status == JobStatus::Succeeded).count();
        let failed = jobs.len() - succeeded;
        info!(succeeded, failed, polls, "Batch chunk reached terminal state");

        if succeeded == 0 && !jobs.is_empty() {
            return Err(LabelerError::AllJobsFailed);
        }
        Ok(BatchPollSummary { succeeded, failed })
    }
}

/// Map one status answer onto the local job state. Anything that is not a
/// clear `succeeded` or `failed` leaves the job pending.
fn classify(response: Result<StatusResponse, ApiError>) -> JobStatus {
    match response {
        Ok(StatusResponse {
            status: RemoteStatus::Succeeded,
            ..
        }) => JobStatus::Succeeded,
        Ok(StatusResponse {
            status: RemoteStatus::Failed,
            ..
        }) => JobStatus::Failed,
        Ok(StatusResponse { status, .. }) => {
            debug!(%status, "Job not finished yet");
            JobStatus::Pending
        }
        Err(e) => {
            debug!(error = %e, "Ignoring unusable status response");
            JobStatus::Pending
        }
    }
}

fn server_error(response: &Result<StatusResponse, ApiError>) -> Option<String> {
    response.as_ref().ok().and_then(|r| r.error_message.clone())
}

/// Pick up to `limit` pending jobs, starting at `cursor` and wrapping around.
/// Advances `cursor` past the last job picked.
pub fn next_window(jobs: &[Job], cursor: &mut usize, limit: usize) -> Vec<(usize, JobId)> {
    let len = jobs.len();
    let mut window = Vec::with_capacity(limit.min(len));
    if len == 0 {
        return window;
    }

    for step in 0..len {
        if window.len() == limit {
            break;
        }
        let idx = (*cursor + step) % len;
        if !jobs[idx].status.is_terminal() {
            window.push((idx, jobs[idx].id));
        }
    }

    if let Some(&(last, _)) = window.last() {
        *cursor = (last + 1) % len;
    }
    window
}
