//! Top-level labeling flows.
//!
//! The [`Orchestrator`] owns the session, the cancellation authority and the
//! event channel, and drives the two flows: a queue of single-image jobs, and
//! a chunked batch. Every stage runs under the generation captured when the
//! run started; after [`Orchestrator::cancel`] a stage may still receive its
//! network response, but it can no longer touch the session or emit events.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info};

use crate::config::LabelerConfig;
use crate::error::LabelerError;
use crate::models::event::LabelerEvent;
use crate::services::api::{DetectionApi, JobForm};
use crate::services::cancellation::{CancellationAuthority, GenerationGuard};
use crate::services::chunker::BatchChunker;
use crate::services::events::EventSink;
use crate::services::fetcher::{LabelOutcome, ResultFetcher};
use crate::services::poller::JobPoller;
use crate::services::retry::RetryPolicy;
use crate::services::session::{RunContext, RunMode, RunSummary, Session, SessionStore};
use crate::services::submitter::JobSubmitter;

#[derive(Debug, Clone, Default)]
struct Settings {
    prompt: String,
    classes: Vec<String>,
}

pub struct Orchestrator {
    submitter: JobSubmitter,
    poller: JobPoller,
    fetcher: ResultFetcher,
    chunker: BatchChunker,
    authority: CancellationAuthority,
    session: SessionStore,
    events: EventSink,
    settings: RwLock<Settings>,
}

impl Orchestrator {
    /// Build an orchestrator and the receiver for its events.
    pub fn new(
        api: Arc<dyn DetectionApi>,
        config: &LabelerConfig,
    ) -> (Self, UnboundedReceiver<LabelerEvent>) {
        let retry = RetryPolicy::from_config(config);
        let submitter = JobSubmitter::new(api.clone(), retry);
        let poller = JobPoller::new(api.clone(), config);
        let fetcher = ResultFetcher::new(api, retry);
        let chunker = BatchChunker::new(
            submitter.clone(),
            poller.clone(),
            fetcher.clone(),
            config.batch_size,
        );
        let (events, rx) = EventSink::channel();

        let orchestrator = Self {
            submitter,
            poller,
            fetcher,
            chunker,
            authority: CancellationAuthority::new(),
            session: SessionStore::default(),
            events,
            settings: RwLock::new(Settings {
                prompt: config.prompt.clone(),
                classes: Vec::new(),
            }),
        };
        (orchestrator, rx)
    }

    /// Local class list, in label-file id order.
    pub fn set_classes(&self, classes: Vec<String>) {
        self.settings.write().unwrap_or_else(PoisonError::into_inner).classes = classes;
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.settings.write().unwrap_or_else(PoisonError::into_inner).prompt = prompt.into();
    }

    pub fn classes(&self) -> Vec<String> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).classes.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.session.snapshot().busy
    }

    pub fn session(&self) -> Session {
        self.session.snapshot()
    }

    pub fn generation(&self) -> u64 {
        self.authority.current()
    }

    /// Label one image.
    pub async fn label_image(
        &self,
        image_path: impl Into<PathBuf>,
    ) -> Result<RunSummary, LabelerError> {
        self.run(vec![image_path.into()], RunMode::Single).await
    }

    /// Label every image. One image goes through the single-image flow;
    /// more are submitted in chunks. An empty list is a no-op.
    pub async fn label_images(
        &self,
        image_paths: Vec<PathBuf>,
    ) -> Result<RunSummary, LabelerError> {
        match image_paths.len() {
            0 => Ok(RunSummary::default()),
            1 => self.run(image_paths, RunMode::Single).await,
            _ => self.run(image_paths, RunMode::Batch).await,
        }
    }

    /// Abort the current run. Takes effect before returning: timers stop,
    /// the session is cleared, and responses still in flight are discarded
    /// when they arrive.
    pub fn cancel(&self) {
        self.authority.cancel(|| {
            let was_busy = self.session.with(|s| std::mem::take(s).busy);
            if was_busy {
                self.events.send(LabelerEvent::BusyChanged(false));
            }
            self.events.send(LabelerEvent::Status {
                message: LabelerError::Cancelled.to_string(),
                ttl_ms: 3000,
            });
        });
        info!(generation = self.authority.current(), "Cloud auto-label cancelled");
    }

    async fn run(
        &self,
        image_paths: Vec<PathBuf>,
        mode: RunMode,
    ) -> Result<RunSummary, LabelerError> {
        let guard = self.begin(&image_paths, mode)?;
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner).clone();
        let ctx = RunContext {
            guard,
            events: &self.events,
            session: &self.session,
            form: JobForm::new(&settings.prompt, &settings.classes),
            classes: settings.classes,
        };

        info!(
            images = image_paths.len(),
            ?mode,
            generation = ctx.guard.generation(),
            "Cloud auto-label started"
        );
        let outcome = match mode {
            RunMode::Single => self.run_queue(&ctx).await,
            RunMode::Batch => self.chunker.run(&image_paths, &ctx).await,
        };

        match outcome {
            Ok(summary) => self.finish(&ctx.guard, mode, summary),
            Err(LabelerError::Cancelled) => {
                debug!(generation = ctx.guard.generation(), "Run discarded after cancel");
                Err(LabelerError::Cancelled)
            }
            Err(e) => {
                self.fail(&ctx.guard, &e);
                Err(e)
            }
        }
    }

    fn begin(
        &self,
        image_paths: &[PathBuf],
        mode: RunMode,
    ) -> Result<GenerationGuard, LabelerError> {
        let guard = self.authority.capture();
        self.session
            .update(&guard, |s| {
                if s.busy {
                    return Err(LabelerError::Busy);
                }
                *s = Session {
                    busy: true,
                    mode: Some(mode),
                    queue: match mode {
                        RunMode::Single => image_paths.iter().cloned().collect(),
                        RunMode::Batch => Default::default(),
                    },
                    total: image_paths.len(),
                    ..Session::default()
                };
                Ok(())
            })
            .unwrap_or(Err(LabelerError::Cancelled))?;

        self.events.emit(&guard, LabelerEvent::BusyChanged(true));
        Ok(guard)
    }

    /// Single-image flow: submit, poll and fetch each queued image in turn.
    async fn run_queue(&self, ctx: &RunContext<'_>) -> Result<RunSummary, LabelerError> {
        let guard = &ctx.guard;
        let mut summary = RunSummary {
            total: self.session.snapshot().total,
            ..RunSummary::default()
        };

        loop {
            let next = self
                .session
                .update(guard, |s| {
                    let next = s.queue.pop_front();
                    (next, s.total - s.queue.len())
                })
                .ok_or(LabelerError::Cancelled)?;
            let (image_path, position) = match next {
                (Some(path), position) => (path, position),
                (None, _) => break,
            };

            self.events.emit(
                guard,
                LabelerEvent::Progress {
                    done: position - 1,
                    total: summary.total,
                },
            );

            let mut job = self
                .submitter
                .submit_single(&image_path, &ctx.form, guard, ctx.events)
                .await?;
            self.session
                .update(guard, |s| s.jobs = vec![job.clone()])
                .ok_or(LabelerError::Cancelled)?;

            self.poller.poll_single(&mut job, guard).await?;

            match self.fetcher.fetch_single(&job, &ctx.classes, guard, ctx.events).await? {
                LabelOutcome::Written {
                    detections,
                    compute_ms,
                    ..
                } => {
                    summary.done += 1;
                    ctx.events.status(
                        guard,
                        format!("Cloud auto-label: {detections} detection(s) in {compute_ms} ms"),
                        4000,
                    );
                }
                LabelOutcome::WriteFailed(e) => {
                    summary.failed += 1;
                    ctx.events.status(guard, e.to_string(), 5000);
                }
            }

            self.session
                .update(guard, |s| {
                    s.jobs.clear();
                    s.done = summary.done;
                    s.failed = summary.failed;
                })
                .ok_or(LabelerError::Cancelled)?;
        }

        Ok(summary)
    }

    fn finish(
        &self,
        guard: &GenerationGuard,
        mode: RunMode,
        summary: RunSummary,
    ) -> Result<RunSummary, LabelerError> {
        guard
            .if_current(|| {
                let finished_total = match mode {
                    RunMode::Single => summary.total,
                    RunMode::Batch => summary.done,
                };
                self.events.send(LabelerEvent::Finished { total: finished_total });
                if mode == RunMode::Batch {
                    let (message, ttl_ms) = if summary.failed > 0 {
                        (
                            format!(
                                "Cloud auto-label: {} done, {} failed.",
                                summary.done, summary.failed
                            ),
                            6000,
                        )
                    } else {
                        (format!("Cloud auto-label: {} images done.", summary.done), 5000)
                    };
                    self.events.send(LabelerEvent::Status { message, ttl_ms });
                }
                self.session.with(|s| *s = Session::default());
                self.events.send(LabelerEvent::BusyChanged(false));
            })
            .ok_or(LabelerError::Cancelled)?;

        info!(
            total = summary.total,
            done = summary.done,
            failed = summary.failed,
            "Cloud auto-label finished"
        );
        Ok(summary)
    }

    fn fail(&self, guard: &GenerationGuard, e: &LabelerError) {
        guard.if_current(|| {
            error!(error = %e, "Cloud auto-label aborted");
            self.session.with(|s| *s = Session::default());
            self.events.send(LabelerEvent::BusyChanged(false));
            self.events.send(LabelerEvent::Error { message: e.to_string() });
        });
    }
}
