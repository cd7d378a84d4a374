use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::job::Job;
use crate::services::api::JobForm;
use crate::services::cancellation::GenerationGuard;
use crate::services::events::EventSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Single,
    Batch,
}

/// Bookkeeping for one orchestrator run. Cleared on completion, fatal
/// error and cancel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub busy: bool,
    pub mode: Option<RunMode>,
    /// Images not yet submitted (single mode).
    pub queue: VecDeque<PathBuf>,
    /// Jobs of the image or chunk currently in flight.
    pub jobs: Vec<Job>,
    /// Chunks not yet submitted (batch mode).
    pub remaining_chunks: usize,
    pub total: usize,
    pub done: usize,
    pub failed: usize,
}

/// Final tally of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
}

/// Shared, generation-checked access to the [`Session`].
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<Session>>,
}

impl SessionStore {
    pub fn snapshot(&self) -> Session {
        self.with(|s| s.clone())
    }

    /// Mutate the session unless `guard` is stale.
    pub fn update<R>(
        &self,
        guard: &GenerationGuard,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Option<R> {
        guard.if_current(|| self.with(f))
    }

    /// Unchecked access. Callers already hold the generation lock.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }
}

/// Everything a stage needs while one run is in flight.
pub struct RunContext<'a> {
    pub guard: GenerationGuard,
    pub events: &'a EventSink,
    pub session: &'a SessionStore,
    pub form: JobForm,
    pub classes: Vec<String>,
}
