use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

struct Generation {
    value: u64,
    token: CancellationToken,
}

/// Generation counter that invalidates every continuation scheduled before
/// the last `cancel()`.
///
/// Check-and-mutate (`GenerationGuard::if_current`) and `cancel` serialize on
/// the same lock, so a continuation either completes its mutation before a
/// cancel or observes the new generation and does nothing.
#[derive(Clone)]
pub struct CancellationAuthority {
    inner: Arc<Mutex<Generation>>,
}

impl Default for CancellationAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationAuthority {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Generation {
                value: 0,
                token: CancellationToken::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Generation> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> u64 {
        self.lock().value
    }

    /// Capture the generation in effect now.
    pub fn capture(&self) -> GenerationGuard {
        let generation = self.lock();
        GenerationGuard {
            captured: generation.value,
            token: generation.token.clone(),
            authority: self.clone(),
        }
    }

    /// Advance the generation, wake every timer waiting on the old one and
    /// run `on_cancel` before any stale continuation can observe the change.
    pub fn cancel<R>(&self, on_cancel: impl FnOnce() -> R) -> R {
        let mut generation = self.lock();
        generation.value += 1;
        generation.token.cancel();
        generation.token = CancellationToken::new();
        on_cancel()
    }
}

/// The generation an asynchronous operation started under.
#[derive(Clone)]
pub struct GenerationGuard {
    captured: u64,
    token: CancellationToken,
    authority: CancellationAuthority,
}

impl GenerationGuard {
    pub fn generation(&self) -> u64 {
        self.captured
    }

    pub fn is_current(&self) -> bool {
        self.authority.current() == self.captured
    }

    /// Run `f` only if no cancel happened since capture.
    pub fn if_current<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let generation = self.authority.lock();
        if generation.value != self.captured {
            return None;
        }
        let out = f();
        drop(generation);
        Some(out)
    }

    /// Resolves once this generation has been cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Sleep for `duration`. Returns `false` if cancelled first.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
