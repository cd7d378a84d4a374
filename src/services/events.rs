use tokio::sync::mpsc;

use crate::models::event::LabelerEvent;
use crate::services::cancellation::GenerationGuard;

/// Sending half of the event channel. Emissions from a stale generation are dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<LabelerEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LabelerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, guard: &GenerationGuard, event: LabelerEvent) {
        guard.if_current(|| self.send(event));
    }

    pub fn status(&self, guard: &GenerationGuard, message: impl Into<String>, ttl_ms: u64) {
        self.emit(
            guard,
            LabelerEvent::Status {
                message: message.into(),
                ttl_ms,
            },
        );
    }

    /// Send regardless of generation. Only for the cancel path itself.
    pub(crate) fn send(&self, event: LabelerEvent) {
        // A dropped receiver just means nobody is listening.
        let _ = self.tx.send(event);
    }
}
