use std::path::PathBuf;

use thiserror::Error;

/// Why a labeling run stopped. `Display` is the message shown to the user.
#[derive(Debug, Error)]
pub enum LabelerError {
    #[error("A cloud auto-label run is already in progress.")]
    Busy,

    #[error("Cloud auto-label cancelled.")]
    Cancelled,

    /// Network or HTTP failure that outlived the retry budget.
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The service answered with something we cannot map back to our images.
    #[error("Unexpected server response: {0}")]
    Protocol(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("All batch jobs in this chunk failed.")]
    AllJobsFailed,

    #[error("Cannot read image: {}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LabelerError {
    /// Whether the run ended because of the user rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LabelerError::Cancelled)
    }
}
