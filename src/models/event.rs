use std::path::PathBuf;

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LabelerEvent {
    /// `done` of `total` images have a written label file.
    Progress { done: usize, total: usize },
    /// A label file was written for `image_path`.
    LabelReady {
        image_path: PathBuf,
        detections: usize,
        compute_ms: i64,
    },
    /// The run completed; `total` is the number of labelled images.
    Finished { total: usize },
    /// The run was aborted by a fatal error.
    Error { message: String },
    /// Short-lived status text.
    Status { message: String, ttl_ms: u64 },
    BusyChanged(bool),
}
