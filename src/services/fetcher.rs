use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::LabelerError;
use crate::models::event::LabelerEvent;
use crate::models::job::{Job, JobStatus};
use crate::models::response::ResultResponse;
use crate::services::api::DetectionApi;
use crate::services::cancellation::GenerationGuard;
use crate::services::events::EventSink;
use crate::services::label_file::{label_path_for, LabelFileWriter, LabelWriteError};
use crate::services::retry::RetryPolicy;
use crate::services::validation;

/// What happened to one image's label file.
#[derive(Debug)]
pub enum LabelOutcome {
    Written {
        label_path: PathBuf,
        detections: usize,
        compute_ms: i64,
    },
    WriteFailed(LabelWriteError),
}

/// Per-chunk fetch tally. `written` counts label files actually on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkFetchSummary {
    pub written: usize,
    pub failed: usize,
}

/// Validated label text for a job result. Results that name their classes
/// are remapped onto the local list by name; the rest are validated by id.
pub fn detections_from(result: &ResultResponse, local_classes: &[String]) -> String {
    match &result.class_names {
        Some(server_names) => validation::remap(&result.yolo_txt, server_names, local_classes),
        None => validation::validate(&result.yolo_txt, local_classes.len()),
    }
}

/// Downloads finished results and writes them as label files.
#[derive(Clone)]
pub struct ResultFetcher {
    api: Arc<dyn DetectionApi>,
    retry: RetryPolicy,
    writer: LabelFileWriter,
}

impl ResultFetcher {
    pub fn new(api: Arc<dyn DetectionApi>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            writer: LabelFileWriter::new(),
        }
    }

    /// Fetch and persist one job's result. Transport failures past the retry
    /// budget and malformed results are errors; a failed write is not.
    pub async fn fetch_single(
        &self,
        job: &Job,
        local_classes: &[String],
        guard: &GenerationGuard,
        events: &EventSink,
    ) -> Result<LabelOutcome, LabelerError> {
        let result = self.download(job, guard, events).await?;
        self.persist(job, &result, local_classes, guard, events).await
    }

    /// Fetch every succeeded job of a chunk, one at a time in index order.
    /// Failed jobs are skipped; any per-image failure is counted, not raised.
    pub async fn fetch_chunk(
        &self,
        jobs: &[Job],
        local_classes: &[String],
        guard: &GenerationGuard,
        events: &EventSink,
    ) -> Result<ChunkFetchSummary, LabelerError> {
        let mut summary = ChunkFetchSummary::default();

        for job in jobs.iter().filter(|j| j.status == JobStatus::Succeeded) {
            let result = match self.download(job, guard, events).await {
                Ok(result) => result,
                Err(LabelerError::Cancelled) => return Err(LabelerError::Cancelled),
                Err(e) => {
                    warn!(
                        job_id = job.id,
                        image = %job.image_path.display(),
                        error = %e,
                        "Result fetch failed"
                    );
                    metrics::counter!("cloud_label_labels_failed_total").increment(1);
                    summary.failed += 1;
                    continue;
                }
            };

            match self.persist(job, &result, local_classes, guard, events).await? {
                LabelOutcome::Written { .. } => summary.written += 1,
                LabelOutcome::WriteFailed(_) => summary.failed += 1,
            }
        }

        Ok(summary)
    }

    async fn download(
        &self,
        job: &Job,
        guard: &GenerationGuard,
        events: &EventSink,
    ) -> Result<ResultResponse, LabelerError> {
        let (api, job_id) = (&self.api, job.id);
        self.retry
            .run("Fetch", guard, events, move || api.job_result(job_id))
            .await
    }

    /// Write one result as a label file.
    ///
    /// Without a local class list nothing is written and any existing label
    /// is left alone. The generation is checked before the backup and again
    /// right before the label is replaced; a cancel that lands while the
    /// final write is already in progress cannot stop it, but suppresses the
    /// `LabelReady` event.
    async fn persist(
        &self,
        job: &Job,
        result: &ResultResponse,
        local_classes: &[String],
        guard: &GenerationGuard,
        events: &EventSink,
    ) -> Result<LabelOutcome, LabelerError> {
        if local_classes.is_empty() {
            let e = LabelWriteError::NoClasses {
                path: label_path_for(&job.image_path),
            };
            warn!(job_id = job.id, error = %e, "Label skipped");
            metrics::counter!("cloud_label_labels_failed_total").increment(1);
            return Ok(LabelOutcome::WriteFailed(e));
        }

        let text = detections_from(result, local_classes);
        let detections = validation::count_detections(&text);

        if !guard.is_current() {
            return Err(LabelerError::Cancelled);
        }

        let written = match self.writer.backup(&job.image_path).await {
            Ok(label_path) => {
                if !guard.is_current() {
                    return Err(LabelerError::Cancelled);
                }
                self.writer
                    .commit(&label_path, &text)
                    .await
                    .map(|()| label_path)
            }
            Err(e) => Err(e),
        };

        match written {
            Ok(label_path) => {
                info!(
                    job_id = job.id,
                    label = %label_path.display(),
                    detections,
                    compute_ms = result.compute_ms,
                    "Label written"
                );
                metrics::counter!("cloud_label_labels_written_total").increment(1);
                metrics::histogram!("cloud_label_compute_ms").record(result.compute_ms as f64);
                events.emit(
                    guard,
                    LabelerEvent::LabelReady {
                        image_path: job.image_path.clone(),
                        detections,
                        compute_ms: result.compute_ms,
                    },
                );
                Ok(LabelOutcome::Written {
                    label_path,
                    detections,
                    compute_ms: result.compute_ms,
                })
            }
            Err(e) => {
                warn!(job_id = job.id, error = %e, "Label write failed");
                metrics::counter!("cloud_label_labels_failed_total").increment(1);
                Ok(LabelOutcome::WriteFailed(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(yolo_txt: &str, class_names: Option<&[&str]>) -> ResultResponse {
        ResultResponse {
            yolo_txt: yolo_txt.to_string(),
            compute_ms: 10,
            class_names: class_names.map(|names| names.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn local(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_result_validated_by_id() {
        let text = detections_from(
            &result("0 0.5 0.5 0.2 0.3\n4 0.5 0.5 0.2 0.3\n", None),
            &local(&["a", "b"]),
        );
        assert_eq!(text, "0 0.5 0.5 0.2 0.3\n");
    }

    #[test]
    fn test_named_result_remapped() {
        let text = detections_from(
            &result("0 0.5 0.5 0.2 0.3\n", Some(&["person", "car"])),
            &local(&["car", "person"]),
        );
        assert_eq!(text, "1 0.5 0.5 0.2 0.3\n");
    }

    #[test]
    fn test_no_local_classes_yields_empty_text() {
        assert_eq!(detections_from(&result("0 0.5 0.5 0.2 0.3\n", None), &[]), "");
        assert_eq!(
            detections_from(&result("0 0.5 0.5 0.2 0.3\n", Some(&["person"])), &[]),
            ""
        );
    }
}
