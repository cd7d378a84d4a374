use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::error::LabelerError;
use crate::models::job::Job;
use crate::services::api::{DetectionApi, ImageUpload, JobForm};
use crate::services::cancellation::GenerationGuard;
use crate::services::events::EventSink;
use crate::services::retry::RetryPolicy;

/// Uploads images and turns the service's answer into pending [`Job`]s.
#[derive(Clone)]
pub struct JobSubmitter {
    api: Arc<dyn DetectionApi>,
    retry: RetryPolicy,
}

impl JobSubmitter {
    pub fn new(api: Arc<dyn DetectionApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// Submit one image. The file is read before anything goes on the wire.
    pub async fn submit_single(
        &self,
        image_path: &Path,
        form: &JobForm,
        guard: &GenerationGuard,
        events: &EventSink,
    ) -> Result<Job, LabelerError> {
        let upload = read_image(image_path).await?;
        let (api, upload) = (&self.api, &upload);

        let response = self
            .retry
            .run("Submit", guard, events, move || {
                api.submit_job(upload.clone(), form)
            })
            .await?;

        info!(job_id = response.job_id, image = %image_path.display(), "Job submitted");
        metrics::counter!("cloud_label_jobs_submitted_total").increment(1);
        Ok(Job::pending(response.job_id, image_path))
    }

    /// Submit a chunk in one request. The returned ids are matched to the
    /// images by position, so any count mismatch is a protocol error.
    pub async fn submit_chunk(
        &self,
        image_paths: &[PathBuf],
        form: &JobForm,
        guard: &GenerationGuard,
        events: &EventSink,
    ) -> Result<Vec<Job>, LabelerError> {
        let mut uploads = Vec::with_capacity(image_paths.len());
        for path in image_paths {
            uploads.push(read_image(path).await?);
        }
        let (api, uploads) = (&self.api, &uploads);

        let response = self
            .retry
            .run("Batch submit", guard, events, move || {
                api.submit_batch(uploads.clone(), form)
            })
            .await?;

        if response.job_ids.len() != image_paths.len() {
            return Err(LabelerError::Protocol(format!(
                "batch returned {} job id(s) for {} image(s)",
                response.job_ids.len(),
                image_paths.len()
            )));
        }

        info!(jobs = response.job_ids.len(), "Batch chunk submitted");
        metrics::counter!("cloud_label_jobs_submitted_total")
            .increment(response.job_ids.len() as u64);

        Ok(response
            .job_ids
            .into_iter()
            .zip(image_paths)
            .map(|(id, path)| Job::pending(id, path))
            .collect())
    }
}

async fn read_image(path: &Path) -> Result<ImageUpload, LabelerError> {
    ImageUpload::read(path)
        .await
        .map_err(|source| LabelerError::ImageRead {
            path: path.to_path_buf(),
            source,
        })
}
