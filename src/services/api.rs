use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::models::job::JobId;
use crate::models::response::{
    BatchSubmitResponse, ResultResponse, StatusResponse, SubmitResponse,
};

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
const BATCH_SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const RESULT_TIMEOUT: Duration = Duration::from_secs(15);

/// An image file ready to be sent as a multipart part.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Read the image from disk.
    pub async fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mime_type: mime_for_image(path),
            bytes,
        })
    }
}

/// MIME type from the file extension; anything unrecognised is sent as JPEG.
pub fn mime_for_image(path: &Path) -> &'static str {
    image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg")
}

/// Shared form fields sent with every upload.
#[derive(Debug, Clone, PartialEq)]
pub struct JobForm {
    pub prompt: String,
    pub classes: Vec<String>,
}

impl JobForm {
    /// An empty prompt falls back to the class list joined with `" ; "`.
    pub fn new(prompt: &str, classes: &[String]) -> Self {
        let prompt = if prompt.trim().is_empty() {
            classes.join(" ; ")
        } else {
            prompt.to_string()
        };
        Self {
            prompt,
            classes: classes.to_vec(),
        }
    }

    pub fn classes_json(&self) -> String {
        serde_json::Value::from(self.classes.clone()).to_string()
    }
}

/// Remote detection service.
#[async_trait]
pub trait DetectionApi: Send + Sync {
    /// `POST /jobs`
    async fn submit_job(&self, image: ImageUpload, form: &JobForm)
        -> Result<SubmitResponse, ApiError>;

    /// `POST /jobs/batch`
    async fn submit_batch(
        &self,
        images: Vec<ImageUpload>,
        form: &JobForm,
    ) -> Result<BatchSubmitResponse, ApiError>;

    /// `GET /jobs/{id}`
    async fn job_status(&self, job_id: JobId) -> Result<StatusResponse, ApiError>;

    /// `GET /jobs/{id}/result`
    async fn job_result(&self, job_id: JobId) -> Result<ResultResponse, ApiError>;
}

/// HTTP client for the cloud detection service.
pub struct CloudApiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl CloudApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("cloud-label/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn image_part(image: ImageUpload) -> Result<Part, ApiError> {
        Ok(Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(image.mime_type)?)
    }

    fn with_form_fields(form: Form, fields: &JobForm) -> Form {
        form.text("prompt", fields.prompt.clone())
            .text("classes", fields.classes_json())
    }

    /// Send and decode. Connection failures and non-2xx statuses are
    /// transport errors; a 2xx body that does not decode is a protocol error.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let response = request
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DetectionApi for CloudApiClient {
    async fn submit_job(
        &self,
        image: ImageUpload,
        form: &JobForm,
    ) -> Result<SubmitResponse, ApiError> {
        let part = Self::image_part(image)?;
        let multipart = Self::with_form_fields(Form::new().part("image", part), form);
        self.execute(self.http.post(self.url("/jobs")).multipart(multipart), SUBMIT_TIMEOUT)
            .await
    }

    async fn submit_batch(
        &self,
        images: Vec<ImageUpload>,
        form: &JobForm,
    ) -> Result<BatchSubmitResponse, ApiError> {
        let mut multipart = Form::new();
        for image in images {
            multipart = multipart.part("images", Self::image_part(image)?);
        }
        let multipart = Self::with_form_fields(multipart, form);
        self.execute(
            self.http.post(self.url("/jobs/batch")).multipart(multipart),
            BATCH_SUBMIT_TIMEOUT,
        )
        .await
    }

    async fn job_status(&self, job_id: JobId) -> Result<StatusResponse, ApiError> {
        self.execute(self.http.get(self.url(&format!("/jobs/{job_id}"))), STATUS_TIMEOUT)
            .await
    }

    async fn job_result(&self, job_id: JobId) -> Result<ResultResponse, ApiError> {
        self.execute(
            self.http.get(self.url(&format!("/jobs/{job_id}/result"))),
            RESULT_TIMEOUT,
        )
        .await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Protocol(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_image() {
        assert_eq!(mime_for_image(Path::new("/tmp/photo.png")), "image/png");
        assert_eq!(mime_for_image(Path::new("/tmp/photo.PNG")), "image/png");
        assert_eq!(mime_for_image(Path::new("/tmp/photo.jpg")), "image/jpeg");
        assert_eq!(mime_for_image(Path::new("/tmp/photo.bmp")), "image/bmp");
        assert_eq!(mime_for_image(Path::new("/tmp/photo.tif")), "image/tiff");
        assert_eq!(mime_for_image(Path::new("/tmp/photo.webp")), "image/webp");
        assert_eq!(mime_for_image(Path::new("/tmp/photo.xyz")), "image/jpeg");
        assert_eq!(mime_for_image(Path::new("/tmp/photo")), "image/jpeg");
    }

    #[test]
    fn test_empty_prompt_falls_back_to_classes() {
        let classes = vec!["person".to_string(), "car".to_string()];
        assert_eq!(JobForm::new("", &classes).prompt, "person ; car");
        assert_eq!(JobForm::new("  ", &classes).prompt, "person ; car");
        assert_eq!(JobForm::new("find cars", &classes).prompt, "find cars");
    }

    #[test]
    fn test_classes_json_is_compact_array() {
        let form = JobForm::new("", &["a".to_string(), "b c".to_string()]);
        assert_eq!(form.classes_json(), r#"["a","b c"]"#);
    }

    #[tokio::test]
    async fn test_read_missing_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageUpload::read(&dir.path().join("nope.jpg")).await.is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = CloudApiClient::new("https://example.test/v1/", "key").unwrap();
        assert_eq!(client.url("/jobs"), "https://example.test/v1/jobs");
    }
}
