use serde::Deserialize;

use crate::models::job::{JobId, RemoteStatus};

/// Response to `POST /jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
}

/// Response to `POST /jobs/batch`. `job_ids` is positional: entry `i`
/// belongs to the `i`-th uploaded image.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchSubmitResponse {
    pub job_ids: Vec<JobId>,
}

/// Response to `GET /jobs/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Response to `GET /jobs/{id}/result`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultResponse {
    pub yolo_txt: String,
    #[serde(default)]
    pub compute_ms: i64,
    /// Server-side class names, indexed by the class ids in `yolo_txt`.
    #[serde(default)]
    pub class_names: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_without_class_names() {
        let result: ResultResponse =
            serde_json::from_str(r#"{"yolo_txt": "0 0.5 0.5 0.2 0.3\n", "compute_ms": 120}"#)
                .unwrap();
        assert_eq!(result.compute_ms, 120);
        assert!(result.class_names.is_none());
    }

    #[test]
    fn test_result_missing_yolo_txt_is_rejected() {
        let parsed = serde_json::from_str::<ResultResponse>(r#"{"compute_ms": 120}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_status_with_error_message() {
        let status: StatusResponse =
            serde_json::from_str(r#"{"status": "failed", "error_message": "bad image"}"#).unwrap();
        assert_eq!(status.status, RemoteStatus::Failed);
        assert_eq!(status.error_message.as_deref(), Some("bad image"));
    }

    #[test]
    fn test_batch_submit_requires_job_ids() {
        assert!(serde_json::from_str::<BatchSubmitResponse>(r#"{"ids": [1, 2]}"#).is_err());
    }
}
