use crate::entities::images;
use crate::models::{JobStatus, Keypoints, PoseMethod};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Status reported for a successful upload or pose preparation
pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImageUploadResponse {
    pub image_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImageRecordResponse {
    pub image_id: String,
    pub filename: String,
    pub file_path: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: String,
}

impl From<images::Model> for ImageRecordResponse {
    fn from(model: images::Model) -> Self {
        Self {
            image_id: model.id,
            filename: model.filename,
            file_path: model.file_path,
            content_type: model.content_type,
            size_bytes: model.size_bytes,
            sha256: model.sha256,
            uploaded_at: model.uploaded_at,
            status: model.status,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct PoseDataRequest {
    #[validate(length(min = 1, max = 64))]
    pub image_id: String,
    pub method: PoseMethod,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PoseDataResponse {
    pub pose_data_id: String,
    /// Null for methods that do not produce structured keypoints
    #[schema(value_type = Option<Object>)]
    pub keypoints: Option<Keypoints>,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct Generate3DRequest {
    #[validate(length(min = 1, max = 64))]
    pub image_id: String,
    #[validate(length(min = 1, max = 64))]
    pub pose_data_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ModelResponse {
    pub job_id: String,
    pub model_url: String,
}
