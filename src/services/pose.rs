use crate::config::AppConfig;
use crate::models::{Keypoints, PoseMethod};
use crate::services::collaborator::CollaboratorClient;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Image handed to a pose estimator
#[derive(Debug, Clone)]
pub struct PoseInput {
    pub image_id: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub image: Vec<u8>,
    pub method: PoseMethod,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoseEstimate {
    /// `None` when the method keeps its own internal representation
    #[serde(default)]
    pub keypoints: Option<Keypoints>,
}

/// External pose estimation backend
#[async_trait]
pub trait PoseEstimator: Send + Sync {
    async fn estimate(&self, input: PoseInput) -> Result<PoseEstimate>;

    async fn health_check(&self) -> bool;
}

/// Calls a pose service over HTTP.
///
/// `POST {base}/estimate` with multipart fields `image_id`, `method` and
/// `image`; expects `{"keypoints": <any JSON> | null}` back. The keypoint
/// shape is up to the service and is stored as-is.
pub struct HttpPoseEstimator {
    client: CollaboratorClient,
}

impl HttpPoseEstimator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: CollaboratorClient::new("pose", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl PoseEstimator for HttpPoseEstimator {
    async fn estimate(&self, input: PoseInput) -> Result<PoseEstimate> {
        let mut image = Part::bytes(input.image).file_name(input.filename);
        if let Some(content_type) = input.content_type.as_deref() {
            image = image.mime_str(content_type)?;
        }

        let form = Form::new()
            .text("image_id", input.image_id)
            .text("method", input.method.as_str())
            .part("image", image);

        let estimate: PoseEstimate = self
            .client
            .post_multipart("estimate", form)
            .await?
            .json()
            .await
            .map_err(|e| anyhow!("pose service sent an unreadable response: {}", e))?;

        Ok(estimate)
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}

/// Development stand-in: an empty keypoint map for methods that produce
/// keypoints, nothing for the others.
pub struct NoOpPoseEstimator;

#[async_trait]
impl PoseEstimator for NoOpPoseEstimator {
    async fn estimate(&self, input: PoseInput) -> Result<PoseEstimate> {
        tracing::warn!(
            "NoOpPoseEstimator: skipping pose estimation for image {} (development mode)",
            input.image_id
        );
        Ok(PoseEstimate {
            keypoints: input
                .method
                .produces_keypoints()
                .then(|| Keypoints::Object(serde_json::Map::new())),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub fn create_pose_estimator(config: &AppConfig) -> Result<Box<dyn PoseEstimator>> {
    match config.pose_estimator.to_lowercase().as_str() {
        "http" => {
            let url = config
                .pose_service_url
                .as_deref()
                .ok_or_else(|| anyhow!("POSE_SERVICE_URL must be set when POSE_ESTIMATOR=http"))?;
            Ok(Box::new(HttpPoseEstimator::new(
                url,
                Duration::from_secs(config.collaborator_timeout_secs),
            )?))
        }
        "noop" | "none" | "disabled" => Ok(Box::new(NoOpPoseEstimator)),
        other => {
            tracing::warn!("Unknown pose estimator '{}', using NoOpPoseEstimator", other);
            Ok(Box::new(NoOpPoseEstimator))
        }
    }
}
