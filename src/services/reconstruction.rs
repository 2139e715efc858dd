use crate::config::AppConfig;
use crate::models::{Keypoints, PoseMethod};
use crate::services::collaborator::CollaboratorClient;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Everything a reconstruction backend needs for one job
#[derive(Debug, Clone)]
pub struct ReconstructionInput {
    pub job_id: String,
    pub image_id: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub image: Vec<u8>,
    pub method: PoseMethod,
    pub keypoints: Option<Keypoints>,
}

/// Mesh produced for a job, as Wavefront OBJ
#[derive(Debug, Clone)]
pub struct ReconstructedMesh {
    pub obj: Bytes,
}

/// External 3D reconstruction backend
#[async_trait]
pub trait Reconstructor: Send + Sync {
    async fn reconstruct(&self, input: ReconstructionInput) -> Result<ReconstructedMesh>;

    async fn health_check(&self) -> bool;
}

/// Calls a reconstruction service over HTTP.
///
/// `POST {base}/reconstruct` with multipart fields `job_id`, `method`,
/// optional `keypoints` (JSON) and `image`; the response body is the OBJ.
pub struct HttpReconstructor {
    client: CollaboratorClient,
}

impl HttpReconstructor {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: CollaboratorClient::new("reconstruction", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl Reconstructor for HttpReconstructor {
    async fn reconstruct(&self, input: ReconstructionInput) -> Result<ReconstructedMesh> {
        let mut image = Part::bytes(input.image).file_name(input.filename);
        if let Some(content_type) = input.content_type.as_deref() {
            image = image.mime_str(content_type)?;
        }

        let mut form = Form::new()
            .text("job_id", input.job_id)
            .text("image_id", input.image_id)
            .text("method", input.method.as_str());
        if let Some(keypoints) = &input.keypoints {
            form = form.text("keypoints", serde_json::to_string(keypoints)?);
        }
        let form = form.part("image", image);

        let obj = self
            .client
            .post_multipart("reconstruct", form)
            .await?
            .bytes()
            .await?;

        if obj.is_empty() {
            return Err(anyhow!("reconstruction service returned an empty mesh"));
        }

        Ok(ReconstructedMesh { obj })
    }

    async fn health_check(&self) -> bool {
        self.client.health_check().await
    }
}

/// Used when no backend is configured: every job ends in `error` instead of
/// pointing at a model that was never built.
pub struct NoOpReconstructor;

#[async_trait]
impl Reconstructor for NoOpReconstructor {
    async fn reconstruct(&self, input: ReconstructionInput) -> Result<ReconstructedMesh> {
        tracing::warn!(
            "NoOpReconstructor: no reconstruction backend configured, failing job {}",
            input.job_id
        );
        Err(anyhow!("no reconstruction backend configured"))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub fn create_reconstructor(config: &AppConfig) -> Result<Box<dyn Reconstructor>> {
    match config.reconstructor.to_lowercase().as_str() {
        "http" => {
            let url = config.reconstruction_service_url.as_deref().ok_or_else(|| {
                anyhow!("RECONSTRUCTION_SERVICE_URL must be set when RECONSTRUCTOR=http")
            })?;
            Ok(Box::new(HttpReconstructor::new(
                url,
                Duration::from_secs(config.collaborator_timeout_secs),
            )?))
        }
        "noop" | "none" | "disabled" => Ok(Box::new(NoOpReconstructor)),
        other => {
            tracing::warn!("Unknown reconstructor '{}', using NoOpReconstructor", other);
            Ok(Box::new(NoOpReconstructor))
        }
    }
}
