use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::models::{ImageStatus, Keypoints, PoseMethod};
use crate::services::image_service::ImageService;
use crate::services::pose::{PoseEstimator, PoseInput};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PreparedPose {
    pub pose_data_id: String,
    pub image_id: String,
    pub method: PoseMethod,
    pub keypoints: Option<Keypoints>,
}

impl TryFrom<pose_data::Model> for PreparedPose {
    type Error = AppError;

    fn try_from(model: pose_data::Model) -> Result<Self, Self::Error> {
        let method = model.method.parse::<PoseMethod>().map_err(|e| {
            AppError::Internal(format!("Pose data {} is corrupt: {}", model.id, e))
        })?;

        Ok(Self {
            pose_data_id: model.id,
            image_id: model.image_id,
            method,
            keypoints: model.keypoints,
        })
    }
}

pub struct PoseService {
    db: DatabaseConnection,
    images: Arc<ImageService>,
    estimator: Arc<dyn PoseEstimator>,
}

impl PoseService {
    pub fn new(
        db: DatabaseConnection,
        images: Arc<ImageService>,
        estimator: Arc<dyn PoseEstimator>,
    ) -> Self {
        Self {
            db,
            images,
            estimator,
        }
    }

    pub async fn prepare(
        &self,
        image_id: &str,
        method: PoseMethod,
    ) -> Result<PreparedPose, AppError> {
        let image = self.images.get(image_id).await?;
        let bytes = self.images.read_bytes(&image).await?;

        let estimate = self
            .estimator
            .estimate(PoseInput {
                image_id: image.id.clone(),
                filename: image.filename.clone(),
                content_type: image.content_type.clone(),
                image: bytes,
                method,
            })
            .await
            .map_err(|e| AppError::Upstream(format!("Pose estimation failed: {:#}", e)))?;

        let record = pose_data::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            image_id: Set(image.id.clone()),
            method: Set(method.as_str().to_string()),
            keypoints: Set(estimate.keypoints.clone()),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;

        self.images
            .advance_status(&image.id, &[ImageStatus::Uploaded], ImageStatus::PosePrepared)
            .await?;

        tracing::info!(
            "🦴 Pose data {} prepared for image {} via {}",
            record.id,
            image.id,
            method.as_str()
        );

        Ok(PreparedPose {
            pose_data_id: record.id,
            image_id: image.id,
            method,
            keypoints: estimate.keypoints,
        })
    }

    pub async fn get(&self, pose_data_id: &str) -> Result<PreparedPose, AppError> {
        PoseData::find_by_id(pose_data_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pose data {} not found", pose_data_id)))?
            .try_into()
    }
}
