use crate::config::AppConfig;
use crate::services::pose::{PoseEstimator, create_pose_estimator};
use crate::services::reconstruction::{Reconstructor, create_reconstructor};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn setup_pose_estimator(config: &AppConfig) -> anyhow::Result<Arc<dyn PoseEstimator>> {
    let estimator: Arc<dyn PoseEstimator> = create_pose_estimator(config)?.into();

    if estimator.health_check().await {
        info!("🦴 Pose estimator ready ({})", config.pose_estimator);
    } else {
        warn!(
            "⚠️  Pose estimator unreachable! /prepare requests will fail until it comes up."
        );
    }

    Ok(estimator)
}

pub async fn setup_reconstructor(config: &AppConfig) -> anyhow::Result<Arc<dyn Reconstructor>> {
    let reconstructor: Arc<dyn Reconstructor> = create_reconstructor(config)?.into();

    if reconstructor.health_check().await {
        info!("🧊 Reconstructor ready ({})", config.reconstructor);
    } else {
        warn!("⚠️  Reconstructor unreachable! Jobs will end in error until it comes up.");
    }

    Ok(reconstructor)
}
