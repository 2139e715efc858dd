use crate::AppState;
use crate::api::error::AppError;
use crate::api::extract::ValidatedJson;
use axum::{Json, extract::State};

use super::types::*;

#[utoipa::path(
    post,
    path = "/pifuhd/api/v1/execution/prepare",
    request_body = PoseDataRequest,
    responses(
        (status = 200, description = "Pose data prepared", body = PoseDataResponse),
        (status = 404, description = "Image not found"),
        (status = 422, description = "Unknown method or malformed body"),
        (status = 502, description = "Pose estimator failed")
    ),
    tag = "pipeline"
)]
pub async fn prepare_pose_data(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PoseDataRequest>,
) -> Result<Json<PoseDataResponse>, AppError> {
    let prepared = state.poses.prepare(&req.image_id, req.method).await?;

    Ok(Json(PoseDataResponse {
        pose_data_id: prepared.pose_data_id,
        keypoints: prepared.keypoints,
        status: STATUS_SUCCESS.to_string(),
    }))
}
