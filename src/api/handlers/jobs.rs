use crate::AppState;
use crate::api::error::AppError;
use crate::api::extract::ValidatedJson;
use crate::models::JobStatus;
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;

use super::types::*;

#[utoipa::path(
    post,
    path = "/pifuhd/api/v1/execution/generate3d",
    request_body = Generate3DRequest,
    responses(
        (status = 200, description = "Job queued", body = JobStatusResponse),
        (status = 400, description = "Pose data belongs to another image"),
        (status = 404, description = "Image or pose data not found")
    ),
    tag = "pipeline"
)]
pub async fn generate_3d_model(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<Generate3DRequest>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let job = state.jobs.submit(&req.image_id, &req.pose_data_id).await?;

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        status: JobStatus::Queued,
        error: None,
    }))
}

#[utoipa::path(
    get,
    path = "/pifuhd/api/v1/execution/status/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Current job status", body = JobStatusResponse),
        (status = 404, description = "Job not found")
    ),
    tag = "pipeline"
)]
pub async fn check_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, AppError> {
    let view = state.jobs.status(&job_id).await?;

    Ok(Json(JobStatusResponse {
        job_id: view.job_id,
        status: view.status,
        error: view.error,
    }))
}

#[utoipa::path(
    get,
    path = "/pifuhd/api/v1/execution/model/{job_id}",
    params(
        ("job_id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Model location", body = ModelResponse),
        (status = 404, description = "Job or model not found"),
        (status = 409, description = "Job has not completed")
    ),
    tag = "pipeline"
)]
pub async fn retrieve_3d_model(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ModelResponse>, AppError> {
    let model_url = state.jobs.model_url(&job_id).await?;

    Ok(Json(ModelResponse { job_id, model_url }))
}

#[utoipa::path(
    get,
    path = "/pifuhd/api/v1/execution/model/{job_id}/file",
    params(
        ("job_id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Wavefront OBJ mesh", content_type = "model/obj"),
        (status = 404, description = "Job or model not found"),
        (status = 409, description = "Job has not completed")
    ),
    tag = "pipeline"
)]
pub async fn download_3d_model(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, AppError> {
    let reader = state.jobs.open_model(&job_id).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    Ok((
        [
            (header::CONTENT_TYPE, "model/obj".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.obj\"", job_id),
            ),
        ],
        body,
    )
        .into_response())
}
