use crate::AppState;
use crate::api::error::AppError;
use crate::entities::images;
use crate::utils::validation::parse_image_id;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use super::types::*;

#[utoipa::path(
    get,
    path = "/pifuhd/api/v1/execution/images",
    responses(
        (status = 200, description = "All stored image records", body = Vec<ImageRecordResponse>),
        (status = 500, description = "Record store failure")
    ),
    tag = "images"
)]
pub async fn list_images(
    State(state): State<AppState>,
) -> Result<Json<Vec<ImageRecordResponse>>, AppError> {
    let records = state.images.list().await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// Multipart fields: `file` (required) and an optional `image_id` UUID that
/// must come before it. Anything after `file` is ignored.
#[utoipa::path(
    post,
    path = "/pifuhd/api/v1/execution/upload",
    request_body(content = Multipart, description = "Image upload (`file`, optional `image_id`)"),
    responses(
        (status = 200, description = "Image stored", body = ImageUploadResponse),
        (status = 400, description = "Missing, empty or rejected file"),
        (status = 409, description = "Image id already in use"),
        (status = 413, description = "File too large"),
        (status = 500, description = "Storage failure")
    ),
    tag = "images"
)]
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ImageUploadResponse>, AppError> {
    let mut requested_id: Option<String> = None;

    let result: Result<images::Model, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(map_multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "image_id" => {
                    let text = field.text().await.map_err(map_multipart_error)?;
                    if !text.trim().is_empty() {
                        requested_id = Some(
                            parse_image_id(&text)
                                .map_err(|e| AppError::BadRequest(e.to_string()))?,
                        );
                    }
                }
                "file" => {
                    let original_filename = field.file_name().unwrap_or("unnamed").to_string();
                    let content_type = field.content_type().map(|s| s.to_string());
                    let reader = StreamReader::new(Box::pin(field.map_err(std::io::Error::other)));

                    return state
                        .images
                        .upload(
                            &original_filename,
                            content_type.as_deref(),
                            requested_id.take(),
                            reader,
                        )
                        .await;
                }
                other => tracing::debug!("Ignoring multipart field '{}'", other),
            }
        }

        Err(AppError::BadRequest("No file provided".to_string()))
    }
    .await;

    // Consume what is left so the client is not cut off mid-send
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }

    match result {
        Ok(record) => Ok(Json(ImageUploadResponse {
            image_id: record.id,
            status: STATUS_SUCCESS.to_string(),
        })),
        Err(e) => {
            tracing::warn!("Upload rejected: {}", e);
            Err(e)
        }
    }
}

fn map_multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE
        || e.to_string().contains("length limit exceeded")
    {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}
