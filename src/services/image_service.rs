use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::models::ImageStatus;
use crate::services::storage::{BlobError, BlobStore, blob_error};
use crate::utils::keyed_mutex::KeyedMutex;
use crate::utils::validation::{
    SNIFF_HEADER_LEN, detect_content_type, reject_executable_content, sanitize_filename,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

/// Blob key for an uploaded image: `{image_id}-{filename}`
pub fn image_blob_key(image_id: &str, filename: &str) -> String {
    format!("{}-{}", image_id, filename)
}

pub struct ImageService {
    db: DatabaseConnection,
    blobs: Arc<dyn BlobStore>,
    config: AppConfig,
    upload_locks: KeyedMutex,
}

impl ImageService {
    pub fn new(db: DatabaseConnection, blobs: Arc<dyn BlobStore>, config: AppConfig) -> Self {
        Self {
            db,
            blobs,
            config,
            upload_locks: KeyedMutex::new(),
        }
    }

    /// Stores the image bytes durably, then records them.
    ///
    /// The record is inserted only after the blob write has completed, so a
    /// failed write never leaves a record behind. `requested_id` lets clients
    /// retry an upload idempotently; reusing an id is a conflict.
    pub async fn upload<'a, R>(
        &self,
        original_filename: &str,
        declared_content_type: Option<&str>,
        requested_id: Option<String>,
        mut reader: R,
    ) -> Result<images::Model, AppError>
    where
        R: AsyncRead + Unpin + Send + 'a,
    {
        let filename =
            sanitize_filename(original_filename).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let image_id = requested_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let _guard = self.upload_locks.lock(&image_id).await;

        if Images::find_by_id(image_id.as_str())
            .one(&self.db)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Image {} already exists",
                image_id
            )));
        }

        // Peek at the head of the stream for type sniffing, then replay it
        let mut header = Vec::with_capacity(SNIFF_HEADER_LEN);
        (&mut reader)
            .take(SNIFF_HEADER_LEN as u64)
            .read_to_end(&mut header)
            .await
            .map_err(map_read_error)?;

        reject_executable_content(&header).map_err(|e| AppError::BadRequest(e.to_string()))?;
        let content_type = detect_content_type(&header, declared_content_type);

        let chained = AsyncReadExt::chain(std::io::Cursor::new(header), reader);
        let key = image_blob_key(&image_id, &filename);

        tracing::info!("Storing upload {} as {}", original_filename, key);
        let stored = self
            .blobs
            .put_stream(&key, Box::new(chained), self.config.max_file_size as u64)
            .await
            .map_err(|e| map_blob_error(e, self.config.max_file_size))?;

        let record = images::ActiveModel {
            id: Set(image_id.clone()),
            filename: Set(filename),
            file_path: Set(self.blobs.location(&key)),
            content_type: Set(content_type),
            size_bytes: Set(stored.size),
            sha256: Set(stored.sha256.clone()),
            status: Set(ImageStatus::Uploaded.as_str().to_string()),
            uploaded_at: Set(Utc::now()),
        };

        match record.insert(&self.db).await {
            Ok(model) => {
                tracing::info!(
                    "📸 Image {} stored ({} bytes, sha256 {})",
                    model.id,
                    model.size_bytes,
                    model.sha256
                );
                Ok(model)
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&key).await {
                    tracing::error!("Failed to remove orphaned blob {}: {}", key, cleanup);
                }
                match e.sql_err() {
                    Some(SqlErr::UniqueConstraintViolation(_)) => Err(AppError::Conflict(
                        format!("Image {} already exists", image_id),
                    )),
                    _ => Err(AppError::Database(e)),
                }
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<images::Model>, AppError> {
        Ok(Images::find()
            .order_by_asc(images::Column::UploadedAt)
            .order_by_asc(images::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn get(&self, image_id: &str) -> Result<images::Model, AppError> {
        Images::find_by_id(image_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))
    }

    pub async fn read_bytes(&self, image: &images::Model) -> Result<Vec<u8>, AppError> {
        let key = image_blob_key(&image.id, &image.filename);
        self.blobs.get(&key).await.map_err(|e| {
            AppError::Storage(format!("Image {} is unreadable: {}", image.id, e))
        })
    }

    /// Moves an image forward to `status`, only from `from`.
    pub async fn advance_status(
        &self,
        image_id: &str,
        from: &[ImageStatus],
        status: ImageStatus,
    ) -> Result<(), AppError> {
        Images::update_many()
            .col_expr(images::Column::Status, Expr::value(status.as_str()))
            .filter(images::Column::Id.eq(image_id))
            .filter(images::Column::Status.is_in(from.iter().map(|s| s.as_str())))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

fn map_read_error(e: std::io::Error) -> AppError {
    let message = e.to_string();
    if message.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(format!("Failed to read upload: {}", message))
    }
}

fn map_blob_error(e: anyhow::Error, max_file_size: usize) -> AppError {
    match blob_error(&e) {
        Some(BlobError::TooLarge { .. }) => AppError::PayloadTooLarge(format!(
            "File exceeds the maximum size of {} bytes",
            max_file_size
        )),
        Some(BlobError::Empty) => AppError::BadRequest("Uploaded file is empty".to_string()),
        Some(BlobError::AlreadyExists(key)) => {
            AppError::Conflict(format!("Blob {} already exists", key))
        }
        Some(BlobError::InvalidKey(key)) => {
            AppError::BadRequest(format!("Invalid storage key {}", key))
        }
        _ if format!("{:#}", e).contains("length limit exceeded") => {
            AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
        }
        _ => AppError::Storage(format!("Failed to store upload: {:#}", e)),
    }
}
