use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::{prelude::*, *};
use crate::models::JobStatus;
use crate::services::image_service::ImageService;
use crate::services::pose_service::PoseService;
use crate::services::storage::BlobStore;
use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Blob key of the mesh generated by a job
pub fn model_blob_key(job_id: &str) -> String {
    format!("{}.obj", job_id)
}

/// Fields written alongside a status transition
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub error: Option<String>,
    pub model_path: Option<String>,
    pub claim_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JobView {
    pub job_id: String,
    pub status: JobStatus,
    pub error: Option<String>,
}

pub struct JobService {
    db: DatabaseConnection,
    images: Arc<ImageService>,
    poses: Arc<PoseService>,
    models: Arc<dyn BlobStore>,
    config: AppConfig,
}

impl JobService {
    pub fn new(
        db: DatabaseConnection,
        images: Arc<ImageService>,
        poses: Arc<PoseService>,
        models: Arc<dyn BlobStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            images,
            poses,
            models,
            config,
        }
    }

    /// Records a queued generation job; the worker picks it up later.
    pub async fn submit(&self, image_id: &str, pose_data_id: &str) -> Result<jobs::Model, AppError> {
        let image = self.images.get(image_id).await?;
        let pose = self.poses.get(pose_data_id).await?;

        if pose.image_id != image.id {
            return Err(AppError::BadRequest(format!(
                "Pose data {} was prepared for image {}, not {}",
                pose.pose_data_id, pose.image_id, image.id
            )));
        }

        let now = Utc::now();
        let job = jobs::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            image_id: Set(image.id),
            pose_data_id: Set(pose.pose_data_id),
            status: Set(JobStatus::Queued.as_str().to_string()),
            error: Set(None),
            model_path: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            started_at: Set(None),
            completed_at: Set(None),
            claim_token: Set(None),
        }
        .insert(&self.db)
        .await?;

        tracing::info!("🧊 Job {} queued for image {}", job.id, job.image_id);
        Ok(job)
    }

    pub async fn find(&self, job_id: &str) -> Result<jobs::Model, AppError> {
        Jobs::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Job not found".to_string()))
    }

    /// Current status of a job. A stored status outside the known set is
    /// reported as not found rather than echoed back.
    pub async fn status(&self, job_id: &str) -> Result<JobView, AppError> {
        let job = self.find(job_id).await?;
        let status = parse_status(&job)?;

        Ok(JobView {
            job_id: job.id,
            status,
            error: job.error,
        })
    }

    /// Blob key of a finished model; fails unless the job completed and the
    /// artifact is actually present.
    pub async fn completed_model_key(&self, job_id: &str) -> Result<String, AppError> {
        let job = self.find(job_id).await?;
        let status = parse_status(&job)?;

        if status != JobStatus::Completed {
            return Err(AppError::NotReady(format!(
                "Job {} is {}, model not available",
                job.id, status
            )));
        }

        let key = model_blob_key(&job.id);
        let present = job.model_path.is_some()
            && self
                .models
                .exists(&key)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        if !present {
            tracing::error!("Job {} is completed but its model artifact is missing", job.id);
            return Err(AppError::NotFound(format!(
                "Model for job {} not found",
                job.id
            )));
        }

        Ok(key)
    }

    pub async fn model_url(&self, job_id: &str) -> Result<String, AppError> {
        self.completed_model_key(job_id).await?;
        Ok(format!(
            "{}{}/model/{}/file",
            self.config.public_base_url.trim_end_matches('/'),
            crate::API_PREFIX,
            job_id
        ))
    }

    pub async fn open_model(
        &self,
        job_id: &str,
    ) -> Result<Box<dyn AsyncRead + Unpin + Send>, AppError> {
        let key = self.completed_model_key(job_id).await?;
        self.models
            .open(&key)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    /// Oldest queued jobs first
    pub async fn next_queued(&self, limit: u64) -> Result<Vec<jobs::Model>, AppError> {
        Ok(Jobs::find()
            .filter(jobs::Column::Status.eq(JobStatus::Queued.as_str()))
            .order_by_asc(jobs::Column::CreatedAt)
            .limit(limit)
            .all(&self.db)
            .await?)
    }

    /// Compare-and-set status change. Returns `false` when the job was no
    /// longer in `from` (another worker got there first).
    pub async fn transition(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
        update: JobUpdate,
    ) -> Result<bool, AppError> {
        self.compare_and_set(job_id, from, to, update, None).await
    }

    /// Takes a queued job for this worker. The returned token is the lease
    /// that later heartbeats and the final transition must present.
    pub async fn claim(&self, job_id: &str) -> Result<Option<String>, AppError> {
        let token = Uuid::new_v4().to_string();
        let won = self
            .compare_and_set(
                job_id,
                JobStatus::Queued,
                JobStatus::Processing,
                JobUpdate {
                    claim_token: Some(token.clone()),
                    ..JobUpdate::default()
                },
                None,
            )
            .await?;
        Ok(won.then_some(token))
    }

    /// Renews the lease on a job still being processed under `claim_token`.
    /// `false` means the lease is gone and the result must be discarded.
    pub async fn heartbeat(&self, job_id: &str, claim_token: &str) -> Result<bool, AppError> {
        let result = Jobs::update_many()
            .col_expr(jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(jobs::Column::Id.eq(job_id))
            .filter(jobs::Column::Status.eq(JobStatus::Processing.as_str()))
            .filter(jobs::Column::ClaimToken.eq(claim_token))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// Records the outcome of a claimed job; only the lease holder can.
    pub async fn finish(
        &self,
        job_id: &str,
        claim_token: &str,
        to: JobStatus,
        update: JobUpdate,
    ) -> Result<bool, AppError> {
        if !to.is_terminal() {
            return Err(AppError::Internal(format!(
                "Job {} cannot finish as {}",
                job_id, to
            )));
        }
        self.compare_and_set(job_id, JobStatus::Processing, to, update, Some(claim_token))
            .await
    }

    async fn compare_and_set(
        &self,
        job_id: &str,
        from: JobStatus,
        to: JobStatus,
        update: JobUpdate,
        lease: Option<&str>,
    ) -> Result<bool, AppError> {
        if !from.can_transition_to(to) {
            return Err(AppError::Internal(format!(
                "Illegal job transition {} -> {} for {}",
                from, to, job_id
            )));
        }

        let now = Utc::now();
        let mut query = Jobs::update_many()
            .col_expr(jobs::Column::Status, Expr::value(to.as_str()))
            .col_expr(jobs::Column::UpdatedAt, Expr::value(now));

        query = match to {
            JobStatus::Processing => query.col_expr(jobs::Column::StartedAt, Expr::value(now)),
            JobStatus::Queued => query
                .col_expr(
                    jobs::Column::StartedAt,
                    Expr::value(Option::<DateTime<Utc>>::None),
                )
                .col_expr(jobs::Column::ClaimToken, Expr::value(Option::<String>::None)),
            JobStatus::Completed | JobStatus::Error => query
                .col_expr(jobs::Column::CompletedAt, Expr::value(now))
                .col_expr(jobs::Column::ClaimToken, Expr::value(Option::<String>::None)),
        };
        if let Some(error) = update.error {
            query = query.col_expr(jobs::Column::Error, Expr::value(error));
        }
        if let Some(model_path) = update.model_path {
            query = query.col_expr(jobs::Column::ModelPath, Expr::value(model_path));
        }
        if let Some(claim_token) = update.claim_token {
            query = query.col_expr(jobs::Column::ClaimToken, Expr::value(claim_token));
        }

        let mut query = query
            .filter(jobs::Column::Id.eq(job_id))
            .filter(jobs::Column::Status.eq(from.as_str()));
        if let Some(lease) = lease {
            query = query.filter(jobs::Column::ClaimToken.eq(lease));
        }

        let result = query.exec(&self.db).await?;
        Ok(result.rows_affected == 1)
    }

    /// Puts back in the queue `processing` jobs whose lease has not been
    /// renewed for `stale_after`; a live worker heartbeats well within that.
    pub async fn recover_abandoned(&self, stale_after: Duration) -> Result<u64, AppError> {
        let stale_after = TimeDelta::from_std(stale_after)
            .map_err(|e| AppError::Internal(format!("Invalid stale threshold: {}", e)))?;
        let now = Utc::now();

        let result = Jobs::update_many()
            .col_expr(jobs::Column::Status, Expr::value(JobStatus::Queued.as_str()))
            .col_expr(jobs::Column::UpdatedAt, Expr::value(now))
            .col_expr(
                jobs::Column::StartedAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(jobs::Column::ClaimToken, Expr::value(Option::<String>::None))
            .filter(jobs::Column::Status.eq(JobStatus::Processing.as_str()))
            .filter(jobs::Column::UpdatedAt.lt(now - stale_after))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

fn parse_status(job: &jobs::Model) -> Result<JobStatus, AppError> {
    job.status.parse::<JobStatus>().map_err(|e| {
        tracing::error!("Job {} has an invalid stored status: {}", job.id, e);
        AppError::NotFound("Job not found".to_string())
    })
}
