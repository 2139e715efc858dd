use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::entities::jobs;
use crate::models::{ImageStatus, JobStatus};
use crate::services::image_service::ImageService;
use crate::services::job_service::{JobService, JobUpdate, model_blob_key};
use crate::services::pose_service::PoseService;
use crate::services::reconstruction::{ReconstructionInput, Reconstructor};
use crate::services::storage::BlobStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Polling and lease timings for a `JobWorker`
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub batch_size: u64,
    /// Lease age after which a `processing` job counts as abandoned
    pub stale_after: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.worker_poll_interval_secs.max(1)),
            batch_size: config.worker_batch_size.max(1),
            stale_after: Duration::from_secs(config.worker_stale_after_secs.max(1)),
        }
    }

    /// Leases are renewed three times per stale window.
    fn heartbeat_interval(&self) -> Duration {
        (self.stale_after / 3).max(Duration::from_millis(10))
    }
}

/// Drives queued generation jobs through the reconstruction backend.
pub struct JobWorker {
    jobs: Arc<JobService>,
    images: Arc<ImageService>,
    poses: Arc<PoseService>,
    models: Arc<dyn BlobStore>,
    reconstructor: Arc<dyn Reconstructor>,
    settings: WorkerSettings,
    shutdown: watch::Receiver<bool>,
}

impl JobWorker {
    pub fn new(
        jobs: Arc<JobService>,
        images: Arc<ImageService>,
        poses: Arc<PoseService>,
        models: Arc<dyn BlobStore>,
        reconstructor: Arc<dyn Reconstructor>,
        settings: WorkerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            jobs,
            images,
            poses,
            models,
            reconstructor,
            settings,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Job worker started");

        loop {
            self.recover_stale().await;

            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Job worker shutting down");
                    break;
                }
                _ = sleep(self.settings.poll_interval) => {
                    self.process_queued().await;
                }
            }
        }
    }

    /// Requeues jobs whose worker stopped renewing its lease.
    async fn recover_stale(&self) {
        match self.jobs.recover_abandoned(self.settings.stale_after).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!("♻️  Requeued {} job(s) with an expired lease", n),
            Err(e) => tracing::error!("Failed to recover abandoned jobs: {}", e),
        }
    }

    /// Runs one polling pass; returns how many jobs this worker claimed.
    pub async fn process_queued(&self) -> usize {
        let queued = match self.jobs.next_queued(self.settings.batch_size).await {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!("Failed to fetch queued jobs: {}", e);
                return 0;
            }
        };

        let mut claimed = 0;
        for job in queued {
            match self.jobs.claim(&job.id).await {
                Ok(Some(token)) => {
                    claimed += 1;
                    self.process_job(job, &token).await;
                }
                Ok(None) => tracing::debug!("Job {} claimed elsewhere", job.id),
                Err(e) => tracing::error!("Failed to claim job {}: {}", job.id, e),
            }
        }
        claimed
    }

    async fn process_job(&self, job: jobs::Model, token: &str) {
        tracing::info!("⚙️  Processing job {}", job.id);

        let work = self.generate(&job, token);
        tokio::pin!(work);
        let mut heartbeat = tokio::time::interval(self.settings.heartbeat_interval());
        heartbeat.tick().await;

        let outcome = loop {
            tokio::select! {
                result = &mut work => break result,
                _ = heartbeat.tick() => match self.jobs.heartbeat(&job.id, token).await {
                    Ok(true) => {}
                    Ok(false) => tracing::warn!("Job {} lost its lease while processing", job.id),
                    Err(e) => tracing::warn!("Failed to renew lease on job {}: {}", job.id, e),
                },
            }
        };

        let (to, update) = match outcome {
            Ok(model_path) => (
                JobStatus::Completed,
                JobUpdate {
                    model_path: Some(model_path),
                    ..JobUpdate::default()
                },
            ),
            Err(e) => {
                tracing::error!("❌ Job {} failed: {}", job.id, e);
                (
                    JobStatus::Error,
                    JobUpdate {
                        error: Some(e.to_string()),
                        ..JobUpdate::default()
                    },
                )
            }
        };

        match self.jobs.finish(&job.id, token, to, update).await {
            Ok(true) if to == JobStatus::Completed => {
                if let Err(e) = self
                    .images
                    .advance_status(
                        &job.image_id,
                        &[ImageStatus::Uploaded, ImageStatus::PosePrepared],
                        ImageStatus::Reconstructed,
                    )
                    .await
                {
                    tracing::warn!("Failed to mark image {} reconstructed: {}", job.image_id, e);
                }
                tracing::info!("✅ Job {} completed", job.id);
            }
            Ok(true) => {}
            Ok(false) => tracing::warn!("Job {} changed hands before it finished", job.id),
            Err(e) => tracing::error!("Failed to record outcome of job {}: {}", job.id, e),
        }
    }

    /// Reconstructs the mesh and stores it; returns the artifact location.
    async fn generate(&self, job: &jobs::Model, token: &str) -> Result<String, AppError> {
        let image = self.images.get(&job.image_id).await?;
        let pose = self.poses.get(&job.pose_data_id).await?;
        let bytes = self.images.read_bytes(&image).await?;

        let mesh = self
            .reconstructor
            .reconstruct(ReconstructionInput {
                job_id: job.id.clone(),
                image_id: image.id.clone(),
                filename: image.filename.clone(),
                content_type: image.content_type.clone(),
                image: bytes,
                method: pose.method,
                keypoints: pose.keypoints,
            })
            .await
            .map_err(|e| AppError::Upstream(format!("Reconstruction failed: {:#}", e)))?;

        // Only the lease holder may touch the artifact
        if !self.jobs.heartbeat(&job.id, token).await? {
            return Err(AppError::Conflict(format!(
                "Job {} is no longer leased to this worker",
                job.id
            )));
        }

        // A requeued job may have written its artifact before the restart
        let key = model_blob_key(&job.id);
        self.models
            .delete(&key)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        self.models
            .put_stream(&key, Box::new(std::io::Cursor::new(mesh.obj)), u64::MAX)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to store model: {:#}", e)))?;

        Ok(self.models.location(&key))
    }
}
