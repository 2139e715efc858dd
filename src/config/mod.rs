use std::env;
use std::path::PathBuf;

/// Runtime configuration for the execution API and job worker
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Record store connection string (default: local SQLite file)
    pub database_url: String,

    /// Directory holding uploaded images (default: "data/uploads")
    pub upload_dir: PathBuf,

    /// Directory holding generated model artifacts (default: "data/models")
    pub model_dir: PathBuf,

    /// Maximum upload size in bytes (default: 32 MB)
    pub max_file_size: usize,

    /// Base URL used when building model download links
    pub public_base_url: String,

    /// Pose estimator backend: "http" or "noop" (default: "noop")
    pub pose_estimator: String,

    /// Base URL of the external pose estimation service
    pub pose_service_url: Option<String>,

    /// Reconstruction backend: "http" or "noop" (default: "noop")
    pub reconstructor: String,

    /// Base URL of the external 3D reconstruction service
    pub reconstruction_service_url: Option<String>,

    /// Request timeout for collaborator calls in seconds (default: 300)
    pub collaborator_timeout_secs: u64,

    /// Delay between worker polls for queued jobs in seconds (default: 2)
    pub worker_poll_interval_secs: u64,

    /// Maximum queued jobs picked per worker tick (default: 4)
    pub worker_batch_size: u64,

    /// A `processing` job whose lease has not been renewed for this long is
    /// treated as abandoned and requeued (default: 900)
    pub worker_stale_after_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://pifuhd.db?mode=rwc".to_string(),
            upload_dir: PathBuf::from("data/uploads"),
            model_dir: PathBuf::from("data/models"),
            max_file_size: 32 * 1024 * 1024, // 32 MB
            public_base_url: "http://localhost:3000".to_string(),
            pose_estimator: "noop".to_string(),
            pose_service_url: None,
            reconstructor: "noop".to_string(),
            reconstruction_service_url: None,
            collaborator_timeout_secs: 300,
            worker_poll_interval_secs: 2,
            worker_batch_size: 4,
            worker_stale_after_secs: 900,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(default.database_url),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            model_dir: env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.model_dir),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or(default.public_base_url),

            pose_estimator: env::var("POSE_ESTIMATOR").unwrap_or(default.pose_estimator),

            pose_service_url: env::var("POSE_SERVICE_URL")
                .ok()
                .filter(|v| !v.is_empty()),

            reconstructor: env::var("RECONSTRUCTOR").unwrap_or(default.reconstructor),

            reconstruction_service_url: env::var("RECONSTRUCTION_SERVICE_URL")
                .ok()
                .filter(|v| !v.is_empty()),

            collaborator_timeout_secs: env::var("COLLABORATOR_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.collaborator_timeout_secs),

            worker_poll_interval_secs: env::var("WORKER_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.worker_poll_interval_secs),

            worker_batch_size: env::var("WORKER_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.worker_batch_size),

            worker_stale_after_secs: env::var("WORKER_STALE_AFTER_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default.worker_stale_after_secs),
        }
    }

    /// Config for local development and tests: everything under `root`,
    /// no-op collaborators, fast worker polling
    pub fn development(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            database_url: format!("sqlite://{}?mode=rwc", root.join("pifuhd.db").display()),
            upload_dir: root.join("uploads"),
            model_dir: root.join("models"),
            max_file_size: 8 * 1024 * 1024,
            worker_poll_interval_secs: 1,
            ..Self::default()
        }
    }
}
