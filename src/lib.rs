pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::image_service::ImageService;
use crate::services::job_service::JobService;
use crate::services::pose::PoseEstimator;
use crate::services::pose_service::PoseService;
use crate::services::storage::BlobStore;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Every pipeline endpoint lives under this path
pub const API_PREFIX: &str = "/pifuhd/api/v1/execution";

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::images::upload_image,
        api::handlers::images::list_images,
        api::handlers::pose::prepare_pose_data,
        api::handlers::jobs::generate_3d_model,
        api::handlers::jobs::check_status,
        api::handlers::jobs::retrieve_3d_model,
        api::handlers::jobs::download_3d_model,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::types::ImageUploadResponse,
            api::handlers::types::ImageRecordResponse,
            api::handlers::types::PoseDataRequest,
            api::handlers::types::PoseDataResponse,
            api::handlers::types::Generate3DRequest,
            api::handlers::types::JobStatusResponse,
            api::handlers::types::ModelResponse,
            api::handlers::health::HealthResponse,
            models::JobStatus,
            models::PoseMethod,
        )
    ),
    tags(
        (name = "images", description = "Image upload and listing"),
        (name = "pipeline", description = "Pose preparation and 3D generation jobs"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub image_blobs: Arc<dyn BlobStore>,
    pub model_blobs: Arc<dyn BlobStore>,
    pub images: Arc<ImageService>,
    pub poses: Arc<PoseService>,
    pub jobs: Arc<JobService>,
    pub config: AppConfig,
}

impl AppState {
    /// Wires the services on top of the record store and blob stores.
    pub fn new(
        db: DatabaseConnection,
        image_blobs: Arc<dyn BlobStore>,
        model_blobs: Arc<dyn BlobStore>,
        estimator: Arc<dyn PoseEstimator>,
        config: AppConfig,
    ) -> Self {
        let images = Arc::new(ImageService::new(
            db.clone(),
            image_blobs.clone(),
            config.clone(),
        ));
        let poses = Arc::new(PoseService::new(db.clone(), images.clone(), estimator));
        let jobs = Arc::new(JobService::new(
            db.clone(),
            images.clone(),
            poses.clone(),
            model_blobs.clone(),
            config.clone(),
        ));

        Self {
            db,
            image_blobs,
            model_blobs,
            images,
            poses,
            jobs,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let pipeline = Router::new()
        .route("/images", get(api::handlers::images::list_images))
        .route(
            "/upload",
            post(api::handlers::images::upload_image).layer(
                axum::extract::DefaultBodyLimit::max(
                    state.config.max_file_size + 1024 * 1024, // multipart framing
                ),
            ),
        )
        .route("/prepare", post(api::handlers::pose::prepare_pose_data))
        .route("/generate3d", post(api::handlers::jobs::generate_3d_model))
        .route("/status/:job_id", get(api::handlers::jobs::check_status))
        .route("/model/:job_id", get(api::handlers::jobs::retrieve_3d_model))
        .route(
            "/model/:job_id/file",
            get(api::handlers::jobs::download_3d_model),
        );

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .nest(API_PREFIX, pipeline)
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
