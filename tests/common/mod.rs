#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use pifuhd_api::config::AppConfig;
use pifuhd_api::infrastructure::{database, storage};
use pifuhd_api::services::pose::{PoseEstimate, PoseEstimator, PoseInput};
use pifuhd_api::services::reconstruction::{ReconstructedMesh, ReconstructionInput, Reconstructor};
use pifuhd_api::services::storage::{BlobStore, StoredBlob};
use pifuhd_api::{AppState, API_PREFIX, create_app};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::AsyncRead;
use tower::ServiceExt;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDRfake image body";
pub const MESH_OBJ: &[u8] = b"v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";

/// Estimator that reports a single nose keypoint for openpose
pub struct MockPoseEstimator;

#[async_trait]
impl PoseEstimator for MockPoseEstimator {
    async fn estimate(&self, input: PoseInput) -> anyhow::Result<PoseEstimate> {
        let keypoints = input.method.produces_keypoints().then(|| {
            serde_json::json!({ "nose": { "x": 0.5, "y": 0.25, "confidence": 0.9 } })
        });
        Ok(PoseEstimate { keypoints })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Estimator whose backend is down
pub struct FailingPoseEstimator;

#[async_trait]
impl PoseEstimator for FailingPoseEstimator {
    async fn estimate(&self, _input: PoseInput) -> anyhow::Result<PoseEstimate> {
        Err(anyhow::anyhow!("pose service unreachable"))
    }

    async fn health_check(&self) -> bool {
        false
    }
}

pub struct MockReconstructor;

#[async_trait]
impl Reconstructor for MockReconstructor {
    async fn reconstruct(&self, _input: ReconstructionInput) -> anyhow::Result<ReconstructedMesh> {
        Ok(ReconstructedMesh {
            obj: Bytes::from_static(MESH_OBJ),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Blob store whose writes always fail
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put_stream<'a>(
        &self,
        _key: &str,
        _reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        _max_size: u64,
    ) -> anyhow::Result<StoredBlob> {
        Err(anyhow::anyhow!("disk full"))
    }

    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        Err(anyhow::anyhow!("missing {}", key))
    }

    async fn open(&self, key: &str) -> anyhow::Result<Box<dyn AsyncRead + Unpin + Send>> {
        Err(anyhow::anyhow!("missing {}", key))
    }

    async fn exists(&self, _key: &str) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn delete(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn location(&self, key: &str) -> String {
        format!("/dev/null/{}", key)
    }

    async fn health_check(&self) -> bool {
        false
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub config: AppConfig,
    pub state: AppState,
    pub app: Router,
}

pub async fn setup() -> TestEnv {
    setup_with(Arc::new(MockPoseEstimator), None).await
}

/// `image_blobs` replaces the on-disk image store when given.
pub async fn setup_with(
    estimator: Arc<dyn PoseEstimator>,
    image_blobs: Option<Arc<dyn BlobStore>>,
) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::development(dir.path());
    let db = database::setup_database(&config).await.unwrap();
    let blobs = storage::setup_blob_stores(&config).await.unwrap();

    let image_store: Arc<dyn BlobStore> = match image_blobs {
        Some(store) => store,
        None => blobs.images,
    };
    let model_store: Arc<dyn BlobStore> = blobs.models;
    let state = AppState::new(db, image_store, model_store, estimator, config.clone());
    let app = create_app(state.clone());

    TestEnv {
        dir,
        config,
        state,
        app,
    }
}

pub fn api(path: &str) -> String {
    format!("{}{}", API_PREFIX, path)
}

pub const BOUNDARY: &str = "---------------------------pifuhdtestboundary";

/// Multipart body; a part with a filename is sent as a file.
pub fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: image/png\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body)
}

pub async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

pub async fn upload(
    app: &Router,
    parts: &[(&str, Option<&str>, &[u8])],
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(api("/upload"))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    send_json(app, request).await
}

pub async fn upload_png(app: &Router, filename: &str) -> String {
    let (status, json) = upload(app, &[("file", Some(filename), PNG_BYTES)]).await;
    assert_eq!(status, StatusCode::OK, "upload failed: {}", json);
    json["image_id"].as_str().unwrap().to_string()
}

pub async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(api(path))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send_json(app, request).await
}

pub async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .uri(api(path))
        .body(Body::empty())
        .unwrap();
    send_json(app, request).await
}

pub async fn prepare(app: &Router, image_id: &str, method: &str) -> String {
    let (status, json) = post_json(
        app,
        "/prepare",
        serde_json::json!({ "image_id": image_id, "method": method }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "prepare failed: {}", json);
    json["pose_data_id"].as_str().unwrap().to_string()
}

pub async fn generate(app: &Router, image_id: &str, pose_data_id: &str) -> String {
    let (status, json) = post_json(
        app,
        "/generate3d",
        serde_json::json!({ "image_id": image_id, "pose_data_id": pose_data_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "generate3d failed: {}", json);
    json["job_id"].as_str().unwrap().to_string()
}
