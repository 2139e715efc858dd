mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use pifuhd_api::entities::{prelude::*, *};
use pifuhd_api::services::pose::NoOpPoseEstimator;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::sync::Arc;

#[tokio::test]
async fn test_upload_then_list() {
    let env = setup().await;

    let image_id = upload_png(&env.app, "a.png").await;
    let (status, json) = get_json(&env.app, "/images").await;

    assert_eq!(status, StatusCode::OK);
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["image_id"], image_id.as_str());
    assert_eq!(record["filename"], "a.png");
    assert_eq!(record["status"], "uploaded");
    assert_eq!(record["content_type"], "image/png");
    assert_eq!(record["size_bytes"], PNG_BYTES.len() as u64);
    assert!(
        record["file_path"]
            .as_str()
            .unwrap()
            .ends_with(&format!("{}-a.png", image_id))
    );

    let stored = std::fs::read(env.config.upload_dir.join(format!("{}-a.png", image_id))).unwrap();
    assert_eq!(stored, PNG_BYTES);
}

#[tokio::test]
async fn test_upload_response_shape() {
    let env = setup().await;

    let (status, json) = upload(&env.app, &[("file", Some("me.png"), PNG_BYTES)]).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert!(uuid::Uuid::parse_str(json["image_id"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_uploads_get_distinct_ids() {
    let env = setup().await;

    let first = upload_png(&env.app, "same.png").await;
    let second = upload_png(&env.app, "same.png").await;

    assert_ne!(first, second);
    let (_, json) = get_json(&env.app, "/images").await;
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_listing() {
    let env = setup().await;

    let (status, json) = get_json(&env.app, "/images").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let env = setup().await;

    let (status, json) = upload(&env.app, &[("note", None, b"hello")]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("No file"));
}

#[tokio::test]
async fn test_empty_file_is_rejected() {
    let env = setup().await;

    let (status, _) = upload(&env.app, &[("file", Some("empty.png"), b"")]).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, json) = get_json(&env.app, "/images").await;
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn test_executable_upload_is_rejected() {
    let env = setup().await;

    let (status, _) = upload(
        &env.app,
        &[("file", Some("photo.png"), b"MZ\x90\x00\x03\x00\x00\x00")],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_client_supplied_id_is_used_once() {
    let env = setup().await;
    let requested = uuid::Uuid::new_v4().to_string();

    let (status, json) = upload(
        &env.app,
        &[
            ("image_id", None, requested.as_bytes()),
            ("file", Some("retry.png"), PNG_BYTES),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["image_id"], requested.as_str());

    let (status, _) = upload(
        &env.app,
        &[
            ("image_id", None, requested.as_bytes()),
            ("file", Some("retry.png"), PNG_BYTES),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, json) = get_json(&env.app, "/images").await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_client_id_is_rejected() {
    let env = setup().await;

    let (status, _) = upload(
        &env.app,
        &[
            ("image_id", None, b"../../etc/passwd"),
            ("file", Some("a.png"), PNG_BYTES),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_blob_write_leaves_no_record() {
    let env = setup_with(Arc::new(MockPoseEstimator), Some(Arc::new(FailingBlobStore))).await;

    let (status, json) = upload(&env.app, &[("file", Some("a.png"), PNG_BYTES)]).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("disk full"));
    let (_, json) = get_json(&env.app, "/images").await;
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn test_oversized_upload_is_rejected_without_record() {
    let env = setup().await;
    let mut payload = PNG_BYTES.to_vec();
    payload.resize(env.config.max_file_size + 1, 0);

    let (status, json) = upload(&env.app, &[("file", Some("huge.png"), &payload)]).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json["error"].as_str().unwrap().contains("maximum"));
    let (_, json) = get_json(&env.app, "/images").await;
    assert_eq!(json, serde_json::json!([]));
    assert_eq!(std::fs::read_dir(&env.config.upload_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_listing_reports_store_fault() {
    let env = setup().await;
    env.state
        .db
        .execute_unprepared("DROP TABLE images")
        .await
        .unwrap();

    let (status, json) = get_json(&env.app, "/images").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = json["error"].as_str().unwrap();
    assert!(message.starts_with("Database error"));
    assert!(message.contains("no such table"));
}

#[tokio::test]
async fn test_prepare_with_keypoints() {
    let env = setup().await;
    let image_id = upload_png(&env.app, "pose.png").await;

    let (status, json) = post_json(
        &env.app,
        "/prepare",
        serde_json::json!({ "image_id": image_id, "method": "openpose" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert!(!json["pose_data_id"].as_str().unwrap().is_empty());
    assert_eq!(json["keypoints"]["nose"]["x"], 0.5);

    let (_, images) = get_json(&env.app, "/images").await;
    assert_eq!(images[0]["status"], "pose_prepared");
}

#[tokio::test]
async fn test_prepare_lightweight_returns_null_keypoints() {
    let env = setup_with(Arc::new(NoOpPoseEstimator), None).await;
    let image_id = upload_png(&env.app, "pose.png").await;

    let (status, json) = post_json(
        &env.app,
        "/prepare",
        serde_json::json!({ "image_id": image_id, "method": "lightweight" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert!(json["keypoints"].is_null());
}

#[tokio::test]
async fn test_prepare_reports_pose_service_failure() {
    let env = setup_with(Arc::new(FailingPoseEstimator), None).await;
    let image_id = upload_png(&env.app, "pose.png").await;

    let (status, json) = post_json(
        &env.app,
        "/prepare",
        serde_json::json!({ "image_id": image_id, "method": "openpose" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("pose service unreachable")
    );
    assert!(PoseData::find().all(&env.state.db).await.unwrap().is_empty());
    let (_, images) = get_json(&env.app, "/images").await;
    assert_eq!(images[0]["status"], "uploaded");
}

#[tokio::test]
async fn test_prepare_twice_yields_distinct_pose_data() {
    let env = setup().await;
    let image_id = upload_png(&env.app, "pose.png").await;

    let first = prepare(&env.app, &image_id, "openpose").await;
    let second = prepare(&env.app, &image_id, "lightweight").await;

    assert_ne!(first, second);
}

#[tokio::test]
async fn test_prepare_rejects_unknown_method() {
    let env = setup().await;
    let image_id = upload_png(&env.app, "pose.png").await;

    let (status, _) = post_json(
        &env.app,
        "/prepare",
        serde_json::json!({ "image_id": image_id, "method": "densepose" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_prepare_unknown_image() {
    let env = setup().await;

    let (status, json) = post_json(
        &env.app,
        "/prepare",
        serde_json::json!({ "image_id": uuid::Uuid::new_v4().to_string(), "method": "openpose" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_prepare_rejects_malformed_json() {
    let env = setup().await;

    let request = Request::builder()
        .method("POST")
        .uri(api("/prepare"))
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = send(&env.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_queues_job() {
    let env = setup().await;
    let image_id = upload_png(&env.app, "body.png").await;
    let pose_data_id = prepare(&env.app, &image_id, "openpose").await;

    let (status, json) = post_json(
        &env.app,
        "/generate3d",
        serde_json::json!({ "image_id": image_id, "pose_data_id": pose_data_id }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "queued");
    let job_id = json["job_id"].as_str().unwrap().to_string();

    let (status, json) = get_json(&env.app, &format!("/status/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["job_id"], job_id.as_str());
    assert_eq!(json["status"], "queued");
    assert!(json.get("error").is_none());

    let other = generate(&env.app, &image_id, &pose_data_id).await;
    assert_ne!(other, job_id);
}

#[tokio::test]
async fn test_generate_rejects_mismatched_pose_data() {
    let env = setup().await;
    let first = upload_png(&env.app, "one.png").await;
    let second = upload_png(&env.app, "two.png").await;
    let pose_data_id = prepare(&env.app, &first, "openpose").await;

    let (status, _) = post_json(
        &env.app,
        "/generate3d",
        serde_json::json!({ "image_id": second, "pose_data_id": pose_data_id }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_generate_with_unknown_references() {
    let env = setup().await;
    let image_id = upload_png(&env.app, "one.png").await;

    let (status, _) = post_json(
        &env.app,
        "/generate3d",
        serde_json::json!({ "image_id": image_id, "pose_data_id": "missing" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(
        &env.app,
        "/generate3d",
        serde_json::json!({ "image_id": "missing", "pose_data_id": "missing" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_of_unknown_job() {
    let env = setup().await;

    let (status, json) = get_json(&env.app, "/status/does-not-exist").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Job not found");
}

#[tokio::test]
async fn test_corrupt_stored_status_reads_as_not_found() {
    let env = setup().await;
    let image_id = upload_png(&env.app, "body.png").await;
    let pose_data_id = prepare(&env.app, &image_id, "openpose").await;
    let job_id = generate(&env.app, &image_id, &pose_data_id).await;

    Jobs::update_many()
        .col_expr(jobs::Column::Status, Expr::value("exploded"))
        .filter(jobs::Column::Id.eq(job_id.as_str()))
        .exec(&env.state.db)
        .await
        .unwrap();

    let (status, _) = get_json(&env.app, &format!("/status/{}", job_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_model_of_queued_job_is_not_ready() {
    let env = setup().await;
    let image_id = upload_png(&env.app, "body.png").await;
    let pose_data_id = prepare(&env.app, &image_id, "openpose").await;
    let job_id = generate(&env.app, &image_id, &pose_data_id).await;

    let (status, _) = get_json(&env.app, &format!("/model/{}", job_id)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = get_json(&env.app, &format!("/model/{}/file", job_id)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = get_json(&env.app, "/model/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_and_request_id() {
    let env = setup().await;

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "trace-me")
        .body(Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(env.app.clone(), request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "trace-me");

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, json) = send_json(&env.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["database"], "connected");
}

#[tokio::test]
async fn test_openapi_document_lists_pipeline() {
    let env = setup().await;

    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send_json(&env.app, request).await;

    assert_eq!(status, StatusCode::OK);
    let paths = json["paths"].as_object().unwrap();
    assert!(paths.contains_key("/pifuhd/api/v1/execution/upload"));
    assert!(paths.contains_key("/pifuhd/api/v1/execution/status/{job_id}"));
}
