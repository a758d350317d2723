//! HTTP-level tests of the image and webhook endpoints against in-memory collaborators.

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use casabricks::db::ImageStore;
use casabricks::models::auth::UserRole;
use helpers::*;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_health_reports_components() {
    let app = TestApp::new();
    let (status, body) = app
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["database"]["status"], "ok");
    assert_eq!(body["checks"]["redis"]["status"], "ok");
}

#[tokio::test]
async fn test_upload_enhance_and_complete() {
    let app = TestApp::new();
    let image_id = app.uploaded_image().await;

    let (status, body) = app.get_image(image_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert!(body["enhanced_url"].is_null());

    app.client.push_job_id("J1");
    let (status, body) = app.enhance(image_id).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["ai_job_id"], "J1");
    assert_eq!(body["status"], "processing");

    let submitted = app.client.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].job_id, image_id.to_string());
    assert_eq!(submitted[0].webhook_url, WEBHOOK_URL);

    app.client.add_asset("https://ai.test/out/J1.png", PNG_BYTES);
    let (status, body) = app
        .webhook(&json!({
            "job_id": "J1",
            "status": "success",
            "enhanced_image_url": "https://ai.test/out/J1.png",
            "processing_time_seconds": 42,
            "image_id": image_id,
        }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);

    let (_, body) = app.get_image(image_id).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["job_id"], "J1");
    let enhanced_url = body["enhanced_url"].as_str().unwrap();
    assert!(enhanced_url.starts_with("https://cdn.test/enhanced/"));
    assert!(app
        .objects
        .contains(&format!("enhanced/{image_id}/J1.png")));
}

#[tokio::test]
async fn test_duplicate_webhook_is_acknowledged_without_change() {
    let app = TestApp::new();
    let image_id = app.uploaded_image().await;
    app.client.push_job_id("J1");
    app.enhance(image_id).await;

    let payload = json!({
        "job_id": "J1",
        "status": "failed",
        "error_message": "model crashed",
    });
    let (status, _) = app.webhook(&payload).await;
    assert_eq!(status, StatusCode::OK);
    let first = app.store.get(image_id).await.unwrap().unwrap();
    assert_eq!(first.enhancement_error.as_deref(), Some("model crashed"));

    let (status, body) = app.webhook(&payload).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Duplicate or stale webhook ignored");
    assert_eq!(app.store.get(image_id).await.unwrap().unwrap(), first);
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_rejected() {
    let app = TestApp::new();
    let image_id = app.uploaded_image().await;
    app.client.push_job_id("J1");
    app.enhance(image_id).await;

    let body = serde_json::to_vec(&json!({"job_id": "J1", "status": "failed"})).unwrap();
    let (status, response) = app
        .webhook_with_signature(body.clone(), Some("deadbeef"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], "unauthorized");

    let (status, _) = app.webhook_with_signature(body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, image) = app.get_image(image_id).await;
    assert_eq!(image["status"], "processing");
}

#[tokio::test]
async fn test_webhook_for_unknown_image_is_acknowledged() {
    let app = TestApp::new();
    let (status, body) = app
        .webhook(&json!({
            "job_id": "nobody",
            "status": "success",
            "enhanced_image_url": "https://ai.test/out.png",
            "image_id": Uuid::new_v4(),
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_malformed_webhook_is_bad_request() {
    let app = TestApp::new();
    let (status, body) = app.webhook(&json!({"status": "success"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_enhance_while_processing_conflicts() {
    let app = TestApp::new();
    let image_id = app.uploaded_image().await;
    app.client.push_job_id("J1");
    assert_eq!(app.enhance(image_id).await.0, StatusCode::OK);

    let (status, body) = app.enhance(image_id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
    assert_eq!(app.client.submitted().len(), 1);
}

#[tokio::test]
async fn test_enhance_with_unreachable_service_is_bad_gateway() {
    let app = TestApp::new();
    let image_id = app.uploaded_image().await;
    app.client.set_unavailable(true);

    let (status, body) = app.enhance(image_id).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "upstream_unavailable");

    let (_, image) = app.get_image(image_id).await;
    assert_eq!(image["status"], "pending");
    assert!(image["job_id"].is_null());
}

#[tokio::test]
async fn test_enhance_unknown_image_is_not_found() {
    let app = TestApp::new();
    let (status, _) = app.enhance(Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes_require_admin_token() {
    let app = TestApp::new();
    let image_id = app.uploaded_image().await;

    let (status, _) = app
        .send(
            Request::get(format!("/api/v1/admin/images/{image_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Request::get(format!("/api/v1/admin/images/{image_id}"))
                .header(
                    header::AUTHORIZATION,
                    format!("Bearer {}", app.token(UserRole::Agent)),
                )
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Request::get(format!("/api/v1/admin/images/{image_id}"))
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upload_rejects_bad_input() {
    let app = TestApp::new();
    let property_id = app.store.add_property("flat");

    let (status, _) = app.upload(property_id, "notes.txt", b"hello").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.upload(property_id, "fake.png", b"plain text").await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, _) = app.upload(Uuid::new_v4(), "front.png", PNG_BYTES).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(app.objects.is_empty());
}

#[tokio::test]
async fn test_delete_removes_record_and_objects() {
    let app = TestApp::new();
    let image_id = app.uploaded_image().await;
    assert_eq!(app.objects.len(), 1);

    let (status, _) = app
        .send(
            Request::delete(format!("/api/v1/admin/images/{image_id}"))
                .header(header::AUTHORIZATION, format!("Bearer {}", app.admin_token()))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.objects.is_empty());
    assert_eq!(app.get_image(image_id).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rate_limit_per_client() {
    let app = TestApp::with_rate_limit(2);
    let request = |ip: &str| {
        Request::get(format!("/api/v1/admin/images/{}", Uuid::new_v4()))
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.send(request("203.0.113.1")).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(app.send(request("203.0.113.1")).await.0, StatusCode::UNAUTHORIZED);
    let (status, body) = app.send(request("203.0.113.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    assert_eq!(app.send(request("203.0.113.2")).await.0, StatusCode::UNAUTHORIZED);

    // Health stays reachable under limit.
    let (status, _) = app
        .send(
            Request::get("/health")
                .header("x-forwarded-for", "203.0.113.1")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}
