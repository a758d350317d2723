//! In-process test harness: the full router wired to in-memory collaborators.
#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use casabricks::app_state::{AppState, UploadPolicy};
use casabricks::db::MemoryImageStore;
use casabricks::models::auth::UserRole;
use casabricks::routes;
use casabricks::services::auth::JwtKeys;
use casabricks::services::enhancement::EnhancementService;
use casabricks::services::enhancer::StubEnhancementClient;
use casabricks::services::rate_limit::{MemoryCounterStore, RateLimiter};
use casabricks::services::signature::{WebhookVerifier, SIGNATURE_HEADER};
use casabricks::services::storage::MemoryObjectStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const WEBHOOK_URL: &str = "http://localhost:8000/api/v1/webhooks/ai-enhancement";
pub const BOUNDARY: &str = "casabricks-test-boundary";
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryImageStore>,
    pub client: Arc<StubEnhancementClient>,
    pub objects: Arc<MemoryObjectStore>,
    pub verifier: WebhookVerifier,
    pub jwt: JwtKeys,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_rate_limit(1_000)
    }

    pub fn with_rate_limit(limit_per_minute: u64) -> Self {
        let store = Arc::new(MemoryImageStore::new());
        let client = Arc::new(StubEnhancementClient::new());
        let objects = Arc::new(MemoryObjectStore::new("https://cdn.test"));
        let verifier = WebhookVerifier::new(WEBHOOK_SECRET).unwrap();

        let enhancement = EnhancementService::new(
            store.clone(),
            client.clone(),
            objects.clone(),
            verifier.clone(),
            WEBHOOK_URL.to_string(),
        );
        let rate_limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()), limit_per_minute);

        let state = AppState::new(
            store.clone(),
            objects.clone(),
            enhancement,
            rate_limiter,
            JwtKeys::new(JWT_SECRET),
            UploadPolicy::default(),
        );

        Self {
            router: routes::router(state),
            store,
            client,
            objects,
            verifier,
            jwt: JwtKeys::new(JWT_SECRET),
        }
    }

    pub fn token(&self, role: UserRole) -> String {
        self.jwt.issue("operator-1", role, Duration::hours(1)).unwrap()
    }

    pub fn admin_token(&self) -> String {
        self.token(UserRole::Admin)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn upload(&self, property_id: Uuid, file_name: &str, data: &[u8]) -> (StatusCode, Value) {
        let request = Request::post(format!("/api/v1/admin/properties/{property_id}/images"))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.admin_token()))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(file_name, data, "front_exterior")))
            .unwrap();
        self.send(request).await
    }

    /// Upload a PNG to a fresh property and return the new image id.
    pub async fn uploaded_image(&self) -> Uuid {
        let property_id = self.store.add_property("villa");
        let (status, body) = self.upload(property_id, "front.png", PNG_BYTES).await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {body}");
        body["id"].as_str().unwrap().parse().unwrap()
    }

    pub async fn enhance(&self, image_id: Uuid) -> (StatusCode, Value) {
        let request = Request::post(format!("/api/v1/admin/images/{image_id}/enhance"))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.admin_token()))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn get_image(&self, image_id: Uuid) -> (StatusCode, Value) {
        let request = Request::get(format!("/api/v1/admin/images/{image_id}"))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.admin_token()))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn webhook(&self, payload: &Value) -> (StatusCode, Value) {
        let body = serde_json::to_vec(payload).unwrap();
        let signature = self.verifier.sign(&body).unwrap();
        self.webhook_with_signature(body, Some(&signature)).await
    }

    pub async fn webhook_with_signature(
        &self,
        body: Vec<u8>,
        signature: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut request = Request::post("/api/v1/webhooks/ai-enhancement")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        self.send(request.body(Body::from(body)).unwrap()).await
    }
}

pub fn multipart_body(file_name: &str, data: &[u8], image_type: &str) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(
        format!(
            "\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image_type\"\r\n\r\n{image_type}\r\n--{BOUNDARY}--\r\n"
        )
        .as_bytes(),
    );
    body
}
