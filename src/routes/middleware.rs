use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::net::SocketAddr;

use crate::app_state::AppState;
use crate::models::auth::Claims;
use crate::routes::ApiError;
use crate::services::auth::AuthError;
use crate::services::rate_limit::RateDecision;

const RATE_LIMIT_EXEMPT: &[&str] = &["/health", "/metrics"];

/// Authenticated operator with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = state.jwt.verify_admin(token).map_err(|e| {
            tracing::warn!(error = %e, "Rejected admin request");
            e
        })?;

        Ok(AdminUser(claims))
    }
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

/// Per-client fixed-window rate limiting backed by the shared counter store.
///
/// Fails open when the counter store is unreachable.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if RATE_LIMIT_EXEMPT.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_ip(request.headers(), peer);

    match state.rate_limiter.check(&client).await {
        Ok(RateDecision::Allowed { limit, remaining }) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
            headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        Ok(RateDecision::Limited {
            limit,
            retry_after_secs,
        }) => {
            tracing::warn!(client = %client, limit = limit, "Rate limit exceeded");
            metrics::counter!("rate_limited_requests_total").increment(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    (header::RETRY_AFTER, HeaderValue::from(retry_after_secs)),
                    (
                        header::HeaderName::from_static("x-ratelimit-limit"),
                        HeaderValue::from(limit),
                    ),
                ],
                Json(json!({
                    "error": "rate_limited",
                    "message": format!("Rate limit exceeded: {limit} requests per minute"),
                })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(client = %client, error = %e, "Rate limiter unavailable, allowing request");
            next.run(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, None), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.9:5555".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.9");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_ip(&headers, Some(peer)), "198.51.100.2");
        assert_eq!(client_ip(&HeaderMap::new(), None), "unknown");
    }
}
