//! Admission middleware.
//!
//! Resolves the caller's identity (client IP and optional `API_KEY` header),
//! asks the decision engine for a verdict, and either forwards the request
//! unmodified or answers 429. No admission logic lives here.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::server::AppState;

/// Header carrying an issued API key.
pub const API_KEY_HEADER: &str = "API_KEY";

/// Fixed body returned with every 429.
pub const REJECTION_MESSAGE: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Axum middleware enforcing the engine's verdict on every protected route.
pub async fn admission(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request, connect_info.as_ref()).unwrap_or_default();
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if state.limiter.allow(&ip, &api_key).await {
        next.run(request).await
    } else {
        (StatusCode::TOO_MANY_REQUESTS, REJECTION_MESSAGE).into_response()
    }
}

/// Resolve the client IP, checking forwarded headers before the socket peer.
///
/// Order of precedence:
/// 1. X-Forwarded-For header (first IP in the list)
/// 2. X-Real-IP header
/// 3. ConnectInfo socket address
fn extract_client_ip<B>(
    request: &axum::http::Request<B>,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> Option<String> {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first_ip) = forwarded.split(',').next() {
            return Some(first_ip.trim().to_string());
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
    {
        return Some(real_ip.to_string());
    }

    connect_info.map(|ci| ci.0.ip().to_string())
}
