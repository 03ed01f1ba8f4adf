//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Result;
use crate::ratelimit::RateLimiter;
use crate::store::CounterStore;

use super::issuance;
use super::middleware::admission;

/// Shared handler state: the decision engine plus the store the issuance
/// endpoint persists into.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub store: Arc<dyn CounterStore>,
}

/// HTTP server for the admission-controlled application.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, limiter: Arc<RateLimiter>, store: Arc<dyn CounterStore>) -> Self {
        Self {
            addr,
            state: AppState { limiter, store },
        }
    }

    /// Build the application router.
    ///
    /// The protected surface sits behind the admission middleware; key
    /// issuance stays outside it so a blocked client can still obtain a key.
    pub fn router(state: AppState) -> Router {
        let protected = Router::new()
            .route("/", get(root))
            .route_layer(middleware::from_fn_with_state(state.clone(), admission));

        Router::new()
            .merge(protected)
            .route("/keys", post(issuance::create_key))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server");

        axum::serve(
            listener,
            Self::router(self.state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;

        Ok(())
    }
}

async fn root() -> &'static str {
    "Hello World"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::REJECTION_MESSAGE;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn test_router(max_requests_per_ip: u32, block_seconds: u64) -> Router {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let limiter = Arc::new(RateLimiter::new(
            store.clone(),
            max_requests_per_ip,
            block_seconds,
        ));
        HttpServer::router(AppState {
            limiter,
            store: store as Arc<dyn CounterStore>,
        })
    }

    fn get_root(ip: &str) -> Request<Body> {
        Request::builder()
            .uri("/")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    }

    fn post_keys(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/keys")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_passes_through() {
        let app = test_router(3, 60);

        let response = app.oneshot(get_root("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "Hello World");
    }

    #[tokio::test]
    async fn test_denied_request_gets_429_with_fixed_message() {
        let app = test_router(3, 60);

        for _ in 0..3 {
            let response = app.clone().oneshot(get_root("10.0.0.1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(get_root("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_string(response).await, REJECTION_MESSAGE);
    }

    #[tokio::test]
    async fn test_request_without_identity_denied() {
        let app = test_router(3, 60);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_issue_key_returns_201_with_identifier() {
        let app = test_router(3, 60);

        let response = app
            .oneshot(post_keys(r#"{"duration_seconds": 3600, "rate_per_second": 10}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["api-key"].as_str().is_some_and(|k| !k.is_empty()));
    }

    #[tokio::test]
    async fn test_issue_key_rejects_non_positive_values() {
        let app = test_router(3, 60);

        let response = app
            .clone()
            .oneshot(post_keys(r#"{"duration_seconds": 0, "rate_per_second": 10}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(post_keys(r#"{"duration_seconds": 3600, "rate_per_second": -5}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_issue_key_rejects_malformed_payload() {
        let app = test_router(3, 60);

        let response = app
            .clone()
            .oneshot(post_keys("not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_keys(r#"{"duration_seconds": 3600}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_issued_key_overrides_ip_limit() {
        let app = test_router(1, 60); // IP limit of one

        let response = app
            .clone()
            .oneshot(post_keys(r#"{"duration_seconds": 3600, "rate_per_second": 5}"#))
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        let key = body["api-key"].as_str().unwrap().to_string();

        for _ in 0..5 {
            let request = Request::builder()
                .uri("/")
                .header("X-Forwarded-For", "10.0.0.9")
                .header("API_KEY", &key)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_issuance_survives_a_blocked_client() {
        let app = test_router(1, 60);

        // exhaust and block the IP on the protected surface
        app.clone().oneshot(get_root("10.0.0.7")).await.unwrap();
        let response = app.clone().oneshot(get_root("10.0.0.7")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // issuance sits outside the admission layer
        let response = app
            .oneshot(post_keys(r#"{"duration_seconds": 3600, "rate_per_second": 2}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}
