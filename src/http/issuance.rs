//! API key issuance endpoint.

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::store::ApiKeyRecord;

use super::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    /// How long the key stays valid, from now
    pub duration_seconds: u64,
    /// The key's own requests-per-second quota
    pub rate_per_second: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    #[serde(rename = "api-key")]
    pub api_key: String,
}

/// `POST /keys`: mint a key with a fresh random identifier.
///
/// Malformed payloads and non-positive values are 400. Negative numbers fail
/// deserialization into the unsigned fields, so they arrive here as a
/// `JsonRejection` and get the same 400 (axum's default for those would be
/// 422).
pub async fn create_key(
    State(state): State<AppState>,
    payload: Result<Json<CreateKeyRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            debug!(error = %rejection, "Rejecting malformed key issuance request");
            return (StatusCode::BAD_REQUEST, "invalid key issuance request").into_response();
        }
    };

    if request.duration_seconds == 0 || request.rate_per_second == 0 {
        return (
            StatusCode::BAD_REQUEST,
            "duration_seconds and rate_per_second must be positive",
        )
            .into_response();
    }

    let record = ApiKeyRecord::generate(
        Duration::from_secs(request.duration_seconds),
        request.rate_per_second,
    );

    match state.store.save_key(&record).await {
        Ok(()) => {
            info!(
                rate = record.rate_per_second,
                expiration = %record.expiration,
                "Issued API key"
            );
            (
                StatusCode::CREATED,
                Json(CreateKeyResponse {
                    api_key: record.identifier,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to persist API key");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to persist api key").into_response()
        }
    }
}
