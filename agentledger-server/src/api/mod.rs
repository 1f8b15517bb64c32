// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

pub mod activity;
pub mod health;
pub mod queue;

use agentledger_core::Classifier;
use agentledger_storage::{ActivityStore, StoreError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::flusher::QueueFlusher;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidDateFilter(e) => ApiError::BadRequest(e.to_string()),
            other => {
                tracing::error!(error = %other, "Store query failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ActivityStore>,
    pub classifier: Classifier,
    pub flusher: Arc<QueueFlusher>,
    /// Cancelled on shutdown; in-flight replay passes stop at the next file.
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        classifier: Classifier,
        flusher: Arc<QueueFlusher>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            classifier,
            flusher,
            shutdown,
            started_at: Instant::now(),
        }
    }
}

/// Build the API router (without transport layers).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/activity",
            post(activity::create_activity).get(activity::list_activities),
        )
        .route("/api/activity/summary", get(activity::activity_summary))
        .route("/api/classify", post(activity::classify_preview))
        .route("/api/queue", get(queue::queue_status))
        .route("/api/queue/flush", post(queue::flush_queue))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound("no such route".to_string())
}

/// Run blocking store work off the async runtime.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))
}
