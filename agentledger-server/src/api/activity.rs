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

use agentledger_core::{ActivityFilters, ActivityRecord, ActivitySummary, IngestRequest, Signals};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::{blocking, ApiError, AppState};

/// Query parameters shared by list and summary
#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    /// Filter by project_tag
    pub project: Option<String>,
    /// Filter by model
    pub model: Option<String>,
    /// Filter by created_at date (YYYY-MM-DD, UTC)
    pub date: Option<String>,
}

impl From<ActivityQuery> for ActivityFilters {
    fn from(query: ActivityQuery) -> Self {
        ActivityFilters {
            project_tag: query.project,
            model: query.model,
            date: query.date,
        }
    }
}

/// Returned when the store was unreachable and the record was buffered.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueuedResponse {
    pub queued: bool,
    pub queue_file: String,
}

/// POST /api/activity - Ingest one activity
///
/// The server always assigns the id. When the store rejects the write the
/// normalized record goes to the fallback queue and 202 is returned.
pub async fn create_activity(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Response, ApiError> {
    let record = request.into_record(&state.classifier, Utc::now());

    let store = state.store.clone();
    let mut attempt = record.clone();
    let result = blocking(move || store.create(&mut attempt).map(|()| attempt)).await?;

    match result {
        Ok(stored) => {
            debug!(id = %stored.id, category = %stored.category, "Activity stored");
            Ok((StatusCode::CREATED, Json(stored)).into_response())
        }
        Err(store_err) => {
            warn!(
                error = %store_err,
                session_key = %record.session_key,
                "Store rejected activity, buffering to fallback queue"
            );
            match state.flusher.enqueue(record).await {
                Ok(path) => Ok((
                    StatusCode::ACCEPTED,
                    Json(QueuedResponse {
                        queued: true,
                        queue_file: path.display().to_string(),
                    }),
                )
                    .into_response()),
                Err(queue_err) => {
                    error!(error = %queue_err, "Failed to buffer activity");
                    Err(ApiError::Internal("failed to create activity".to_string()))
                }
            }
        }
    }
}

/// GET /api/activity - List activities, newest first
pub async fn list_activities(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<Vec<ActivityRecord>>, ApiError> {
    let filters = ActivityFilters::from(query);
    let store = state.store.clone();
    let records = blocking(move || store.list(&filters)).await??;
    Ok(Json(records))
}

/// GET /api/activity/summary - Aggregated totals
pub async fn activity_summary(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ActivitySummary>, ApiError> {
    let filters = ActivityFilters::from(query);
    let store = state.store.clone();
    let summary = blocking(move || store.summarize(&filters)).await??;
    Ok(Json(summary))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub category: String,
    pub reason: String,
}

/// POST /api/classify - Classify signals without storing anything
pub async fn classify_preview(
    State(state): State<AppState>,
    Json(signals): Json<Signals>,
) -> Json<ClassifyResponse> {
    let classification = state.classifier.classify(&signals);
    Json(ClassifyResponse {
        category: classification.category,
        reason: classification.reason.to_string(),
    })
}
