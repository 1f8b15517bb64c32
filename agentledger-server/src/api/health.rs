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

use agentledger_storage::StoreHealth;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::debug;

use super::{blocking, ApiError, AppState};

/// Health check response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub storage: StoreHealth,
    pub queue_dir: String,
}

/// GET /health
///
/// 503 when the store cannot be reached; ingestion still works through the
/// fallback queue in that state.
pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    debug!("Health check requested");

    let store = state.store.clone();
    let storage = blocking(move || store.health()).await?;

    let health = HealthResponse {
        status: if storage.reachable {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        queue_dir: state.flusher.dir().display().to_string(),
        storage,
    };

    let status_code = if health.storage.reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    Ok((status_code, Json(health)))
}
