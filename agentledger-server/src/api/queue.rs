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

use agentledger_storage::{FlushReport, QueueFileStatus};
use axum::{extract::State, Json};
use serde::Serialize;

use super::{blocking, ApiError, AppState};
use crate::flusher::FlushTaskError;

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub dir: String,
    pub files: Vec<QueueFileStatus>,
    pub pending: usize,
}

/// GET /api/queue - Pending entries per queue file
pub async fn queue_status(
    State(state): State<AppState>,
) -> Result<Json<QueueStatusResponse>, ApiError> {
    let dir = state.flusher.dir().to_path_buf();
    let scan_dir = dir.clone();
    let files = blocking(move || agentledger_storage::inspect(&scan_dir))
        .await?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(QueueStatusResponse {
        dir: dir.display().to_string(),
        pending: files.iter().map(|f| f.entries).sum(),
        files,
    }))
}

/// POST /api/queue/flush - Run one replay pass now
///
/// Waits for any pass already in progress, then runs its own.
pub async fn flush_queue(State(state): State<AppState>) -> Result<Json<FlushReport>, ApiError> {
    match state.flusher.flush(&state.shutdown).await {
        Ok(report) => Ok(Json(report)),
        Err(FlushTaskError::Flush(e)) => {
            tracing::warn!(flushed = e.flushed, error = %e, "Manual queue replay aborted");
            Err(ApiError::Internal(e.to_string()))
        }
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}
