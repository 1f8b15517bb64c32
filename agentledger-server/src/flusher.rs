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

//! Serialized access to the fallback queue.
//!
//! Every queue operation in the server (startup replay, scheduled replay,
//! manual replay, and enqueueing a record the store rejected) goes through
//! one [`QueueFlusher`]. Its async mutex guarantees that a replay pass never
//! overlaps another pass or an append to a file it is about to rewrite.

use agentledger_core::ActivityRecord;
use agentledger_storage::{
    ActivityStore, FlushError, FlushReport, QueueError, QueueReplayer, QueueWriter,
};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum FlushTaskError {
    #[error(transparent)]
    Flush(#[from] FlushError),

    #[error("queue task failed: {0}")]
    Join(#[from] JoinError),
}

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("queue task failed: {0}")]
    Join(#[from] JoinError),
}

/// Owns the queue directory on behalf of the server.
pub struct QueueFlusher {
    replayer: QueueReplayer,
    writer: QueueWriter,
    store: Arc<dyn ActivityStore>,
    lock: Arc<Mutex<()>>,
}

impl QueueFlusher {
    pub fn new(dir: impl Into<PathBuf>, store: Arc<dyn ActivityStore>) -> Self {
        let dir = dir.into();
        Self {
            replayer: QueueReplayer::new(dir.clone()),
            writer: QueueWriter::new(dir),
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn dir(&self) -> &Path {
        self.replayer.dir()
    }

    /// Run one replay pass, waiting for any pass or enqueue in progress.
    ///
    /// The lock travels with the blocking task, so dropping this future
    /// does not let another operation start before the pass finishes.
    pub async fn flush(&self, cancel: &CancellationToken) -> Result<FlushReport, FlushTaskError> {
        let guard = Arc::clone(&self.lock).lock_owned().await;

        let replayer = self.replayer.clone();
        let store = Arc::clone(&self.store);
        let cancel = cancel.clone();
        let report = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            replayer.flush_with_cancel(&*store, &cancel)
        })
        .await??;
        Ok(report)
    }

    /// Buffer a record the store could not accept.
    pub async fn enqueue(&self, record: ActivityRecord) -> Result<PathBuf, EnqueueError> {
        let guard = Arc::clone(&self.lock).lock_owned().await;

        let writer = self.writer.clone();
        let path = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            writer.enqueue(&record, Utc::now())
        })
        .await??;
        Ok(path)
    }

    /// Replay every `interval` until `cancel` fires.
    ///
    /// The first tick is skipped since startup already runs a pass.
    pub fn spawn_periodic(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let flusher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Scheduled queue replay stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match flusher.flush(&cancel).await {
                            Ok(report) if report.flushed > 0 => tracing::info!(
                                flushed = report.flushed,
                                retained = report.retained,
                                "Scheduled queue replay imported entries"
                            ),
                            Ok(_) => tracing::debug!("Scheduled queue replay found nothing to import"),
                            Err(e) => tracing::warn!(error = %e, "Scheduled queue replay failed"),
                        }
                    }
                }
            }
        })
    }
}
