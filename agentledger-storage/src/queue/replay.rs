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

//! Queue Replayer
//!
//! Drains queue files into an [`ActivityStore`]. Each file goes through one
//! read, decode, persist, compact cycle:
//!
//! - malformed entries are retained byte-for-byte and never retried against
//!   the store;
//! - valid entries get the ingestion defaults and one `create` attempt;
//!   only `Ok` drops them, any error keeps the original payload;
//! - a file with nothing left is deleted, otherwise it is replaced whole
//!   (temp sibling + rename) with the survivors under a fresh header.
//!
//! A filesystem failure aborts the pass and reports how many entries were
//! already persisted. Rerunning the pass is always safe: persisted entries
//! are gone from disk, survivors are retried.

use agentledger_core::apply_defaults;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::format::{parse_entries, render_file};
use super::{file_label, list_queue_files, QueueError};
use crate::store::ActivityStore;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Entries persisted and removed from the queue.
    pub flushed: usize,
    /// Entries left on disk (store rejections and malformed payloads).
    pub retained: usize,
    /// Retained entries whose payload does not decode.
    pub malformed: usize,
    pub files_deleted: usize,
    pub files_rewritten: usize,
    /// The pass stopped early at a file boundary.
    pub cancelled: bool,
}

/// A replay pass aborted by a filesystem failure.
#[derive(Debug, Error)]
#[error("queue replay aborted after flushing {flushed} entries: {source}")]
pub struct FlushError {
    /// Entries persisted before the failure. These are not replayed again.
    pub flushed: usize,
    #[source]
    pub source: QueueError,
}

/// Replays one queue directory into a store.
///
/// Not safe to run concurrently against the same directory; callers
/// serialize passes.
#[derive(Clone)]
pub struct QueueReplayer {
    dir: PathBuf,
    clock: Clock,
}

impl std::fmt::Debug for QueueReplayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueReplayer").field("dir", &self.dir).finish()
    }
}

impl QueueReplayer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Override the time source used to stamp records lacking `created_at`.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run one full pass.
    pub fn flush<S>(&self, store: &S) -> Result<FlushReport, FlushError>
    where
        S: ActivityStore + ?Sized,
    {
        self.flush_with_cancel(store, &CancellationToken::new())
    }

    /// Run one pass, stopping at the next file boundary once `cancel` fires.
    pub fn flush_with_cancel<S>(
        &self,
        store: &S,
        cancel: &CancellationToken,
    ) -> Result<FlushReport, FlushError>
    where
        S: ActivityStore + ?Sized,
    {
        let mut report = FlushReport::default();
        let abort = |flushed: usize| move |source: QueueError| FlushError { flushed, source };

        let files = list_queue_files(&self.dir).map_err(abort(0))?;
        if files.is_empty() {
            debug!(dir = %self.dir.display(), "Queue empty, nothing to replay");
            return Ok(report);
        }

        for path in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                info!(dir = %self.dir.display(), "Queue replay cancelled");
                break;
            }
            self.replay_file(&path, store, &mut report)
                .map_err(abort(report.flushed))?;
        }

        if report.flushed > 0 || report.retained > 0 {
            info!(
                dir = %self.dir.display(),
                flushed = report.flushed,
                retained = report.retained,
                malformed = report.malformed,
                "Queue replay finished"
            );
        }
        Ok(report)
    }

    fn replay_file<S>(
        &self,
        path: &Path,
        store: &S,
        report: &mut FlushReport,
    ) -> Result<(), QueueError>
    where
        S: ActivityStore + ?Sized,
    {
        let body = std::fs::read_to_string(path).map_err(|source| QueueError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut retained = Vec::new();
        for entry in parse_entries(&body) {
            let Some(mut record) = entry.record else {
                report.malformed += 1;
                retained.push(entry.raw);
                continue;
            };

            apply_defaults(&mut record, (self.clock)());
            match store.create(&mut record) {
                Ok(()) => report.flushed += 1,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        session_key = %record.session_key,
                        error = %e,
                        "Queued activity not persisted, keeping for retry"
                    );
                    retained.push(entry.raw);
                }
            }
        }
        report.retained += retained.len();

        if retained.is_empty() {
            remove_file(path)?;
            report.files_deleted += 1;
            debug!(path = %path.display(), "Queue file drained");
            return Ok(());
        }

        let rendered = render_file(&file_label(path), retained.iter().map(String::as_str));
        if rendered != body {
            replace_file(path, &rendered)?;
            report.files_rewritten += 1;
        }
        Ok(())
    }
}

fn remove_file(path: &Path) -> Result<(), QueueError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(QueueError::Delete {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Replace `path` with `contents` via a temp sibling and rename.
fn replace_file(path: &Path, contents: &str) -> Result<(), QueueError> {
    let temp_path = path.with_extension("md.tmp");
    let write_err = |source: io::Error| QueueError::Write {
        path: path.to_path_buf(),
        source,
    };

    std::fs::write(&temp_path, contents).map_err(write_err)?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryActivityStore;
    use std::fs;

    fn block(payload: &str) -> String {
        format!("## queued_at: 2026-02-19T00:00:00Z\n```json\n{payload}\n```\n\n")
    }

    #[test]
    fn test_missing_directory_is_cold_start() {
        let tmp = tempfile::tempdir().unwrap();
        let replayer = QueueReplayer::new(tmp.path().join("never-created"));
        let report = replayer.flush(&InMemoryActivityStore::new()).unwrap();
        assert_eq!(report, FlushReport::default());
    }

    #[test]
    fn test_unchanged_file_is_not_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("2026-02-19.md");
        fs::write(&path, render_file("2026-02-19", ["not-json"])).unwrap();

        let report = QueueReplayer::new(tmp.path())
            .flush(&InMemoryActivityStore::new())
            .unwrap();
        assert_eq!(report.malformed, 1);
        assert_eq!(report.files_rewritten, 0);
        assert!(path.exists());
    }

    #[test]
    fn test_cancel_before_pass_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("2026-02-19.md");
        fs::write(&path, block(r#"{"session_key":"q-1"}"#)).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let store = InMemoryActivityStore::new();
        let report = QueueReplayer::new(tmp.path())
            .flush_with_cancel(&store, &cancel)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.flushed, 0);
        assert!(store.is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_clock_stamps_records_without_created_at() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("2026-02-19.md"),
            block(r#"{"session_key":"q-1"}"#),
        )
        .unwrap();
        let stamp = DateTime::parse_from_rfc3339("2026-02-20T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let store = InMemoryActivityStore::new();
        QueueReplayer::new(tmp.path())
            .with_clock(move || stamp)
            .flush(&store)
            .unwrap();

        let records = store.records();
        assert_eq!(records[0].created_at, Some(stamp));
        assert_eq!(records[0].project_tag, "unknown-project");
        assert_eq!(records[0].category, "");
    }

    #[test]
    fn test_failed_rewrite_aborts_and_keeps_original() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("2026-02-19.md");
        let original = format!(
            "{}{}",
            block(r#"{"session_key":"q-1"}"#),
            block("not-json")
        );
        fs::write(&path, &original).unwrap();
        // The temp sibling cannot be created over a directory.
        fs::create_dir(tmp.path().join("2026-02-19.md.tmp")).unwrap();

        let store = InMemoryActivityStore::new();
        let err = QueueReplayer::new(tmp.path()).flush(&store).unwrap_err();

        assert_eq!(err.flushed, 1);
        assert!(matches!(err.source, QueueError::Write { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_failed_delete_aborts_with_partial_count() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("2026-02-19.md");
        fs::write(&path, block(r#"{"session_key":"q-1"}"#)).unwrap();

        // Swap the file for a directory after it has been read.
        let swapped = path.clone();
        let store = InMemoryActivityStore::new();
        store.fail_when(move |_| {
            let _ = fs::remove_file(&swapped);
            let _ = fs::create_dir(&swapped);
            false
        });
        let err = QueueReplayer::new(tmp.path()).flush(&store).unwrap_err();

        assert_eq!(err.flushed, 1);
        assert!(matches!(err.source, QueueError::Delete { .. }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_array_payload_is_retained_not_stored() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("2026-02-19.md");
        fs::write(&path, render_file("2026-02-19", [r#"["x"]"#, "[]"])).unwrap();

        let store = InMemoryActivityStore::new();
        let report = QueueReplayer::new(tmp.path()).flush(&store).unwrap();

        assert_eq!(report.flushed, 0);
        assert_eq!(report.malformed, 2);
        assert!(store.is_empty());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            render_file("2026-02-19", [r#"["x"]"#, "[]"])
        );
    }

    #[test]
    fn test_unreadable_file_aborts_with_partial_count() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("2026-02-18.md"),
            block(r#"{"session_key":"first"}"#),
        )
        .unwrap();
        // Not valid UTF-8, so reading it as text fails.
        fs::write(tmp.path().join("2026-02-19.md"), [0xff, 0xfe, 0x00]).unwrap();

        let store = InMemoryActivityStore::new();
        let err = QueueReplayer::new(tmp.path()).flush(&store).unwrap_err();

        assert_eq!(err.flushed, 1);
        assert!(matches!(err.source, QueueError::Read { .. }));
        assert_eq!(store.len(), 1);
        assert!(!tmp.path().join("2026-02-18.md").exists());
    }
}
