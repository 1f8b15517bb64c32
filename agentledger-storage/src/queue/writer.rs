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

//! Queue producer: appends records to the current day's file.

use agentledger_core::ActivityRecord;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::format::{render_block, render_header};
use super::{QueueError, QUEUE_FILE_EXTENSION};

/// Appends buffered records to `<dir>/<YYYY-MM-DD>.md` (UTC date).
#[derive(Debug, Clone)]
pub struct QueueWriter {
    dir: PathBuf,
}

impl QueueWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file records enqueued at `now` land in.
    pub fn file_for(&self, now: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("{}.{QUEUE_FILE_EXTENSION}", now.format("%Y-%m-%d")))
    }

    /// Buffer one record. Returns the file it was appended to.
    pub fn enqueue(
        &self,
        record: &ActivityRecord,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, QueueError> {
        let payload = serde_json::to_string(record)?;
        let path = self.file_for(now);
        let write_err = |source: io::Error| QueueError::Write {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(write_err)?;

        let mut block = String::new();
        let mut file = match OpenOptions::new().append(true).create_new(true).open(&path) {
            Ok(file) => {
                block.push_str(&render_header(&now.format("%Y-%m-%d").to_string()));
                file
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(write_err)?,
            Err(e) => return Err(write_err(e)),
        };
        block.push_str(&render_block(
            &now.to_rfc3339_opts(SecondsFormat::Secs, true),
            &payload,
        ));

        file.write_all(block.as_bytes()).map_err(write_err)?;
        file.sync_data().map_err(write_err)?;

        tracing::debug!(
            path = %path.display(),
            session_key = %record.session_key,
            "Queued activity for replay"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::parse_entries;
    use chrono::TimeZone;

    #[test]
    fn test_enqueue_creates_header_once_and_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = QueueWriter::new(tmp.path().join("queue"));
        let now = Utc.with_ymd_and_hms(2026, 2, 19, 8, 30, 0).unwrap();

        for session in ["q-1", "q-2"] {
            let record = ActivityRecord {
                session_key: session.into(),
                ..Default::default()
            };
            writer.enqueue(&record, now).unwrap();
        }

        let path = writer.file_for(now);
        assert!(path.ends_with("2026-02-19.md"));

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("# Agent Activity Fallback Queue (2026-02-19)\n\n"));
        assert_eq!(body.matches("# Agent Activity Fallback Queue").count(), 1);
        assert_eq!(body.matches("## queued_at: 2026-02-19T08:30:00Z").count(), 2);

        let sessions: Vec<_> = parse_entries(&body)
            .into_iter()
            .filter_map(|e| e.record)
            .map(|r| r.session_key)
            .collect();
        assert_eq!(sessions, ["q-1", "q-2"]);
    }
}
