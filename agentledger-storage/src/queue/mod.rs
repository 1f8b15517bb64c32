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

//! Fallback Queue
//!
//! Local buffer for activity records that could not reach the store. A
//! producer appends fenced JSON blocks to one markdown file per day; the
//! [`QueueReplayer`] later drains those files into an [`ActivityStore`],
//! rewriting each file to hold only the entries that still need a retry.
//!
//! The queue is single-consumer. Two replay passes over the same directory
//! must never overlap.
//!
//! [`ActivityStore`]: crate::store::ActivityStore

pub mod format;
pub mod replay;
pub mod writer;

pub use format::{parse_entries, QueuedEntry, REPLAY_PENDING};
pub use replay::{FlushError, FlushReport, QueueReplayer};
pub use writer::QueueWriter;

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension of queue files. Other files in the directory are ignored.
pub const QUEUE_FILE_EXTENSION: &str = "md";

/// Environment variable overriding the queue directory.
pub const QUEUE_DIR_ENV: &str = "AGENTLEDGER_QUEUE_DIR";

/// Filesystem failures while reading or compacting the queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to list queue directory {}: {source}", .path.display())]
    ReadDir { path: PathBuf, source: io::Error },

    #[error("failed to read queue file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write queue file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to delete queue file {}: {source}", .path.display())]
    Delete { path: PathBuf, source: io::Error },

    #[error("failed to serialize activity for queueing: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Resolve the queue directory.
///
/// An explicit override wins, then `AGENTLEDGER_QUEUE_DIR`, then
/// `~/.agentledger/queue`. Without a home directory the relative path
/// `.agentledger/queue` is used. Blank values count as unset.
pub fn resolve_queue_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.as_os_str().is_empty()) {
        return dir.to_path_buf();
    }

    if let Ok(value) = std::env::var(QUEUE_DIR_ENV) {
        if !value.trim().is_empty() {
            return PathBuf::from(value.trim());
        }
    }

    match dirs::home_dir() {
        Some(home) if !home.as_os_str().is_empty() => home.join(".agentledger").join("queue"),
        _ => PathBuf::from(".agentledger").join("queue"),
    }
}

/// Queue files directly inside `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
pub fn list_queue_files(dir: &Path) -> Result<Vec<PathBuf>, QueueError> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(QueueError::ReadDir {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| QueueError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_queue_file = path.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(QUEUE_FILE_EXTENSION);
        if is_queue_file {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Label used in a queue file's header: its file stem.
pub(crate) fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Per-file pending counts, for operators.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueFileStatus {
    pub path: PathBuf,
    pub entries: usize,
    pub malformed: usize,
}

/// Inspect queue files without modifying them.
pub fn inspect(dir: &Path) -> Result<Vec<QueueFileStatus>, QueueError> {
    list_queue_files(dir)?
        .into_iter()
        .map(|path| {
            let body = std::fs::read_to_string(&path).map_err(|source| QueueError::Read {
                path: path.clone(),
                source,
            })?;
            let entries = parse_entries(&body);
            Ok(QueueFileStatus {
                malformed: entries.iter().filter(|e| !e.is_valid()).count(),
                entries: entries.len(),
                path,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_override_wins() {
        let dir = resolve_queue_dir(Some(Path::new("/tmp/custom-queue")));
        assert_eq!(dir, PathBuf::from("/tmp/custom-queue"));
    }

    #[test]
    fn test_list_missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let files = list_queue_files(&tmp.path().join("absent")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_list_is_flat_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("2026-02-20.md"), "").unwrap();
        fs::write(tmp.path().join("2026-02-19.md"), "").unwrap();
        fs::write(tmp.path().join("notes.txt"), "").unwrap();
        fs::create_dir(tmp.path().join("nested.md")).unwrap();
        fs::write(tmp.path().join("nested.md").join("2026-01-01.md"), "").unwrap();

        let names: Vec<_> = list_queue_files(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["2026-02-19.md", "2026-02-20.md"]);
    }

    #[test]
    fn test_inspect_counts() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("2026-02-19.md"),
            "```json\n{}\n```\n```json\nnot-json\n```\n",
        )
        .unwrap();

        let status = inspect(tmp.path()).unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].entries, 2);
        assert_eq!(status[0].malformed, 1);
    }
}
