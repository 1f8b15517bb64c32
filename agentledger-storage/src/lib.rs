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

//! Agentledger Storage Layer
//!
//! Durable storage for activity records plus the local fallback queue that
//! buffers records while the store is unreachable.
//!
//! ## Architecture
//!
//! - **[`ActivityStore`]**: the persistence interface used by ingestion and
//!   queue replay
//! - **[`SqliteActivityStore`]**: production store (bundled SQLite, WAL)
//! - **[`InMemoryActivityStore`]**: development store with failure injection
//! - **[`queue`]**: day-file queue format, producer and replayer
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agentledger_storage::{QueueReplayer, SqliteActivityStore};
//!
//! let store = SqliteActivityStore::open("agentledger.db")?;
//! let report = QueueReplayer::new(resolve_queue_dir(None)).flush(&store)?;
//! println!("replayed {} records", report.flushed);
//! ```

pub mod memory;
pub mod queue;
pub mod sqlite;
pub mod store;

pub use memory::InMemoryActivityStore;
pub use queue::{
    inspect, list_queue_files, resolve_queue_dir, FlushError, FlushReport, QueueError,
    QueueFileStatus, QueueReplayer, QueueWriter, QueuedEntry, QUEUE_DIR_ENV,
    QUEUE_FILE_EXTENSION,
};
pub use sqlite::SqliteActivityStore;
pub use store::{ActivityStore, StoreError, StoreHealth};
