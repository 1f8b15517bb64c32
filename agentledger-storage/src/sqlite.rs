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

//! SQLite Activity Store
//!
//! Single-connection SQLite ledger. Timestamps are stored as fixed-width
//! RFC 3339 strings (microsecond precision, `Z` suffix) so that string
//! comparison orders them chronologically and date filters can use plain
//! range predicates.

use agentledger_core::{ActivityFilters, ActivityRecord, ActivitySummary};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::{Path, PathBuf};

use crate::store::{prepare_for_insert, ActivityStore, StoreError, StoreHealth};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS activity_feed (
        id              TEXT PRIMARY KEY NOT NULL,
        session_key     TEXT NOT NULL DEFAULT '',
        model           TEXT NOT NULL DEFAULT '',
        tokens_in       INTEGER NOT NULL DEFAULT 0,
        tokens_out      INTEGER NOT NULL DEFAULT 0,
        cost_estimate   REAL NOT NULL DEFAULT 0,
        duration_ms     INTEGER NOT NULL DEFAULT 0,
        project_tag     TEXT NOT NULL DEFAULT '',
        external_ref    TEXT NOT NULL DEFAULT '',
        category        TEXT NOT NULL DEFAULT '',
        category_reason TEXT NOT NULL DEFAULT '',
        thinking        TEXT NOT NULL DEFAULT '',
        reasoning       INTEGER NOT NULL DEFAULT 0,
        channel         TEXT NOT NULL DEFAULT '',
        status          TEXT NOT NULL DEFAULT '',
        user_id         TEXT NOT NULL DEFAULT '',
        created_at      TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_activity_feed_session_key ON activity_feed(session_key);
    CREATE INDEX IF NOT EXISTS idx_activity_feed_project_tag ON activity_feed(project_tag);
    CREATE INDEX IF NOT EXISTS idx_activity_feed_category ON activity_feed(category);
    CREATE INDEX IF NOT EXISTS idx_activity_feed_status ON activity_feed(status);
    CREATE INDEX IF NOT EXISTS idx_activity_feed_user_id ON activity_feed(user_id);
    CREATE INDEX IF NOT EXISTS idx_activity_feed_created_at ON activity_feed(created_at);
";

const SELECT_COLUMNS: &str = "id, session_key, model, tokens_in, tokens_out, cost_estimate, \
    duration_ms, project_tag, external_ref, category, category_reason, thinking, reasoning, \
    channel, status, user_id, created_at";

/// SQLite-backed [`ActivityStore`].
pub struct SqliteActivityStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteActivityStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        tracing::info!(path = %path.display(), "Opened activity database");
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file path, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl ActivityStore for SqliteActivityStore {
    fn create(&self, record: &mut ActivityRecord) -> Result<(), StoreError> {
        prepare_for_insert(record);
        let created_at = record.created_at.map(encode_timestamp).unwrap_or_default();

        self.conn.lock().execute(
            "INSERT INTO activity_feed (
                id, session_key, model, tokens_in, tokens_out, cost_estimate, duration_ms,
                project_tag, external_ref, category, category_reason, thinking, reasoning,
                channel, status, user_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                record.id,
                record.session_key,
                record.model,
                record.tokens_in,
                record.tokens_out,
                record.cost_estimate,
                record.duration_ms,
                record.project_tag,
                record.external_ref,
                record.category,
                record.category_reason,
                record.thinking,
                record.reasoning,
                record.channel,
                record.status,
                record.user_id,
                created_at,
            ],
        )?;

        tracing::debug!(id = %record.id, session_key = %record.session_key, "Inserted activity");
        Ok(())
    }

    fn list(&self, filters: &ActivityFilters) -> Result<Vec<ActivityRecord>, StoreError> {
        let (clause, values) = where_clause(filters)?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM activity_feed{clause} ORDER BY created_at DESC, id ASC"
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), read_record)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn summarize(&self, filters: &ActivityFilters) -> Result<ActivitySummary, StoreError> {
        let (clause, values) = where_clause(filters)?;
        let conn = self.conn.lock();

        let mut summary = conn.query_row(
            &format!(
                "SELECT COUNT(*),
                        COALESCE(SUM(tokens_in), 0),
                        COALESCE(SUM(tokens_out), 0),
                        COALESCE(SUM(cost_estimate), 0.0),
                        COALESCE(SUM(duration_ms), 0)
                 FROM activity_feed{clause}"
            ),
            params_from_iter(values.iter()),
            |row| {
                Ok(ActivitySummary {
                    count: row.get(0)?,
                    tokens_in_total: row.get(1)?,
                    tokens_out_total: row.get(2)?,
                    cost_total: row.get(3)?,
                    duration_ms_total: row.get(4)?,
                    by_status: Default::default(),
                })
            },
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT status, COUNT(*) FROM activity_feed{clause} GROUP BY status"
        ))?;
        let groups = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for group in groups {
            let (status, count) = group?;
            if !status.is_empty() {
                summary.by_status.insert(status, count);
            }
        }

        Ok(summary)
    }

    fn health(&self) -> StoreHealth {
        let count = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM activity_feed", [], |row| row.get::<_, i64>(0));

        match count {
            Ok(count) => StoreHealth {
                reachable: true,
                backend: "sqlite",
                record_count: Some(count),
                error: None,
            },
            Err(e) => StoreHealth {
                reachable: false,
                backend: "sqlite",
                record_count: None,
                error: Some(e.to_string()),
            },
        }
    }
}

fn where_clause(filters: &ActivityFilters) -> Result<(String, Vec<String>), StoreError> {
    let mut predicates = Vec::new();
    let mut values = Vec::new();

    if let Some(project) = filters.project_tag.as_deref().filter(|v| !v.trim().is_empty()) {
        predicates.push("project_tag = ?");
        values.push(project.trim().to_string());
    }
    if let Some(model) = filters.model.as_deref().filter(|v| !v.trim().is_empty()) {
        predicates.push("model = ?");
        values.push(model.trim().to_string());
    }
    if let Some((start, end)) = filters.date_range()? {
        predicates.push("created_at >= ? AND created_at < ?");
        values.push(encode_timestamp(start));
        values.push(encode_timestamp(end));
    }

    if predicates.is_empty() {
        Ok((String::new(), values))
    } else {
        Ok((format!(" WHERE {}", predicates.join(" AND ")), values))
    }
}

fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<ActivityRecord> {
    let created_at: String = row.get(16)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(16, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);

    Ok(ActivityRecord {
        id: row.get(0)?,
        session_key: row.get(1)?,
        model: row.get(2)?,
        tokens_in: row.get(3)?,
        tokens_out: row.get(4)?,
        cost_estimate: row.get(5)?,
        duration_ms: row.get(6)?,
        project_tag: row.get(7)?,
        external_ref: row.get(8)?,
        category: row.get(9)?,
        category_reason: row.get(10)?,
        thinking: row.get(11)?,
        reasoning: row.get(12)?,
        channel: row.get(13)?,
        status: row.get(14)?,
        user_id: row.get(15)?,
        created_at: Some(created_at),
    })
}
