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

//! Durable activity storage interface.

use agentledger_core::{ActivityFilters, ActivityRecord, ActivitySummary, InvalidDateFilter};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Activity storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidDateFilter(#[from] InvalidDateFilter),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result of a store health probe.
#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub reachable: bool,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Durable storage for activity records.
///
/// `create` returning `Ok` is the only signal that a record is persisted.
/// Callers buffering records must keep them on any error.
pub trait ActivityStore: Send + Sync {
    /// Persist a record, assigning `id` (and `created_at`) when unset.
    fn create(&self, record: &mut ActivityRecord) -> Result<(), StoreError>;

    /// Records matching `filters`, newest first.
    fn list(&self, filters: &ActivityFilters) -> Result<Vec<ActivityRecord>, StoreError>;

    /// Aggregate statistics over records matching `filters`.
    fn summarize(&self, filters: &ActivityFilters) -> Result<ActivitySummary, StoreError>;

    fn health(&self) -> StoreHealth;
}

impl<T: ActivityStore + ?Sized> ActivityStore for Arc<T> {
    fn create(&self, record: &mut ActivityRecord) -> Result<(), StoreError> {
        (**self).create(record)
    }

    fn list(&self, filters: &ActivityFilters) -> Result<Vec<ActivityRecord>, StoreError> {
        (**self).list(filters)
    }

    fn summarize(&self, filters: &ActivityFilters) -> Result<ActivitySummary, StoreError> {
        (**self).summarize(filters)
    }

    fn health(&self) -> StoreHealth {
        (**self).health()
    }
}

/// Fill the store-owned fields of a record about to be inserted.
pub(crate) fn prepare_for_insert(record: &mut ActivityRecord) {
    if record.id.is_empty() {
        record.id = uuid::Uuid::new_v4().to_string();
    }
    if record.created_at.is_none() {
        record.created_at = Some(Utc::now());
    }
}
