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

//! In-memory activity store for development and tests.

use agentledger_core::{ActivityFilters, ActivityRecord, ActivitySummary};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::{prepare_for_insert, ActivityStore, StoreError, StoreHealth};

type FailurePredicate = Box<dyn Fn(&ActivityRecord) -> bool + Send + Sync>;

/// Vector-backed [`ActivityStore`].
///
/// Supports failure injection: [`set_unavailable`](Self::set_unavailable)
/// rejects every write, [`fail_when`](Self::fail_when) rejects matching ones.
#[derive(Default)]
pub struct InMemoryActivityStore {
    records: RwLock<Vec<ActivityRecord>>,
    unavailable: AtomicBool,
    fail_when: RwLock<Option<FailurePredicate>>,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes for which `predicate` returns true.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&ActivityRecord) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.write() = Some(Box::new(predicate));
    }

    /// Remove any installed failure predicate.
    pub fn clear_failures(&self) {
        *self.fail_when.write() = None;
    }

    /// Toggle whole-store unavailability.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of stored records in insertion order.
    pub fn records(&self) -> Vec<ActivityRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn matching(&self, filters: &ActivityFilters) -> Result<Vec<ActivityRecord>, StoreError> {
        let range = filters.date_range()?;
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| filters.matches_fields(r))
            .filter(|r| match (range, r.created_at) {
                (None, _) => true,
                (Some((start, end)), Some(ts)) => ts >= start && ts < end,
                (Some(_), None) => false,
            })
            .cloned()
            .collect())
    }
}

impl ActivityStore for InMemoryActivityStore {
    fn create(&self, record: &mut ActivityRecord) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store marked unavailable".into()));
        }
        if let Some(predicate) = self.fail_when.read().as_ref() {
            if predicate(record) {
                return Err(StoreError::Unavailable(format!(
                    "write rejected for session {}",
                    record.session_key
                )));
            }
        }

        prepare_for_insert(record);
        let mut records = self.records.write();
        if records.iter().any(|r| r.id == record.id) {
            return Err(StoreError::Unavailable(format!("duplicate id {}", record.id)));
        }
        records.push(record.clone());
        Ok(())
    }

    fn list(&self, filters: &ActivityFilters) -> Result<Vec<ActivityRecord>, StoreError> {
        let mut records = self.matching(filters)?;
        // Newest first; stable sort keeps insertion order among equal timestamps.
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    fn summarize(&self, filters: &ActivityFilters) -> Result<ActivitySummary, StoreError> {
        let mut summary = ActivitySummary::default();
        for record in self.matching(filters)? {
            summary.add(&record);
        }
        Ok(summary)
    }

    fn health(&self) -> StoreHealth {
        let reachable = !self.unavailable.load(Ordering::SeqCst);
        StoreHealth {
            reachable,
            backend: "memory",
            record_count: Some(self.len() as i64),
            error: (!reachable).then(|| "marked unavailable".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_create_and_list() {
        let store = InMemoryActivityStore::new();
        let mut older = ActivityRecord {
            session_key: "older".into(),
            created_at: Some(Utc.with_ymd_and_hms(2026, 2, 18, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let mut newer = ActivityRecord {
            session_key: "newer".into(),
            created_at: Some(Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        store.create(&mut older).unwrap();
        store.create(&mut newer).unwrap();

        let listed = store.list(&ActivityFilters::new()).unwrap();
        assert_eq!(listed[0].session_key, "newer");
        assert_eq!(listed[1].session_key, "older");

        let day = store.list(&ActivityFilters::new().date("2026-02-18")).unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].id, older.id);
    }

    #[test]
    fn test_failure_injection() {
        let store = InMemoryActivityStore::new();
        store.fail_when(|r| r.session_key == "bad");

        let mut bad = ActivityRecord {
            session_key: "bad".into(),
            ..Default::default()
        };
        assert!(store.create(&mut bad).is_err());
        assert!(bad.id.is_empty());

        store.create(&mut ActivityRecord::default()).unwrap();
        store.clear_failures();
        store.create(&mut bad).unwrap();
        assert_eq!(store.len(), 2);

        store.set_unavailable(true);
        assert!(store.create(&mut ActivityRecord::default()).is_err());
        assert!(!store.health().reachable);
    }

    #[test]
    fn test_summarize_matches_filters() {
        let store = InMemoryActivityStore::new();
        for (project, status) in [("a", "success"), ("a", "error"), ("b", "success")] {
            store
                .create(&mut ActivityRecord {
                    project_tag: project.into(),
                    status: status.into(),
                    tokens_in: 3,
                    ..Default::default()
                })
                .unwrap();
        }

        let summary = store.summarize(&ActivityFilters::new().project("a")).unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.tokens_in_total, 6);
        assert_eq!(summary.by_status.len(), 2);
    }
}
