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

//! Activity Records
//!
//! The ledger entry written for every agent turn, plus the filter and
//! summary types used by the query side.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Format accepted by the `date` filter.
pub const DATE_FILTER_FORMAT: &str = "%Y-%m-%d";

/// One agent activity entry.
///
/// Every field is optional on decode so that partially filled payloads
/// (from hooks, plugins, or the fallback queue) still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityRecord {
    /// Store-assigned identifier (UUID v4).
    pub id: String,
    pub session_key: String,
    pub model: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    /// Estimated cost in USD.
    pub cost_estimate: f64,
    pub duration_ms: i64,
    pub project_tag: String,
    pub external_ref: String,
    pub category: String,
    pub category_reason: String,
    /// Thinking level requested for the turn (e.g. "low", "medium", "high").
    pub thinking: String,
    pub reasoning: bool,
    pub channel: String,
    pub status: String,
    pub user_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl ActivityRecord {
    /// Decode one serialized record.
    ///
    /// Only a JSON object is accepted. The derived decoder would also take
    /// an array and fill fields positionally.
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(payload)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom(
                "activity record must be a JSON object",
            ));
        }
        serde_json::from_value(value)
    }
}

/// Invalid `date` filter value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid date filter: expected YYYY-MM-DD, got {0:?}")]
pub struct InvalidDateFilter(pub String);

/// Query filters for listing and summarizing activities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityFilters {
    /// Filter by project tag.
    pub project_tag: Option<String>,
    /// Filter by model.
    pub model: Option<String>,
    /// Filter by creation day (`YYYY-MM-DD`, UTC).
    pub date: Option<String>,
}

impl ActivityFilters {
    /// Create an empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by project tag.
    pub fn project(mut self, project_tag: impl Into<String>) -> Self {
        self.project_tag = Some(project_tag.into());
        self
    }

    /// Filter by model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Filter by creation day.
    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Resolve the `date` filter into a half-open `[start, end)` UTC range.
    pub fn date_range(
        &self,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, InvalidDateFilter> {
        let Some(raw) = non_blank(self.date.as_deref()) else {
            return Ok(None);
        };

        let day = NaiveDate::parse_from_str(raw, DATE_FILTER_FORMAT)
            .map_err(|_| InvalidDateFilter(raw.to_string()))?;
        let start = day
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| InvalidDateFilter(raw.to_string()))?
            .and_utc();

        Ok(Some((start, start + Duration::days(1))))
    }

    /// Check whether a record matches the project and model filters.
    ///
    /// The date filter is checked separately via [`Self::date_range`] since it
    /// can fail.
    pub fn matches_fields(&self, record: &ActivityRecord) -> bool {
        if let Some(project) = non_blank(self.project_tag.as_deref()) {
            if record.project_tag != project {
                return false;
            }
        }

        if let Some(model) = non_blank(self.model.as_deref()) {
            if record.model != model {
                return false;
            }
        }

        true
    }
}

/// Aggregated activity statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub count: i64,
    pub tokens_in_total: i64,
    pub tokens_out_total: i64,
    pub cost_total: f64,
    pub duration_ms_total: i64,
    /// Record counts keyed by status. Empty statuses are not reported.
    pub by_status: BTreeMap<String, i64>,
}

impl ActivitySummary {
    /// Fold one record into the running totals.
    pub fn add(&mut self, record: &ActivityRecord) {
        self.count += 1;
        self.tokens_in_total += record.tokens_in;
        self.tokens_out_total += record.tokens_out;
        self.cost_total += record.cost_estimate;
        self.duration_ms_total += record.duration_ms;
        if !record.status.is_empty() {
            *self.by_status.entry(record.status.clone()).or_insert(0) += 1;
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_json_str_requires_object() {
        let record = ActivityRecord::from_json_str(r#"{"session_key":"s-1"}"#).unwrap();
        assert_eq!(record.session_key, "s-1");

        assert!(ActivityRecord::from_json_str("[]").is_err());
        assert!(ActivityRecord::from_json_str(r#"["x"]"#).is_err());
        assert!(ActivityRecord::from_json_str("null").is_err());
    }

    #[test]
    fn test_partial_payload_decodes_with_defaults() {
        let record: ActivityRecord =
            serde_json::from_str(r#"{"session_key":"s-1","tokens_in":12,"unknown":true}"#)
                .unwrap();

        assert_eq!(record.session_key, "s-1");
        assert_eq!(record.tokens_in, 12);
        assert_eq!(record.model, "");
        assert!(record.created_at.is_none());
    }

    #[test]
    fn test_created_at_parses_rfc3339() {
        let record: ActivityRecord =
            serde_json::from_str(r#"{"created_at":"2026-02-19T00:00:00Z"}"#).unwrap();

        assert_eq!(
            record.created_at,
            Some(Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_date_range() {
        let filters = ActivityFilters::new().date("2026-02-19");
        let (start, end) = filters.date_range().unwrap().unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 2, 20, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_date_filter() {
        let filters = ActivityFilters::new().date("19/02/2026");
        assert_eq!(
            filters.date_range(),
            Err(InvalidDateFilter("19/02/2026".to_string()))
        );
        assert_eq!(ActivityFilters::new().date("  ").date_range(), Ok(None));
    }

    #[test]
    fn test_summary_skips_empty_status() {
        let mut summary = ActivitySummary::default();
        summary.add(&ActivityRecord {
            tokens_in: 10,
            tokens_out: 5,
            status: "success".into(),
            ..Default::default()
        });
        summary.add(&ActivityRecord::default());

        assert_eq!(summary.count, 2);
        assert_eq!(summary.tokens_in_total, 10);
        assert_eq!(summary.by_status.len(), 1);
        assert_eq!(summary.by_status["success"], 1);
    }
}
