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

//! Ingestion normalization.
//!
//! [`apply_defaults`] is shared by live ingestion and queue replay so both
//! paths store identically shaped records. [`apply_classification`] runs on
//! live ingestion only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::ActivityRecord;
use crate::classifier::{Classifier, Signals};

pub const DEFAULT_PROJECT_TAG: &str = "unknown-project";
pub const DEFAULT_CHANNEL: &str = "unknown-channel";
pub const DEFAULT_USER_ID: &str = "unknown-user";
pub const DEFAULT_MODEL: &str = "unknown-model";
pub const DEFAULT_THINKING: &str = "medium";
pub const DEFAULT_STATUS: &str = "success";

/// Category value that is treated as "not provided" and reclassified.
pub const RECLASSIFY_CATEGORY: &str = "general";

/// Reason recorded when the caller supplied a category without one.
pub const PROVIDED_CATEGORY_REASON: &str = "provided:category";

/// Fill blank fields with their defaults. `now` stamps an unset creation time.
pub fn apply_defaults(record: &mut ActivityRecord, now: DateTime<Utc>) {
    default_if_blank(&mut record.project_tag, DEFAULT_PROJECT_TAG);
    default_if_blank(&mut record.channel, DEFAULT_CHANNEL);
    default_if_blank(&mut record.user_id, DEFAULT_USER_ID);
    default_if_blank(&mut record.model, DEFAULT_MODEL);
    default_if_blank(&mut record.thinking, DEFAULT_THINKING);
    default_if_blank(&mut record.status, DEFAULT_STATUS);
    if record.created_at.is_none() {
        record.created_at = Some(now);
    }
}

fn default_if_blank(field: &mut String, default: &str) {
    if field.trim().is_empty() {
        *field = default.to_string();
    }
}

/// Assign a category to a live record.
///
/// A blank or `general` category is replaced by the classifier's verdict.
/// Any other category is kept (lowercased) and given a synthesized reason if
/// none was supplied.
pub fn apply_classification(record: &mut ActivityRecord, signals: &Signals, classifier: &Classifier) {
    let category = record.category.trim().to_lowercase();
    if !category.is_empty() && category != RECLASSIFY_CATEGORY {
        record.category = category;
        if record.category_reason.trim().is_empty() {
            record.category_reason = PROVIDED_CATEGORY_REASON.to_string();
        }
        return;
    }

    let classification = classifier.classify(signals);
    tracing::debug!(
        session_key = %record.session_key,
        category = %classification.category,
        reason = %classification.reason,
        "Classified activity"
    );
    record.category = classification.category;
    record.category_reason = classification.reason.to_string();
}

/// Body accepted by the live ingestion endpoint: an activity record plus the
/// turn's classification signals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(flatten)]
    pub record: ActivityRecord,
    #[serde(default)]
    pub prompt_text: String,
    #[serde(default)]
    pub assistant_text: String,
    #[serde(default)]
    pub tools_used: Vec<String>,
}

impl IngestRequest {
    pub fn into_parts(self) -> (ActivityRecord, Signals) {
        let signals = Signals {
            prompt_text: self.prompt_text,
            assistant_text: self.assistant_text,
            tools_used: self.tools_used,
        };
        (self.record, signals)
    }

    /// Normalize and classify into a record ready for storage.
    ///
    /// Any client-supplied id is discarded; the store assigns one.
    pub fn into_record(self, classifier: &Classifier, now: DateTime<Utc>) -> ActivityRecord {
        let (mut record, signals) = self.into_parts();
        record.id.clear();
        apply_defaults(&mut record, now);
        apply_classification(&mut record, &signals, classifier);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults_fill_blank_fields() {
        let mut record = ActivityRecord {
            project_tag: "  ".into(),
            model: "gpt-5".into(),
            ..Default::default()
        };
        apply_defaults(&mut record, now());

        assert_eq!(record.project_tag, DEFAULT_PROJECT_TAG);
        assert_eq!(record.channel, DEFAULT_CHANNEL);
        assert_eq!(record.user_id, DEFAULT_USER_ID);
        assert_eq!(record.model, "gpt-5");
        assert_eq!(record.thinking, DEFAULT_THINKING);
        assert_eq!(record.status, DEFAULT_STATUS);
        assert_eq!(record.created_at, Some(now()));
        assert_eq!(record.category, "");
    }

    #[test]
    fn test_defaults_keep_existing_created_at() {
        let created = Utc.with_ymd_and_hms(2026, 2, 19, 0, 0, 0).unwrap();
        let mut record = ActivityRecord {
            created_at: Some(created),
            ..Default::default()
        };
        apply_defaults(&mut record, now());
        assert_eq!(record.created_at, Some(created));
    }

    #[test]
    fn test_general_category_is_reclassified() {
        let mut record = ActivityRecord {
            category: " General ".into(),
            ..Default::default()
        };
        let signals = Signals::new().prompt("please research and compare this");
        apply_classification(&mut record, &signals, &Classifier::builtin());

        assert_eq!(record.category, "research");
        assert_eq!(record.category_reason, "prompt_keyword_score:research=2");
    }

    #[test]
    fn test_provided_category_is_kept() {
        let mut record = ActivityRecord {
            category: "Code".into(),
            ..Default::default()
        };
        let signals = Signals::new().prompt("please research and compare this");
        apply_classification(&mut record, &signals, &Classifier::builtin());

        assert_eq!(record.category, "code");
        assert_eq!(record.category_reason, PROVIDED_CATEGORY_REASON);
    }

    #[test]
    fn test_provided_reason_is_kept() {
        let mut record = ActivityRecord {
            category: "ops".into(),
            category_reason: "hook:label".into(),
            ..Default::default()
        };
        apply_classification(&mut record, &Signals::new(), &Classifier::builtin());

        assert_eq!(record.category, "ops");
        assert_eq!(record.category_reason, "hook:label");
    }

    #[test]
    fn test_ingest_request_flattens_record() {
        let request: IngestRequest = serde_json::from_str(
            r#"{
                "id": "client-id",
                "session_key": "s-9",
                "model": "gpt-5",
                "prompt_text": "please take a look",
                "tools_used": ["write_file"]
            }"#,
        )
        .unwrap();

        let record = request.into_record(&Classifier::builtin(), now());
        assert_eq!(record.id, "");
        assert_eq!(record.session_key, "s-9");
        assert_eq!(record.category, "code");
        assert_eq!(record.category_reason, "tool_signal:write_file");
        assert_eq!(record.channel, DEFAULT_CHANNEL);
    }
}
