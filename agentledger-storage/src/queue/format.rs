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

//! Queue file format.
//!
//! A queue file is markdown: a title line, then one block per buffered
//! record.
//!
//! ````text
//! # Agent Activity Fallback Queue (2026-02-19)
//!
//! ## queued_at: 2026-02-19T08:30:00Z
//! ```json
//! {"session_key":"q-1","model":"gpt-5"}
//! ```
//! ````
//!
//! Only the fenced payloads carry data. Headers and prose are regenerated on
//! rewrite, never preserved.

use agentledger_core::ActivityRecord;
use once_cell::sync::Lazy;
use regex::Regex;

/// Marker written in place of the enqueue time when a file is rewritten.
pub const REPLAY_PENDING: &str = "replay_pending";

const QUEUE_TITLE: &str = "Agent Activity Fallback Queue";

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\r?\n(.*?)\r?\n```").expect("valid fence pattern"));

/// One buffered record inside a queue file.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEntry {
    /// Payload text between the fences, trimmed of surrounding whitespace.
    pub raw: String,
    /// Decoded record, or `None` when the payload is malformed.
    pub record: Option<ActivityRecord>,
}

impl QueuedEntry {
    pub fn is_valid(&self) -> bool {
        self.record.is_some()
    }
}

/// Extract every fenced payload in document order.
///
/// Blank payloads are skipped. Payloads that do not decode as an activity
/// record are kept as malformed entries with their text untouched.
pub fn parse_entries(document: &str) -> Vec<QueuedEntry> {
    JSON_FENCE
        .captures_iter(document)
        .filter_map(|caps| {
            let raw = caps.get(1)?.as_str().trim();
            if raw.is_empty() {
                return None;
            }
            let record = ActivityRecord::from_json_str(raw).ok();
            Some(QueuedEntry {
                raw: raw.to_string(),
                record,
            })
        })
        .collect()
}

/// Title block for a queue file.
pub fn render_header(label: &str) -> String {
    format!("# {QUEUE_TITLE} ({label})\n\n")
}

/// One fenced block stamped with `queued_at`.
pub fn render_block(queued_at: &str, raw: &str) -> String {
    format!("## queued_at: {queued_at}\n```json\n{}\n```\n\n", raw.trim())
}

/// Whole-file rendering of the entries retained after a replay pass.
pub fn render_file<'a>(label: &str, raws: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = render_header(label);
    for raw in raws {
        out.push_str(&render_block(REPLAY_PENDING, raw));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_and_malformed_in_order() {
        let doc = "# Agent Activity Fallback Queue (2026-02-19)\n\n\
            ## queued_at: 2026-02-19T00:00:00Z\n```json\n{\"session_key\":\"q-1\"}\n```\n\n\
            some prose that is ignored\n\
            ## queued_at: 2026-02-19T00:00:01Z\n```json\nnot-json\n```\n";
        let entries = parse_entries(doc);

        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].record.as_ref().map(|r| r.session_key.as_str()),
            Some("q-1")
        );
        assert_eq!(entries[1].raw, "not-json");
        assert!(!entries[1].is_valid());
    }

    #[test]
    fn test_raw_is_trimmed_only() {
        let doc = "```json\n   {\"model\" :  \"gpt-5\"}  \n```";
        let entries = parse_entries(doc);
        assert_eq!(entries[0].raw, "{\"model\" :  \"gpt-5\"}");
    }

    #[test]
    fn test_blank_blocks_skipped() {
        let doc = "```json\n   \n```\n```json\n{}\n```";
        let entries = parse_entries(doc);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].raw, "{}");
    }

    #[test]
    fn test_crlf_documents_parse() {
        let doc = "## queued_at: x\r\n```json\r\n{\"session_key\":\"win\"}\r\n```\r\n";
        let entries = parse_entries(doc);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_valid());
    }

    #[test]
    fn test_rendered_file_reparses() {
        let rendered = render_file("2026-02-19", ["not-json", "{\"session_key\":\"keep\"}"]);

        assert!(rendered.starts_with("# Agent Activity Fallback Queue (2026-02-19)\n\n"));
        assert_eq!(rendered.matches("## queued_at: replay_pending\n").count(), 2);

        let entries = parse_entries(&rendered);
        let raws: Vec<_> = entries.iter().map(|e| e.raw.as_str()).collect();
        assert_eq!(raws, ["not-json", "{\"session_key\":\"keep\"}"]);
    }

    #[test]
    fn test_non_object_payloads_are_malformed() {
        for payload in ["[]", "[\"x\"]", "null", "42", "\"text\""] {
            let entries = parse_entries(&format!("```json\n{payload}\n```"));
            assert_eq!(entries.len(), 1, "{payload}");
            assert!(!entries[0].is_valid(), "{payload} decoded as a record");
            assert_eq!(entries[0].raw, payload);
        }
    }

    #[test]
    fn test_text_without_fences_has_no_entries() {
        assert!(parse_entries("# Agent Activity Fallback Queue (x)\n\njust notes\n").is_empty());
        assert!(parse_entries("```yaml\nkey: value\n```").is_empty());
    }
}
