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

//! Category rule sets.
//!
//! A [`RuleSet`] is compiled once from a rule file and then shared read-only
//! (`Arc<RuleSet>`) by every classification call.
//!
//! ## Rule file
//!
//! ```json
//! {
//!   "default_category": "general",
//!   "categories": {
//!     "code": { "keywords": ["refactor", "stack trace"], "tools": ["write", "edit"] }
//!   }
//! }
//! ```
//!
//! The same shape is accepted as TOML. Keyword matching mode depends on the
//! keyword's shape:
//!
//! | keyword | mode |
//! |---|---|
//! | single word (`test`) | word boundary, so `testing` does not match |
//! | phrase (`stack trace`) | plain substring |

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

/// Category used when a rule file does not name one.
pub const FALLBACK_DEFAULT_CATEGORY: &str = "general";

const BUILTIN_RULES_JSON: &str = include_str!("category_rules.json");

/// Errors raised while loading a rule set.
#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("Failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON rule file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid TOML rule file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Unsupported rule file extension: {0:?}")]
    UnsupportedFormat(String),

    #[error("Invalid keyword pattern {keyword:?}: {source}")]
    Pattern {
        keyword: String,
        #[source]
        source: regex::Error,
    },
}

/// On-disk form of a single category's detection criteria.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryRuleSpec {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

/// On-disk form of a rule set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSetSpec {
    #[serde(default)]
    pub default_category: String,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryRuleSpec>,
}

/// A compiled keyword.
#[derive(Debug, Clone)]
pub enum KeywordMatcher {
    /// Single word, matched on word boundaries.
    Word(Regex),
    /// Multi-word phrase, matched as a plain substring.
    Phrase(String),
}

impl KeywordMatcher {
    /// Compile a keyword. Blank keywords yield `None`.
    pub fn compile(raw: &str) -> Result<Option<Self>, RuleSetError> {
        let keyword = raw.trim().to_lowercase();
        if keyword.is_empty() {
            return Ok(None);
        }

        if keyword.split_whitespace().nth(1).is_some() {
            return Ok(Some(KeywordMatcher::Phrase(keyword)));
        }

        // `\b` only anchors next to word characters, so keywords such as
        // "c++" get a boundary on the word side alone.
        let leading = if keyword.starts_with(is_word_char) { r"\b" } else { "" };
        let trailing = if keyword.ends_with(is_word_char) { r"\b" } else { "" };
        let pattern = Regex::new(&format!("{leading}{}{trailing}", regex::escape(&keyword)))
            .map_err(|source| RuleSetError::Pattern { keyword, source })?;

        Ok(Some(KeywordMatcher::Word(pattern)))
    }

    /// Test against already-lowercased text.
    pub fn is_match(&self, lowered: &str) -> bool {
        match self {
            KeywordMatcher::Word(pattern) => pattern.is_match(lowered),
            KeywordMatcher::Phrase(phrase) => lowered.contains(phrase.as_str()),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Detection criteria for one category.
#[derive(Debug, Clone, Default)]
pub struct CategoryRule {
    keywords: Vec<KeywordMatcher>,
    tools: Vec<String>,
}

impl CategoryRule {
    /// Compile a rule, deduplicating keywords and tool substrings.
    pub fn compile(spec: &CategoryRuleSpec) -> Result<Self, RuleSetError> {
        let unique_keywords: BTreeSet<String> =
            spec.keywords.iter().map(|k| k.trim().to_lowercase()).collect();

        let mut keywords = Vec::with_capacity(unique_keywords.len());
        for keyword in &unique_keywords {
            if let Some(matcher) = KeywordMatcher::compile(keyword)? {
                keywords.push(matcher);
            }
        }

        let tools: BTreeSet<String> = spec
            .tools
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Self {
            keywords,
            tools: tools.into_iter().collect(),
        })
    }

    pub fn keywords(&self) -> &[KeywordMatcher] {
        &self.keywords
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    /// Number of distinct keywords present in `lowered`.
    pub fn keyword_score(&self, lowered: &str) -> usize {
        self.keywords.iter().filter(|k| k.is_match(lowered)).count()
    }

    /// First configured tool substring contained in `lowered_tool`.
    pub fn matching_tool(&self, lowered_tool: &str) -> Option<&str> {
        self.tools
            .iter()
            .find(|t| lowered_tool.contains(t.as_str()))
            .map(String::as_str)
    }
}

/// Immutable, compiled category configuration.
///
/// Categories iterate in name order, which makes the tool-signal stage
/// deterministic.
#[derive(Debug, Clone)]
pub struct RuleSet {
    default_category: String,
    categories: BTreeMap<String, CategoryRule>,
}

impl RuleSet {
    /// Compile a rule set from its on-disk form.
    ///
    /// Category names are lowercased. The default category is always present
    /// afterwards, with an empty rule if the file did not define it.
    pub fn compile(spec: RuleSetSpec) -> Result<Self, RuleSetError> {
        let mut default_category = spec.default_category.trim().to_lowercase();
        if default_category.is_empty() {
            default_category = FALLBACK_DEFAULT_CATEGORY.to_string();
        }

        let mut categories = BTreeMap::new();
        for (name, rule) in &spec.categories {
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            categories.insert(name, CategoryRule::compile(rule)?);
        }
        categories
            .entry(default_category.clone())
            .or_insert_with(CategoryRule::default);

        tracing::debug!(
            default_category = %default_category,
            categories = categories.len(),
            "Compiled category rule set"
        );

        Ok(Self {
            default_category,
            categories,
        })
    }

    /// The rule set shipped with the crate.
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_RULES_JSON).expect("embedded category rules are valid")
    }

    pub fn from_json_str(content: &str) -> Result<Self, RuleSetError> {
        Self::compile(serde_json::from_str(content)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, RuleSetError> {
        Self::compile(toml::from_str(content)?)
    }

    /// Load a rule file, choosing the format from its extension
    /// (`.json` or `.toml`).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuleSetError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| RuleSetError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Self::from_json_str(&content),
            "toml" => Self::from_toml_str(&content),
            other => Err(RuleSetError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn default_category(&self) -> &str {
        &self.default_category
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn get(&self, category: &str) -> Option<&CategoryRule> {
        self.categories.get(category)
    }

    /// All category names, default included, in name order.
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Categories eligible for keyword and tool signals (everything but the
    /// default), in name order.
    pub fn scored_categories(&self) -> impl Iterator<Item = (&str, &CategoryRule)> {
        self.categories
            .iter()
            .filter(move |(name, _)| name.as_str() != self.default_category)
            .map(|(name, rule)| (name.as_str(), rule))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_load() {
        let rules = RuleSet::builtin();
        assert_eq!(rules.default_category(), "general");
        for category in ["code", "research", "automation", "admin", "general"] {
            assert!(rules.contains(category), "missing {category}");
        }
    }

    #[test]
    fn test_default_category_inserted_when_absent() {
        let rules = RuleSet::from_json_str(
            r#"{"default_category":"misc","categories":{"code":{"keywords":["bug"]}}}"#,
        )
        .unwrap();

        assert!(rules.contains("misc"));
        assert_eq!(rules.get("misc").unwrap().keywords().len(), 0);
        assert_eq!(rules.scored_categories().count(), 1);
    }

    #[test]
    fn test_blank_default_falls_back_to_general() {
        let rules = RuleSet::from_json_str(r#"{"categories":{}}"#).unwrap();
        assert_eq!(rules.default_category(), "general");
        assert!(rules.contains("general"));
    }

    #[test]
    fn test_word_keyword_respects_boundaries() {
        let matcher = KeywordMatcher::compile("Test").unwrap().unwrap();
        assert!(matches!(matcher, KeywordMatcher::Word(_)));
        assert!(matcher.is_match("run the test now"));
        assert!(matcher.is_match("test."));
        assert!(!matcher.is_match("testing the waters"));
        assert!(!matcher.is_match("latest"));
    }

    #[test]
    fn test_phrase_keyword_is_substring() {
        let matcher = KeywordMatcher::compile("stack trace").unwrap().unwrap();
        assert!(matches!(matcher, KeywordMatcher::Phrase(_)));
        assert!(matcher.is_match("here is the stack traceback"));
    }

    #[test]
    fn test_symbol_keyword_matches() {
        let matcher = KeywordMatcher::compile("c++").unwrap().unwrap();
        assert!(matcher.is_match("port this to c++ please"));
        assert!(!matcher.is_match("abc++"));
    }

    #[test]
    fn test_blank_entries_dropped() {
        let rule = CategoryRule::compile(&CategoryRuleSpec {
            keywords: vec!["  ".into(), "Bug".into(), "bug".into()],
            tools: vec!["".into(), " Write ".into()],
        })
        .unwrap();

        assert_eq!(rule.keywords().len(), 1);
        assert_eq!(rule.tools(), ["write".to_string()]);
        assert_eq!(rule.matching_tool("write_file"), Some("write"));
    }

    #[test]
    fn test_toml_rules() {
        let rules = RuleSet::from_toml_str(
            r#"
default_category = "general"

[categories.ops]
keywords = ["deploy", "rollback"]
tools = ["kubectl"]
"#,
        )
        .unwrap();

        assert!(rules.contains("ops"));
        assert_eq!(rules.get("ops").unwrap().tools(), ["kubectl".to_string()]);
    }

    #[test]
    fn test_from_path_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, "categories: {}").unwrap();

        assert!(matches!(
            RuleSet::from_path(&path),
            Err(RuleSetError::UnsupportedFormat(ext)) if ext == "yaml"
        ));
    }
}
