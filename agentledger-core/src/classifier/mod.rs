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

//! Activity Category Classifier
//!
//! Deterministic, signal-layered classification of an agent turn. Signals are
//! consulted in a fixed order and the first decisive one wins:
//!
//! ```text
//! explicit "category: x" ─► prompt keywords ─► tool names ─► assistant keywords ─► default
//! ```
//!
//! Keyword stages only decide when one category scores at least
//! [`MIN_KEYWORD_SCORE`] and strictly beats every other category. A tie is
//! treated as no signal and classification falls through to the next stage.

pub mod rules;

pub use rules::{
    CategoryRule, CategoryRuleSpec, KeywordMatcher, RuleSet, RuleSetError, RuleSetSpec,
    FALLBACK_DEFAULT_CATEGORY,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Minimum keyword score for a keyword stage to decide.
pub const MIN_KEYWORD_SCORE: usize = 2;

static EXPLICIT_CATEGORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)category\s*:\s*([a-z_]+)").expect("valid override pattern"));

/// Observable inputs of one agent turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    #[serde(default)]
    pub prompt_text: String,
    #[serde(default)]
    pub assistant_text: String,
    /// Tool identifiers in the order they were used.
    #[serde(default)]
    pub tools_used: Vec<String>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(mut self, text: impl Into<String>) -> Self {
        self.prompt_text = text.into();
        self
    }

    pub fn assistant(mut self, text: impl Into<String>) -> Self {
        self.assistant_text = text.into();
        self
    }

    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools_used = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// Which signal decided a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    ExplicitOverride { category: String },
    PromptKeywordScore { category: String, score: usize },
    ToolSignal { tool: String },
    AssistantKeywordScore { category: String, score: usize },
    Fallback,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ExplicitOverride { category } => {
                write!(f, "explicit_override:category={category}")
            }
            Reason::PromptKeywordScore { category, score } => {
                write!(f, "prompt_keyword_score:{category}={score}")
            }
            Reason::ToolSignal { tool } => write!(f, "tool_signal:{tool}"),
            Reason::AssistantKeywordScore { category, score } => {
                write!(f, "assistant_keyword_score:{category}={score}")
            }
            Reason::Fallback => write!(f, "fallback:insufficient_signals"),
        }
    }
}

/// Result of classifying one set of signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub reason: Reason,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.category, self.reason)
    }
}

/// Classify `signals` against `rules`.
///
/// Pure and infallible: insufficient or ambiguous signals degrade to the
/// default category.
pub fn classify(signals: &Signals, rules: &RuleSet) -> Classification {
    if let Some(category) = explicit_override(signals, rules) {
        return Classification {
            reason: Reason::ExplicitOverride {
                category: category.clone(),
            },
            category,
        };
    }

    if let Some((category, score)) = keyword_winner(&signals.prompt_text, rules) {
        return Classification {
            reason: Reason::PromptKeywordScore {
                category: category.clone(),
                score,
            },
            category,
        };
    }

    if let Some((category, tool)) = tool_signal(&signals.tools_used, rules) {
        return Classification {
            category,
            reason: Reason::ToolSignal { tool },
        };
    }

    if let Some((category, score)) = keyword_winner(&signals.assistant_text, rules) {
        return Classification {
            reason: Reason::AssistantKeywordScore {
                category: category.clone(),
                score,
            },
            category,
        };
    }

    Classification {
        category: rules.default_category().to_string(),
        reason: Reason::Fallback,
    }
}

fn explicit_override(signals: &Signals, rules: &RuleSet) -> Option<String> {
    let joined = format!("{}\n{}", signals.prompt_text, signals.assistant_text).to_lowercase();
    if joined.trim().is_empty() {
        return None;
    }

    // Only the first "category:" mention counts.
    let candidate = EXPLICIT_CATEGORY.captures(&joined)?.get(1)?.as_str().trim();
    rules.contains(candidate).then(|| candidate.to_string())
}

/// Strict top keyword score, if it reaches [`MIN_KEYWORD_SCORE`] untied.
fn keyword_winner(text: &str, rules: &RuleSet) -> Option<(String, usize)> {
    if text.trim().is_empty() {
        return None;
    }
    let lowered = text.to_lowercase();

    let mut best: Option<(&str, usize)> = None;
    let mut tied = false;
    for (category, rule) in rules.scored_categories() {
        let score = rule.keyword_score(&lowered);
        if score == 0 {
            continue;
        }
        match best {
            Some((_, top)) if score < top => {}
            Some((_, top)) if score == top => tied = true,
            _ => {
                best = Some((category, score));
                tied = false;
            }
        }
    }

    match best {
        Some((category, score)) if !tied && score >= MIN_KEYWORD_SCORE => {
            Some((category.to_string(), score))
        }
        _ => None,
    }
}

fn tool_signal(tools: &[String], rules: &RuleSet) -> Option<(String, String)> {
    for raw in tools {
        let tool = raw.trim().to_lowercase();
        if tool.is_empty() {
            continue;
        }
        for (category, rule) in rules.scored_categories() {
            if rule.matching_tool(&tool).is_some() {
                return Some((category.to_string(), tool));
            }
        }
    }
    None
}

/// A [`RuleSet`] bundled for injection into request handlers.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Arc<RuleSet>,
}

impl Classifier {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    /// Classifier over the built-in rule set.
    pub fn builtin() -> Self {
        Self::new(Arc::new(RuleSet::builtin()))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn classify(&self, signals: &Signals) -> Classification {
        classify(signals, &self.rules)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin(signals: Signals) -> Classification {
        classify(&signals, &RuleSet::builtin())
    }

    #[test]
    fn test_explicit_override_wins() {
        let result = builtin(
            Signals::new()
                .prompt("Category: research please handle this")
                .tools(["write_file"]),
        );
        assert_eq!(result.category, "research");
        assert_eq!(result.reason.to_string(), "explicit_override:category=research");
    }

    #[test]
    fn test_explicit_override_in_assistant_text() {
        let result = builtin(
            Signals::new()
                .prompt("fix the bug and refactor the code")
                .assistant("noted. CATEGORY : admin"),
        );
        assert_eq!(result.category, "admin");
    }

    #[test]
    fn test_unknown_explicit_category_is_ignored() {
        let result = builtin(Signals::new().prompt("category: gardening, fix this bug in the code"));
        assert_eq!(result.category, "code");
        assert!(matches!(result.reason, Reason::PromptKeywordScore { .. }));
    }

    #[test]
    fn test_prompt_keywords_beat_tool_signal() {
        let result = builtin(
            Signals::new()
                .prompt("please research and compare this")
                .tools(["write_file"]),
        );
        assert_eq!(result.category, "research");
        assert_eq!(result.reason.to_string(), "prompt_keyword_score:research=2");
    }

    #[test]
    fn test_keyword_score_picks_highest() {
        let result = builtin(
            Signals::new()
                .prompt("open a jira ticket and schedule cron automation")
                .assistant("I will automate this with cron"),
        );
        assert_eq!(result.category, "automation");
        assert_eq!(result.reason.to_string(), "prompt_keyword_score:automation=3");
    }

    #[test]
    fn test_tool_signal_beats_assistant_keywords() {
        let result = builtin(
            Signals::new()
                .prompt("please take a look")
                .assistant("here is research and findings")
                .tools(["write_file"]),
        );
        assert_eq!(result.category, "code");
        assert_eq!(result.reason.to_string(), "tool_signal:write_file");
    }

    #[test]
    fn test_assistant_keywords_used_without_tools() {
        let result = builtin(
            Signals::new()
                .prompt("please take a look")
                .assistant("here is research and findings"),
        );
        assert_eq!(result.category, "research");
        assert_eq!(result.reason.to_string(), "assistant_keyword_score:research=2");
    }

    #[test]
    fn test_falls_back_to_default() {
        let result = builtin(Signals::new().prompt("hello friend").assistant("nice to meet you"));
        assert_eq!(result.category, "general");
        assert_eq!(result.reason, Reason::Fallback);
        assert_eq!(result.reason.to_string(), "fallback:insufficient_signals");
    }

    #[test]
    fn test_testing_is_not_the_test_keyword() {
        let result = builtin(
            Signals::new()
                .prompt("Reply with a simple yes here. Testing.")
                .assistant("Yes"),
        );
        assert_eq!(result.category, "general");
    }

    #[test]
    fn test_single_keyword_is_not_enough() {
        let result = builtin(Signals::new().prompt("new test. say hi.").assistant("hi"));
        assert_eq!(result.category, "general");
    }

    #[test]
    fn test_release_prompt_maps_to_admin() {
        let result = builtin(
            Signals::new()
                .prompt("OpenClaw update: check release docs for Discord /vc and tell me what we can do")
                .assistant("I reviewed the release notes and Discord feature details"),
        );
        assert_eq!(result.category, "admin");
    }

    #[test]
    fn test_tied_prompt_scores_fall_through() {
        let rules = RuleSet::from_json_str(
            r#"{
                "default_category": "general",
                "categories": {
                    "alpha": {"keywords": ["one", "two"], "tools": []},
                    "beta": {"keywords": ["three", "four"], "tools": ["beta_tool"]}
                }
            }"#,
        )
        .unwrap();

        let tied = Signals::new().prompt("one two three four");
        let result = classify(&tied, &rules);
        assert_eq!(result.category, "general");

        let result = classify(&tied.clone().tools(["Beta_Tool_v2"]), &rules);
        assert_eq!(result.category, "beta");
        assert_eq!(result.reason.to_string(), "tool_signal:beta_tool_v2");
    }

    #[test]
    fn test_tools_checked_in_given_order() {
        let result = builtin(Signals::new().tools(["  ", "web_search", "write_file"]));
        assert_eq!(result.category, "research");
        assert_eq!(result.reason.to_string(), "tool_signal:web_search");
    }

    #[test]
    fn test_default_category_tools_are_ignored() {
        let rules = RuleSet::from_json_str(
            r#"{
                "default_category": "general",
                "categories": {"general": {"keywords": ["hello", "friend"], "tools": ["write"]}}
            }"#,
        )
        .unwrap();

        let result = classify(
            &Signals::new().prompt("hello friend").tools(["write_file"]),
            &rules,
        );
        assert_eq!(result.reason, Reason::Fallback);
    }

    #[test]
    fn test_whitespace_signals_fall_back() {
        let result = builtin(Signals::new().prompt("   \n").assistant("\t").tools([" "]));
        assert_eq!(result.reason, Reason::Fallback);
    }

    #[test]
    fn test_classifier_handle_shares_rules() {
        let classifier = Classifier::builtin();
        let cloned = classifier.clone();
        let signals = Signals::new().prompt("please research and compare this");

        assert_eq!(classifier.classify(&signals), cloned.classify(&signals));
        assert_eq!(classifier.rules().default_category(), "general");
    }
}
