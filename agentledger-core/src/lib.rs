// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Agentledger Core
//!
//! Activity record model, category classification, and the ingestion
//! defaulting rules shared by live ingestion and queue replay.

pub mod activity;
pub mod classifier;
pub mod normalize;

pub use activity::{
    ActivityFilters, ActivityRecord, ActivitySummary, InvalidDateFilter, DATE_FILTER_FORMAT,
};
pub use classifier::{
    classify, CategoryRule, CategoryRuleSpec, Classification, Classifier, KeywordMatcher, Reason,
    RuleSet, RuleSetError, RuleSetSpec, Signals, FALLBACK_DEFAULT_CATEGORY, MIN_KEYWORD_SCORE,
};
pub use normalize::{apply_classification, apply_defaults, IngestRequest};
