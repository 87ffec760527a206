//! Structured conversation state: the records exchanged between the
//! summarizer, the semantic diff, and the merge executor.
//!
//! A [`StateRecord`] is what a branch "knows" — four ordered item lists
//! plus a topic line. A [`StateDiff`] is the per-category delta between two
//! records, and a [`ConflictRecord`] marks an overlap between two diffs
//! that cannot be mechanically reconciled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The four semantic categories tracked by state summaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Facts,
    Decisions,
    OpenQuestions,
    Assumptions,
}

impl Category {
    pub const ALL: [Category; 4] =
        [Category::Facts, Category::Decisions, Category::OpenQuestions, Category::Assumptions];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Facts => "facts",
            Self::Decisions => "decisions",
            Self::OpenQuestions => "open_questions",
            Self::Assumptions => "assumptions",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured summary of one branch of conversation. Item order is the
/// summarizer's; the engine preserves it and does not deduplicate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub topic: String,
}

impl StateRecord {
    /// The empty record returned when summarization has failed outright.
    pub fn unknown() -> Self {
        Self { topic: "unknown".into(), ..Self::default() }
    }

    pub fn items(&self, category: Category) -> &[String] {
        match category {
            Category::Facts => &self.facts,
            Category::Decisions => &self.decisions,
            Category::OpenQuestions => &self.open_questions,
            Category::Assumptions => &self.assumptions,
        }
    }

    pub fn items_mut(&mut self, category: Category) -> &mut Vec<String> {
        match category {
            Category::Facts => &mut self.facts,
            Category::Decisions => &mut self.decisions,
            Category::OpenQuestions => &mut self.open_questions,
            Category::Assumptions => &mut self.assumptions,
        }
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|c| self.items(*c).is_empty())
    }
}

/// A base item rewritten on one side: same handle, different text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangedItem {
    pub before: String,
    pub after: String,
}

/// Per-category additions, removals, and rewrites between two records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    #[serde(default)]
    pub added: BTreeMap<Category, Vec<String>>,
    #[serde(default)]
    pub removed: BTreeMap<Category, Vec<String>>,
    #[serde(default)]
    pub changed: BTreeMap<Category, Vec<ChangedItem>>,
}

impl StateDiff {
    pub fn added_in(&self, category: Category) -> &[String] {
        self.added.get(&category).map_or(&[], Vec::as_slice)
    }

    pub fn removed_in(&self, category: Category) -> &[String] {
        self.removed.get(&category).map_or(&[], Vec::as_slice)
    }

    pub fn changed_in(&self, category: Category) -> &[ChangedItem] {
        self.changed.get(&category).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.added.values().all(Vec::is_empty)
            && self.removed.values().all(Vec::is_empty)
            && self.changed.values().all(Vec::is_empty)
    }
}

/// How two branch diffs collide on one item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both branches rewrote the same base item to different texts.
    BothModified,
    /// One branch added what the other removed.
    Contradicts,
    /// Both branches added different items about the same thing.
    Diverges,
}

impl ConflictKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BothModified => "both_modified",
            Self::Contradicts => "contradicts",
            Self::Diverges => "diverges",
        }
    }
}

/// One detected conflict between the two sides of a merge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub category: Category,
    pub left_item: String,
    pub right_item: String,
    pub kind: ConflictKind,
}
