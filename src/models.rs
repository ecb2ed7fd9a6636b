use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::filter::QuestionFilter;

/// Ordinal difficulty classification of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy = 1,
    Medium = 2,
    Hard = 3,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Integer level used by the persisted filter encoding and the `questions` table
    pub fn level(self) -> i64 {
        self as i64
    }

    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(Difficulty::Easy),
            2 => Some(Difficulty::Medium),
            3 => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Difficulty::ALL
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(label.trim()))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub difficulty: Difficulty,
    pub tags: BTreeSet<String>,
    pub companies: BTreeSet<String>,
    pub solved: bool,
    pub saved: bool,
    pub top_liked: bool,
    pub top_interviewed: bool,
}

impl Question {
    pub fn flag(&self, kind: ListKind) -> bool {
        match kind {
            ListKind::Solved => self.solved,
            ListKind::Saved => self.saved,
        }
    }
}

/// One entry of the bundled question dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedQuestion {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub difficulty: i64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub top_liked: bool,
    #[serde(default)]
    pub top_interviewed: bool,
}

/// The two user-state lists a question can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Solved,
    Saved,
}

impl ListKind {
    pub const ALL: [ListKind; 2] = [ListKind::Solved, ListKind::Saved];

    pub fn as_str(self) -> &'static str {
        match self {
            ListKind::Solved => "solved",
            ListKind::Saved => "saved",
        }
    }

    /// Column on `questions` holding the per-question flag for this list
    pub(crate) fn flag_column(self) -> &'static str {
        match self {
            ListKind::Solved => "solved",
            ListKind::Saved => "saved",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "solved" => Ok(ListKind::Solved),
            "saved" => Ok(ListKind::Saved),
            other => Err(anyhow::anyhow!("Unknown list '{}'", other)),
        }
    }
}

/// Transport form of a list: the comma-joined id string exchanged across devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub kind: ListKind,
    pub ids: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyProgress {
    pub difficulty: Difficulty,
    pub total: i64,
    pub solved: i64,
    pub saved: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStats {
    pub total: i64,
    pub solved: i64,
    pub saved: i64,
    pub levels: Vec<DifficultyProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub question_id: i64,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveNoteRequest {
    pub content: String,
}

/// Identifier of a solution language, e.g. "Swift" or "C++"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    pub fn new(name: impl Into<String>) -> Self {
        Language(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The languages offered out of the box
    pub fn builtin() -> Vec<Language> {
        ["Swift", "Python", "Java", "C++", "JavaScript"]
            .into_iter()
            .map(Language::new)
            .collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Solution snippets for one question, keyed by language
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub question_id: i64,
    pub snippets: BTreeMap<Language, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "content", rename_all = "snake_case")]
pub enum SolutionSlot {
    Available(String),
    NotAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub time: NaiveTime,
    /// Fire date of a one-shot reminder; ignored when repeat days are set
    pub date: Option<NaiveDate>,
    /// Weekdays, 1 = Sunday through 7 = Saturday
    pub repeat_days: BTreeSet<u8>,
    pub enabled: bool,
    pub filter: Option<QuestionFilter>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    pub fn is_one_shot(&self) -> bool {
        self.repeat_days.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReminderRequest {
    pub time: NaiveTime,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub repeat_days: BTreeSet<u8>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub filter: Option<QuestionFilter>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReminderRequest {
    pub time: Option<NaiveTime>,
    pub date: Option<NaiveDate>,
    pub repeat_days: Option<BTreeSet<u8>>,
    pub enabled: Option<bool>,
    /// `Some(None)` clears the filter
    #[serde(default, with = "double_option")]
    pub filter: Option<Option<QuestionFilter>>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<Option<T>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<T>>, D::Error> {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
