use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeSet;

use crate::filter::QuestionFilter;
use crate::models::{Difficulty, Question};

/// A filter plus the two modifiers the question list applies on top of it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionQuery {
    #[serde(default)]
    pub filter: QuestionFilter,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub only_unsolved: bool,
}

impl QuestionQuery {
    pub fn new(filter: QuestionFilter) -> Self {
        Self {
            filter,
            text: None,
            only_unsolved: false,
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn only_unsolved(mut self, only_unsolved: bool) -> Self {
        self.only_unsolved = only_unsolved;
        self
    }

    /// Build the conjunction of every active clause. Inactive selections
    /// contribute nothing, so an empty query matches all questions.
    pub fn compile(&self) -> QuestionPredicate {
        let filter = &self.filter;
        let mut clauses = Vec::new();

        if let Some(text) = self.text.as_deref().map(str::trim) {
            if !text.is_empty() {
                clauses.push(Clause::TitleContains(text.to_lowercase()));
            }
        }
        if !filter.tags.is_empty() {
            clauses.push(Clause::AnyTag(filter.tags.clone()));
        }
        if !filter.companies.is_empty() {
            clauses.push(Clause::AnyCompany(filter.companies.clone()));
        }
        if !filter.levels.is_empty() {
            clauses.push(Clause::LevelIn(filter.levels.clone()));
        }
        // Both remarks selected means both must hold
        if filter.top_liked {
            clauses.push(Clause::TopLiked);
        }
        if filter.top_interviewed {
            clauses.push(Clause::TopInterviewed);
        }
        if filter.saved == Some(true) {
            clauses.push(Clause::Saved);
        }
        if filter.solved == Some(true) {
            clauses.push(Clause::Solved);
        }
        if self.only_unsolved {
            clauses.push(Clause::Unsolved);
        }

        QuestionPredicate { clauses }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// Lowercased needle, matched against the lowercased title.
    /// SQL compares against the `title_folded` column.
    TitleContains(String),
    AnyTag(BTreeSet<String>),
    AnyCompany(BTreeSet<String>),
    LevelIn(BTreeSet<Difficulty>),
    TopLiked,
    TopInterviewed,
    Saved,
    Solved,
    Unsolved,
}

impl Clause {
    fn matches(&self, question: &Question) -> bool {
        match self {
            Clause::TitleContains(needle) => question.title.to_lowercase().contains(needle.as_str()),
            Clause::AnyTag(tags) => question.tags.iter().any(|tag| tags.contains(tag)),
            Clause::AnyCompany(companies) => question
                .companies
                .iter()
                .any(|company| companies.contains(company)),
            Clause::LevelIn(levels) => levels.contains(&question.difficulty),
            Clause::TopLiked => question.top_liked,
            Clause::TopInterviewed => question.top_interviewed,
            Clause::Saved => question.saved,
            Clause::Solved => question.solved,
            Clause::Unsolved => !question.solved,
        }
    }

    fn push_sql(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Clause::TitleContains(needle) => {
                builder.push("instr(q.title_folded, ");
                builder.push_bind(needle.clone());
                builder.push(") > 0");
            }
            Clause::AnyTag(tags) => {
                builder.push(
                    "EXISTS (SELECT 1 FROM question_tags t WHERE t.question_id = q.id AND t.name IN (",
                );
                let mut names = builder.separated(", ");
                for tag in tags {
                    names.push_bind(tag.clone());
                }
                names.push_unseparated("))");
            }
            Clause::AnyCompany(companies) => {
                builder.push(
                    "EXISTS (SELECT 1 FROM question_companies c WHERE c.question_id = q.id AND c.name IN (",
                );
                let mut names = builder.separated(", ");
                for company in companies {
                    names.push_bind(company.clone());
                }
                names.push_unseparated("))");
            }
            Clause::LevelIn(levels) => {
                builder.push("q.difficulty IN (");
                let mut values = builder.separated(", ");
                for level in levels {
                    values.push_bind(level.level());
                }
                values.push_unseparated(")");
            }
            Clause::TopLiked => {
                builder.push("q.top_liked = 1");
            }
            Clause::TopInterviewed => {
                builder.push("q.top_interviewed = 1");
            }
            Clause::Saved => {
                builder.push("q.saved = 1");
            }
            Clause::Solved => {
                builder.push("q.solved = 1");
            }
            Clause::Unsolved => {
                builder.push("q.solved = 0");
            }
        }
    }
}

/// Conjunction of clauses over the question collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionPredicate {
    clauses: Vec<Clause>,
}

impl QuestionPredicate {
    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, question: &Question) -> bool {
        self.clauses.iter().all(|clause| clause.matches(question))
    }

    /// Append a `WHERE` section for a query over `questions q`.
    /// Nothing is appended when there are no clauses.
    pub fn push_sql(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        for (index, clause) in self.clauses.iter().enumerate() {
            builder.push(if index == 0 { " WHERE " } else { " AND " });
            clause.push_sql(builder);
        }
    }
}
