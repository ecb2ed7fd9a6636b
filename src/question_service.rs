use anyhow::Result;
use std::collections::BTreeSet;

use crate::database::Database;
use crate::models::*;
use crate::query::QuestionQuery;
use crate::reconciler::{ListReconciler, ReconcileReport};

#[derive(Clone)]
pub struct QuestionService {
    db: Database,
    reconciler: ListReconciler,
}

impl QuestionService {
    pub fn new(db: Database) -> Self {
        Self {
            reconciler: ListReconciler::new(db.clone()),
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn reconciler(&self) -> &ListReconciler {
        &self.reconciler
    }

    // Question reads
    pub async fn get_question(&self, id: i64) -> Result<Option<Question>> {
        self.db.get_question(id).await
    }

    pub async fn get_all_questions(&self) -> Result<Vec<Question>> {
        self.db.get_all_questions().await
    }

    pub async fn search(&self, query: &QuestionQuery) -> Result<Vec<Question>> {
        let predicate = query.compile();
        self.db.query_questions(&predicate).await
    }

    // Solved / saved state
    pub async fn toggle_solved(&self, id: i64) -> Result<Option<Question>> {
        self.reconciler.toggle(ListKind::Solved, id).await
    }

    pub async fn toggle_saved(&self, id: i64) -> Result<Option<Question>> {
        self.reconciler.toggle(ListKind::Saved, id).await
    }

    pub async fn list_ids(&self, kind: ListKind) -> Result<BTreeSet<i64>> {
        self.db.list_member_ids(kind).await
    }

    pub async fn list_snapshot(&self, kind: ListKind) -> Result<ListSnapshot> {
        self.reconciler.snapshot(kind).await
    }

    /// Apply lists received from another device
    pub async fn apply_remote_lists(&self, snapshots: &[ListSnapshot]) -> Result<ReconcileReport> {
        self.reconciler.reconcile(snapshots).await
    }

    // Facets for the filter screen
    pub async fn tags(&self) -> Result<Vec<FacetCount>> {
        self.db.tag_counts().await
    }

    pub async fn companies(&self) -> Result<Vec<FacetCount>> {
        self.db.company_counts().await
    }

    pub async fn stats(&self) -> Result<ProgressStats> {
        self.db.progress_stats().await
    }

    // Notes
    pub async fn note(&self, question_id: i64) -> Result<Option<Note>> {
        self.db.get_note(question_id).await
    }

    pub async fn save_note(&self, question_id: i64, content: &str) -> Result<Option<Note>> {
        self.db.save_note(question_id, content).await
    }
}
