//! Keeps per-question flags and Solved/Saved list membership consistent.
//!
//! Membership is stored once, as rows in `list_members`. The comma-joined
//! id string only exists at the sync boundary: [`encode_ids`] produces it
//! for outbound snapshots and [`decode_ids`] reads inbound ones, which are
//! authoritative when they disagree with local state.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::database::{self, Database};
use crate::events::StoreEvent;
use crate::models::{ListKind, ListSnapshot, Question};
use crate::{log_service_error, log_service_success};

/// Comma-joined ascending ids
pub fn encode_ids(ids: &BTreeSet<i64>) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a comma-joined id string. Empty and unparseable tokens are dropped.
pub fn decode_ids(encoded: &str) -> BTreeSet<i64> {
    encoded
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<i64>().ok())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListChange {
    pub kind: ListKind,
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub changed: bool,
    pub lists: Vec<ListChange>,
    /// Ids in an inbound snapshot with no backing question
    pub skipped_unknown: usize,
}

impl ReconcileReport {
    /// Every question whose flag or membership was rewritten
    pub fn touched(&self) -> BTreeSet<i64> {
        self.lists
            .iter()
            .flat_map(|change| change.added.iter().chain(change.removed.iter()))
            .copied()
            .collect()
    }
}

/// Differences between the authoritative set and local state for one list
struct ListDiff {
    kind: ListKind,
    add: BTreeSet<i64>,
    remove: BTreeSet<i64>,
}

impl ListDiff {
    fn compute(
        kind: ListKind,
        authoritative: &BTreeSet<i64>,
        members: &BTreeSet<i64>,
        flagged: &BTreeSet<i64>,
    ) -> Self {
        // Present ids need both the flag and the membership row
        let add = authoritative
            .iter()
            .filter(|id| !members.contains(*id) || !flagged.contains(*id))
            .copied()
            .collect();
        let remove = members
            .union(flagged)
            .filter(|id| !authoritative.contains(*id))
            .copied()
            .collect();
        ListDiff { kind, add, remove }
    }

    fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[derive(Clone)]
pub struct ListReconciler {
    db: Database,
}

impl ListReconciler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Flip one question's flag and update its list membership in the
    /// same gated transaction. Unknown ids are a no-op returning `None`.
    pub async fn toggle(&self, kind: ListKind, question_id: i64) -> Result<Option<Question>> {
        let mut txn = self.db.begin_write().await?;

        let Some(current) = database::fetch_flag(txn.conn(), kind, question_id).await? else {
            debug!(question_id, list = %kind, "Toggle ignored for unknown question");
            return Ok(None);
        };

        let flagged = !current;
        database::set_flag(txn.conn(), kind, question_id, flagged).await?;
        if flagged {
            database::insert_member(txn.conn(), kind, question_id).await?;
        } else {
            database::delete_member(txn.conn(), kind, question_id).await?;
        }
        let question = database::fetch_question(txn.conn(), question_id).await?;
        txn.commit().await?;

        debug!(question_id, list = %kind, flagged, "List flag toggled");
        self.db.events().publish(StoreEvent::QuestionChanged { id: question_id });
        self.db
            .events()
            .publish(StoreEvent::ListsChanged { kinds: vec![kind] });
        Ok(question)
    }

    /// Outbound transport form of a list
    pub async fn snapshot(&self, kind: ListKind) -> Result<ListSnapshot> {
        let ids = self.db.list_member_ids(kind).await?;
        Ok(ListSnapshot {
            kind,
            ids: encode_ids(&ids),
        })
    }

    /// Bring flags and membership in line with inbound snapshots.
    ///
    /// The snapshot read and every write happen in one transaction under
    /// the write gate, so a concurrent toggle is either fully before or
    /// fully after this pass. A second call with the same snapshots finds
    /// nothing to do and writes nothing.
    pub async fn reconcile(&self, snapshots: &[ListSnapshot]) -> Result<ReconcileReport> {
        let started = Instant::now();

        // Later snapshots of the same list supersede earlier ones
        let latest: BTreeMap<ListKind, &ListSnapshot> = snapshots
            .iter()
            .map(|snapshot| (snapshot.kind, snapshot))
            .collect();

        let mut txn = self.db.begin_write().await?;
        let mut report = ReconcileReport::default();
        let mut diffs = Vec::new();

        for (kind, snapshot) in latest {
            let decoded = decode_ids(&snapshot.ids);
            let authoritative = database::existing_question_ids(txn.conn(), &decoded).await?;
            report.skipped_unknown += decoded.len() - authoritative.len();

            let members = database::fetch_members(txn.conn(), kind).await?;
            let flagged = database::fetch_flagged(txn.conn(), kind).await?;
            let diff = ListDiff::compute(kind, &authoritative, &members, &flagged);
            if !diff.is_empty() {
                diffs.push(diff);
            }
        }

        if diffs.is_empty() {
            // Dropping the transaction releases the gate without writing
            debug!(
                skipped_unknown = report.skipped_unknown,
                "Lists already consistent, nothing to reconcile"
            );
            return Ok(report);
        }

        for diff in &diffs {
            for &id in &diff.add {
                database::set_flag(txn.conn(), diff.kind, id, true).await?;
                database::insert_member(txn.conn(), diff.kind, id).await?;
            }
            for &id in &diff.remove {
                database::set_flag(txn.conn(), diff.kind, id, false).await?;
                database::delete_member(txn.conn(), diff.kind, id).await?;
            }
        }
        txn.commit().await?;

        report.changed = true;
        report.lists = diffs
            .iter()
            .map(|diff| ListChange {
                kind: diff.kind,
                added: diff.add.iter().copied().collect(),
                removed: diff.remove.iter().copied().collect(),
            })
            .collect();

        let touched = report.touched();
        for &id in &touched {
            self.db.events().publish(StoreEvent::QuestionChanged { id });
        }
        self.db.events().publish(StoreEvent::ListsChanged {
            kinds: diffs.iter().map(|diff| diff.kind).collect(),
        });

        log_service_success!(
            "list_reconciler",
            "reconcile",
            count = touched.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(report)
    }
}

/// One inbound sync merge. `reply`, when present, receives the outcome.
#[derive(Debug)]
pub struct InboundBatch {
    pub snapshots: Vec<ListSnapshot>,
    pub reply: Option<oneshot::Sender<Result<ReconcileReport>>>,
}

impl From<Vec<ListSnapshot>> for InboundBatch {
    fn from(snapshots: Vec<ListSnapshot>) -> Self {
        Self {
            snapshots,
            reply: None,
        }
    }
}

/// Apply inbound sync batches one at a time, in arrival order.
/// A failed batch is logged and abandoned; the worker keeps running until
/// every sender is dropped.
pub fn spawn_reconcile_worker(
    reconciler: ListReconciler,
    mut inbound: mpsc::Receiver<InboundBatch>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = inbound.recv().await {
            let outcome = reconciler.reconcile(&batch.snapshots).await;
            if let Err(error) = &outcome {
                log_service_error!("list_reconciler", "reconcile_batch", error = error);
            }
            if let Some(reply) = batch.reply {
                // The submitter may have gone away
                let _ = reply.send(outcome);
            }
        }
        debug!("Reconcile worker stopped, inbound channel closed");
    })
}

/// Sending side of the reconcile worker, shared by every sync entry point
#[derive(Debug, Clone)]
pub struct ListSync {
    sender: mpsc::Sender<InboundBatch>,
}

impl ListSync {
    pub fn spawn(reconciler: ListReconciler, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let worker = spawn_reconcile_worker(reconciler, receiver);
        (Self { sender }, worker)
    }

    /// Queue a merge behind any earlier ones and wait for its report
    pub async fn submit(&self, snapshots: Vec<ListSnapshot>) -> Result<ReconcileReport> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(InboundBatch {
                snapshots,
                reply: Some(reply),
            })
            .await
            .map_err(|_| anyhow!("reconcile worker is not running"))?;
        outcome
            .await
            .map_err(|_| anyhow!("reconcile worker dropped the batch"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeedQuestion;

    #[test]
    fn test_encode_ids_is_sorted_and_comma_joined() {
        assert_eq!(encode_ids(&BTreeSet::from([9, 3, 7])), "3,7,9");
        assert_eq!(encode_ids(&BTreeSet::new()), "");
    }

    #[test]
    fn test_decode_ids_drops_malformed_tokens() {
        assert_eq!(decode_ids("3, 7,,abc, 9 ,-"), BTreeSet::from([3, 7, 9]));
        assert!(decode_ids("").is_empty());
        assert!(decode_ids(" , ,").is_empty());
    }

    #[test]
    fn test_diff_covers_flag_and_membership_drift() {
        let diff = ListDiff::compute(
            ListKind::Solved,
            &BTreeSet::from([3, 7]),
            &BTreeSet::from([7, 9]),
            &BTreeSet::from([7, 9, 11]),
        );
        assert_eq!(diff.add, BTreeSet::from([3]));
        assert_eq!(diff.remove, BTreeSet::from([9, 11]));
    }

    async fn create_test_reconciler() -> (Database, ListReconciler) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let seeds: Vec<SeedQuestion> = (1..=5)
            .map(|id| SeedQuestion {
                id,
                title: format!("Question {}", id),
                body: String::new(),
                difficulty: 1,
                tags: vec![],
                companies: vec![],
                top_liked: false,
                top_interviewed: false,
            })
            .collect();
        db.seed_questions(&seeds).await.unwrap();
        let reconciler = ListReconciler::new(db.clone());
        (db, reconciler)
    }

    #[tokio::test]
    async fn test_toggle_unknown_question_is_noop() {
        let (db, reconciler) = create_test_reconciler().await;
        assert!(reconciler.toggle(ListKind::Saved, 404).await.unwrap().is_none());
        assert!(db.list_member_ids(ListKind::Saved).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_state() {
        let (db, reconciler) = create_test_reconciler().await;
        let on = reconciler.toggle(ListKind::Solved, 2).await.unwrap().unwrap();
        assert!(on.solved);
        assert_eq!(db.list_member_ids(ListKind::Solved).await.unwrap(), BTreeSet::from([2]));

        let off = reconciler.toggle(ListKind::Solved, 2).await.unwrap().unwrap();
        assert!(!off.solved);
        assert!(db.list_member_ids(ListKind::Solved).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_skips_unknown_ids() {
        let (db, reconciler) = create_test_reconciler().await;
        let report = reconciler
            .reconcile(&[ListSnapshot {
                kind: ListKind::Saved,
                ids: "1,999".to_string(),
            }])
            .await
            .unwrap();

        assert!(report.changed);
        assert_eq!(report.skipped_unknown, 1);
        assert_eq!(db.list_member_ids(ListKind::Saved).await.unwrap(), BTreeSet::from([1]));

        let again = reconciler
            .reconcile(&[ListSnapshot {
                kind: ListKind::Saved,
                ids: "1,999".to_string(),
            }])
            .await
            .unwrap();
        assert!(!again.changed);
    }

    #[tokio::test]
    async fn test_later_snapshot_of_same_list_wins() {
        let (db, reconciler) = create_test_reconciler().await;
        reconciler
            .reconcile(&[
                ListSnapshot {
                    kind: ListKind::Solved,
                    ids: "1,2".to_string(),
                },
                ListSnapshot {
                    kind: ListKind::Solved,
                    ids: "4".to_string(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(db.flagged_ids(ListKind::Solved).await.unwrap(), BTreeSet::from([4]));
    }

    #[tokio::test]
    async fn test_worker_applies_batches_in_order() {
        let (db, reconciler) = create_test_reconciler().await;
        let (sender, receiver) = mpsc::channel(8);
        let worker = spawn_reconcile_worker(reconciler, receiver);

        for ids in ["1", "1,2", "2,3"] {
            sender
                .send(InboundBatch::from(vec![ListSnapshot {
                    kind: ListKind::Saved,
                    ids: ids.to_string(),
                }]))
                .await
                .unwrap();
        }
        drop(sender);
        worker.await.unwrap();

        assert_eq!(db.list_member_ids(ListKind::Saved).await.unwrap(), BTreeSet::from([2, 3]));
        assert_eq!(db.flagged_ids(ListKind::Saved).await.unwrap(), BTreeSet::from([2, 3]));
    }

    #[tokio::test]
    async fn test_list_sync_reports_each_submission() {
        let (db, reconciler) = create_test_reconciler().await;
        let (sync, worker) = ListSync::spawn(reconciler, 4);

        let inbound = vec![ListSnapshot {
            kind: ListKind::Solved,
            ids: "1,3,99".to_string(),
        }];
        let first = sync.submit(inbound.clone()).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.skipped_unknown, 1);
        assert!(!sync.submit(inbound).await.unwrap().changed);
        assert_eq!(db.list_member_ids(ListKind::Solved).await.unwrap(), BTreeSet::from([1, 3]));

        drop(sync);
        worker.await.unwrap();
    }
}
