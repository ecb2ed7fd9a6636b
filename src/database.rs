use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::events::{EventBus, StoreEvent};
use crate::filter::QuestionFilter;
use crate::log_db_operation;
use crate::models::*;
use crate::query::QuestionPredicate;

const TIME_FORMAT: &str = "%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
// Keeps IN lists well below SQLite's bound-parameter limit
const ID_CHUNK: usize = 500;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
    events: EventBus,
}

/// A transaction holding the store-wide write gate. Every mutation runs
/// inside one of these, so two logical updates never interleave.
pub struct WriteTransaction {
    tx: Transaction<'static, Sqlite>,
    _gate: OwnedMutexGuard<()>,
}

impl WriteTransaction {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    /// Dropping without committing rolls back and releases the gate.
    pub async fn commit(self) -> Result<()> {
        let WriteTransaction { tx, _gate } = self;
        tx.commit().await?;
        Ok(())
    }
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // An in-memory database lives exactly as long as its connection
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let db = Database {
            pool,
            write_gate: Arc::new(Mutex::new(())),
            events: EventBus::default(),
        };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                title_folded TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                difficulty INTEGER NOT NULL,
                top_liked INTEGER NOT NULL DEFAULT 0,
                top_interviewed INTEGER NOT NULL DEFAULT 0,
                solved INTEGER NOT NULL DEFAULT 0,
                saved INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS question_tags (
                question_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (question_id, name),
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS question_companies (
                question_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (question_id, name),
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS list_members (
                list_kind TEXT NOT NULL,
                question_id INTEGER NOT NULL,
                PRIMARY KEY (list_kind, question_id),
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                question_id INTEGER PRIMARY KEY,
                content TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS solutions (
                question_id INTEGER NOT NULL,
                language TEXT NOT NULL,
                content TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (question_id, language),
                FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                time TEXT NOT NULL,
                date TEXT,
                repeat_days TEXT NOT NULL DEFAULT '[]',
                enabled INTEGER NOT NULL DEFAULT 1,
                filter TEXT,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        self.fold_titles().await?;

        log_db_operation!(info, "migrate", "schema is up to date");
        Ok(())
    }

    /// Title search compares against `title_folded`, the Unicode lowercase
    /// of `title`. SQLite's `lower()` only folds ASCII.
    async fn fold_titles(&self) -> Result<()> {
        let has_column: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('questions') WHERE name = 'title_folded'",
        )
        .fetch_one(&self.pool)
        .await?;
        if has_column == 0 {
            sqlx::query("ALTER TABLE questions ADD COLUMN title_folded TEXT NOT NULL DEFAULT ''")
                .execute(&self.pool)
                .await?;
        }

        let unfolded: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, title FROM questions WHERE title_folded = '' AND title != ''")
                .fetch_all(&self.pool)
                .await?;
        if unfolded.is_empty() {
            return Ok(());
        }

        let mut txn = self.begin_write().await?;
        for (id, title) in &unfolded {
            sqlx::query("UPDATE questions SET title_folded = ?1 WHERE id = ?2")
                .bind(title.to_lowercase())
                .bind(id)
                .execute(txn.conn())
                .await?;
        }
        txn.commit().await?;
        log_db_operation!(info, "fold_titles", format!("backfilled {} folded titles", unfolded.len()));
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Wait for the write gate and open a transaction.
    ///
    /// Do not issue pool queries from the same task while holding the
    /// returned transaction; go through [`WriteTransaction::conn`].
    pub async fn begin_write(&self) -> Result<WriteTransaction> {
        let gate = self.write_gate.clone().lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(WriteTransaction { tx, _gate: gate })
    }

    // Question operations
    /// Insert dataset entries that are not yet present. Existing rows,
    /// including their solved/saved flags, are left alone.
    pub async fn seed_questions(&self, seeds: &[SeedQuestion]) -> Result<usize> {
        let started = Instant::now();
        let mut txn = self.begin_write().await?;
        let mut inserted = 0;

        for seed in seeds {
            let Some(difficulty) = Difficulty::from_level(seed.difficulty) else {
                tracing::warn!(
                    question_id = seed.id,
                    difficulty = seed.difficulty,
                    "Skipping seed question with unknown difficulty"
                );
                continue;
            };

            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO questions (id, title, title_folded, body, difficulty, top_liked, top_interviewed)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(seed.id)
            .bind(&seed.title)
            .bind(seed.title.to_lowercase())
            .bind(&seed.body)
            .bind(difficulty.level())
            .bind(seed.top_liked)
            .bind(seed.top_interviewed)
            .execute(txn.conn())
            .await?;

            if result.rows_affected() == 0 {
                continue;
            }
            inserted += 1;

            for tag in &seed.tags {
                sqlx::query("INSERT OR IGNORE INTO question_tags (question_id, name) VALUES (?1, ?2)")
                    .bind(seed.id)
                    .bind(tag)
                    .execute(txn.conn())
                    .await?;
            }
            for company in &seed.companies {
                sqlx::query(
                    "INSERT OR IGNORE INTO question_companies (question_id, name) VALUES (?1, ?2)",
                )
                .bind(seed.id)
                .bind(company)
                .execute(txn.conn())
                .await?;
            }
        }

        txn.commit().await?;
        log_db_operation!(
            debug,
            "seed_questions",
            count = inserted,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(inserted)
    }

    pub async fn get_question(&self, id: i64) -> Result<Option<Question>> {
        let mut conn = self.pool.acquire().await?;
        fetch_question(&mut conn, id).await
    }

    pub async fn get_all_questions(&self) -> Result<Vec<Question>> {
        self.query_questions(&QuestionPredicate::match_all()).await
    }

    pub async fn query_questions(&self, predicate: &QuestionPredicate) -> Result<Vec<Question>> {
        let started = Instant::now();
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT q.* FROM questions q");
        predicate.push_sql(&mut builder);
        builder.push(" ORDER BY q.id");

        let mut conn = self.pool.acquire().await?;
        let rows = builder.build().fetch_all(&mut *conn).await?;
        let mut questions = rows
            .iter()
            .map(row_to_question)
            .collect::<Result<Vec<_>>>()?;
        load_facets(&mut conn, &mut questions).await?;

        log_db_operation!(
            debug,
            "query_questions",
            count = questions.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(questions)
    }

    pub async fn random_question(&self, predicate: &QuestionPredicate) -> Result<Option<Question>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT q.* FROM questions q");
        predicate.push_sql(&mut builder);
        builder.push(" ORDER BY RANDOM() LIMIT 1");

        let mut conn = self.pool.acquire().await?;
        let row = builder.build().fetch_optional(&mut *conn).await?;
        match row {
            Some(row) => {
                let mut questions = vec![row_to_question(&row)?];
                load_facets(&mut conn, &mut questions).await?;
                Ok(questions.pop())
            }
            None => Ok(None),
        }
    }

    pub async fn list_member_ids(&self, kind: ListKind) -> Result<BTreeSet<i64>> {
        let mut conn = self.pool.acquire().await?;
        fetch_members(&mut conn, kind).await
    }

    pub async fn flagged_ids(&self, kind: ListKind) -> Result<BTreeSet<i64>> {
        let mut conn = self.pool.acquire().await?;
        fetch_flagged(&mut conn, kind).await
    }

    pub async fn tag_counts(&self) -> Result<Vec<FacetCount>> {
        self.facet_counts("question_tags").await
    }

    pub async fn company_counts(&self) -> Result<Vec<FacetCount>> {
        self.facet_counts("question_companies").await
    }

    async fn facet_counts(&self, table: &'static str) -> Result<Vec<FacetCount>> {
        let rows = sqlx::query(&format!(
            "SELECT name, COUNT(*) AS count FROM {} GROUP BY name ORDER BY count DESC, name",
            table
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut facets = Vec::with_capacity(rows.len());
        for row in rows {
            facets.push(FacetCount {
                name: row.try_get("name")?,
                count: row.try_get("count")?,
            });
        }
        Ok(facets)
    }

    pub async fn progress_stats(&self) -> Result<ProgressStats> {
        let rows = sqlx::query(
            r#"
            SELECT difficulty, COUNT(*) AS total,
                   COALESCE(SUM(solved), 0) AS solved,
                   COALESCE(SUM(saved), 0) AS saved
            FROM questions
            GROUP BY difficulty
            ORDER BY difficulty
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_level: HashMap<i64, (i64, i64, i64)> = HashMap::new();
        for row in rows {
            by_level.insert(
                row.try_get("difficulty")?,
                (row.try_get("total")?, row.try_get("solved")?, row.try_get("saved")?),
            );
        }

        let levels: Vec<DifficultyProgress> = Difficulty::ALL
            .into_iter()
            .map(|difficulty| {
                let (total, solved, saved) =
                    by_level.get(&difficulty.level()).copied().unwrap_or_default();
                DifficultyProgress {
                    difficulty,
                    total,
                    solved,
                    saved,
                }
            })
            .collect();

        Ok(ProgressStats {
            total: levels.iter().map(|l| l.total).sum(),
            solved: levels.iter().map(|l| l.solved).sum(),
            saved: levels.iter().map(|l| l.saved).sum(),
            levels,
        })
    }

    // Note operations
    pub async fn get_note(&self, question_id: i64) -> Result<Option<Note>> {
        let row = sqlx::query("SELECT question_id, content, updated_at FROM notes WHERE question_id = ?1")
            .bind(question_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Note {
                question_id: row.try_get("question_id")?,
                content: row.try_get("content")?,
                updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
            })),
            None => Ok(None),
        }
    }

    /// Store a note; blank content removes it. Unknown questions are ignored.
    pub async fn save_note(&self, question_id: i64, content: &str) -> Result<Option<Note>> {
        let mut txn = self.begin_write().await?;
        if !question_exists(txn.conn(), question_id).await? {
            return Ok(None);
        }

        let note = if content.trim().is_empty() {
            sqlx::query("DELETE FROM notes WHERE question_id = ?1")
                .bind(question_id)
                .execute(txn.conn())
                .await?;
            None
        } else {
            let note = Note {
                question_id,
                content: content.to_string(),
                updated_at: Utc::now(),
            };
            sqlx::query(
                r#"
                INSERT INTO notes (question_id, content, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT(question_id) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at
                "#,
            )
            .bind(note.question_id)
            .bind(&note.content)
            .bind(note.updated_at.to_rfc3339())
            .execute(txn.conn())
            .await?;
            Some(note)
        };

        txn.commit().await?;
        self.events.publish(StoreEvent::NoteChanged { question_id });
        Ok(note)
    }

    // Solution operations
    pub async fn get_solution(&self, question_id: i64) -> Result<Solution> {
        let rows = sqlx::query("SELECT language, content FROM solutions WHERE question_id = ?1")
            .bind(question_id)
            .fetch_all(&self.pool)
            .await?;

        let mut snippets = BTreeMap::new();
        for row in rows {
            snippets.insert(
                Language::new(row.try_get::<String, _>("language")?),
                row.try_get("content")?,
            );
        }
        Ok(Solution {
            question_id,
            snippets,
        })
    }

    /// Write one language slot. Other slots of the same question are untouched.
    pub async fn upsert_solution(
        &self,
        question_id: i64,
        language: &Language,
        content: &str,
    ) -> Result<bool> {
        self.upsert_solution_if(question_id, language, content, || true).await
    }

    /// Like [`Database::upsert_solution`], but `keep` is asked once the write
    /// gate is held and the row is left alone when it says no.
    pub async fn upsert_solution_if<F>(
        &self,
        question_id: i64,
        language: &Language,
        content: &str,
        keep: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> bool,
    {
        let mut txn = self.begin_write().await?;
        if !keep() || !question_exists(txn.conn(), question_id).await? {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO solutions (question_id, language, content, updated_at) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(question_id, language) DO UPDATE SET content = excluded.content, updated_at = excluded.updated_at
            "#,
        )
        .bind(question_id)
        .bind(language.as_str())
        .bind(content)
        .bind(Utc::now().to_rfc3339())
        .execute(txn.conn())
        .await?;

        txn.commit().await?;
        self.events.publish(StoreEvent::SolutionChanged {
            question_id,
            language: language.clone(),
        });
        Ok(true)
    }

    // Reminder operations
    pub async fn save_reminder(&self, reminder: &Reminder) -> Result<()> {
        let repeat_days = serde_json::to_string(&reminder.repeat_days)?;
        let filter = reminder
            .filter
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut txn = self.begin_write().await?;
        sqlx::query(
            r#"
            INSERT INTO reminders (id, time, date, repeat_days, enabled, filter, is_deleted, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                time = excluded.time,
                date = excluded.date,
                repeat_days = excluded.repeat_days,
                enabled = excluded.enabled,
                filter = excluded.filter,
                is_deleted = excluded.is_deleted,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(reminder.id.to_string())
        .bind(reminder.time.format(TIME_FORMAT).to_string())
        .bind(reminder.date.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(repeat_days)
        .bind(reminder.enabled)
        .bind(filter)
        .bind(reminder.is_deleted)
        .bind(reminder.created_at.to_rfc3339())
        .bind(reminder.updated_at.to_rfc3339())
        .execute(txn.conn())
        .await?;
        txn.commit().await?;

        self.events.publish(StoreEvent::ReminderChanged { id: reminder.id });
        Ok(())
    }

    pub async fn get_reminder(&self, id: Uuid) -> Result<Option<Reminder>> {
        let row = sqlx::query("SELECT * FROM reminders WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_reminder).transpose()
    }

    pub async fn list_reminders(&self, include_deleted: bool) -> Result<Vec<Reminder>> {
        let sql = if include_deleted {
            "SELECT * FROM reminders ORDER BY time, created_at"
        } else {
            "SELECT * FROM reminders WHERE is_deleted = 0 ORDER BY time, created_at"
        };
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_reminder).collect()
    }
}

// Connection-level helpers, usable both from the pool and inside a WriteTransaction

pub(crate) async fn fetch_question(conn: &mut SqliteConnection, id: i64) -> Result<Option<Question>> {
    let row = sqlx::query("SELECT * FROM questions WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let mut questions = vec![row_to_question(&row)?];
            load_facets(conn, &mut questions).await?;
            Ok(questions.pop())
        }
        None => Ok(None),
    }
}

pub(crate) async fn question_exists(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM questions WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

/// Subset of `ids` that have a backing question
pub(crate) async fn existing_question_ids(
    conn: &mut SqliteConnection,
    ids: &BTreeSet<i64>,
) -> Result<BTreeSet<i64>> {
    let ids: Vec<i64> = ids.iter().copied().collect();
    let mut existing = BTreeSet::new();
    for chunk in ids.chunks(ID_CHUNK) {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM questions WHERE id IN (");
        let mut values = builder.separated(", ");
        for id in chunk {
            values.push_bind(*id);
        }
        values.push_unseparated(")");

        for row in builder.build().fetch_all(&mut *conn).await? {
            existing.insert(row.try_get::<i64, _>("id")?);
        }
    }
    Ok(existing)
}

pub(crate) async fn fetch_flag(
    conn: &mut SqliteConnection,
    kind: ListKind,
    id: i64,
) -> Result<Option<bool>> {
    let row = sqlx::query(&format!(
        "SELECT {} AS flag FROM questions WHERE id = ?1",
        kind.flag_column()
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| row.try_get::<bool, _>("flag").map_err(anyhow::Error::from))
        .transpose()
}

pub(crate) async fn set_flag(
    conn: &mut SqliteConnection,
    kind: ListKind,
    id: i64,
    value: bool,
) -> Result<()> {
    sqlx::query(&format!(
        "UPDATE questions SET {} = ?1 WHERE id = ?2",
        kind.flag_column()
    ))
    .bind(value)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn fetch_members(conn: &mut SqliteConnection, kind: ListKind) -> Result<BTreeSet<i64>> {
    let rows = sqlx::query("SELECT question_id FROM list_members WHERE list_kind = ?1")
        .bind(kind.as_str())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| row.try_get::<i64, _>("question_id").map_err(anyhow::Error::from))
        .collect()
}

pub(crate) async fn fetch_flagged(conn: &mut SqliteConnection, kind: ListKind) -> Result<BTreeSet<i64>> {
    let rows = sqlx::query(&format!(
        "SELECT id FROM questions WHERE {} = 1",
        kind.flag_column()
    ))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| row.try_get::<i64, _>("id").map_err(anyhow::Error::from))
        .collect()
}

pub(crate) async fn insert_member(conn: &mut SqliteConnection, kind: ListKind, id: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO list_members (list_kind, question_id) VALUES (?1, ?2)")
        .bind(kind.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn delete_member(conn: &mut SqliteConnection, kind: ListKind, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM list_members WHERE list_kind = ?1 AND question_id = ?2")
        .bind(kind.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn load_facets(conn: &mut SqliteConnection, questions: &mut [Question]) -> Result<()> {
    if questions.is_empty() {
        return Ok(());
    }

    let positions: HashMap<i64, usize> = questions
        .iter()
        .enumerate()
        .map(|(index, question)| (question.id, index))
        .collect();
    let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();

    for table in ["question_tags", "question_companies"] {
        for chunk in ids.chunks(ID_CHUNK) {
            let mut builder = QueryBuilder::<Sqlite>::new(format!(
                "SELECT question_id, name FROM {} WHERE question_id IN (",
                table
            ));
            let mut values = builder.separated(", ");
            for id in chunk {
                values.push_bind(*id);
            }
            values.push_unseparated(")");

            for row in builder.build().fetch_all(&mut *conn).await? {
                let question_id: i64 = row.try_get("question_id")?;
                let name: String = row.try_get("name")?;
                if let Some(&index) = positions.get(&question_id) {
                    let question = &mut questions[index];
                    if table == "question_tags" {
                        question.tags.insert(name);
                    } else {
                        question.companies.insert(name);
                    }
                }
            }
        }
    }
    Ok(())
}

fn row_to_question(row: &SqliteRow) -> Result<Question> {
    let level: i64 = row.try_get("difficulty")?;
    let id: i64 = row.try_get("id")?;
    let difficulty = Difficulty::from_level(level)
        .ok_or_else(|| anyhow!("Question {} has invalid difficulty {}", id, level))?;

    Ok(Question {
        id,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        difficulty,
        tags: BTreeSet::new(),
        companies: BTreeSet::new(),
        solved: row.try_get("solved")?,
        saved: row.try_get("saved")?,
        top_liked: row.try_get("top_liked")?,
        top_interviewed: row.try_get("top_interviewed")?,
    })
}

fn row_to_reminder(row: &SqliteRow) -> Result<Reminder> {
    let id: String = row.try_get("id")?;
    let time: String = row.try_get("time")?;
    let date: Option<String> = row.try_get("date")?;
    let repeat_days: String = row.try_get("repeat_days")?;
    let filter: Option<String> = row.try_get("filter")?;

    Ok(Reminder {
        id: Uuid::parse_str(&id)?,
        time: NaiveTime::parse_from_str(&time, TIME_FORMAT)?,
        date: date
            .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
            .transpose()?,
        repeat_days: serde_json::from_str(&repeat_days)?,
        enabled: row.try_get("enabled")?,
        filter: filter
            .map(|f| serde_json::from_str::<QuestionFilter>(&f))
            .transpose()?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QuestionQuery;

    fn seed(id: i64, title: &str, difficulty: i64, tags: &[&str]) -> SeedQuestion {
        SeedQuestion {
            id,
            title: title.to_string(),
            body: format!("Body of {}", title),
            difficulty,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            companies: vec!["Google".to_string()],
            top_liked: id % 2 == 0,
            top_interviewed: false,
        }
    }

    async fn create_test_db() -> Database {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.seed_questions(&[
            seed(1, "Two Sum", 1, &["Array", "Hash Table"]),
            seed(2, "Add Two Numbers", 2, &["Linked List"]),
            seed(3, "Median of Two Sorted Arrays", 3, &["Array", "Binary Search"]),
        ])
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = create_test_db().await;
        let inserted = db
            .seed_questions(&[seed(1, "Two Sum", 1, &[]), seed(4, "Valid Parentheses", 1, &["Stack"])])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(db.get_all_questions().await.unwrap().len(), 4);

        // The existing row keeps its original tags
        let question = db.get_question(1).await.unwrap().unwrap();
        assert!(question.tags.contains("Hash Table"));
    }

    #[tokio::test]
    async fn test_seed_skips_unknown_difficulty() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let inserted = db.seed_questions(&[seed(9, "Odd", 7, &[])]).await.unwrap();
        assert_eq!(inserted, 0);
        assert!(db.get_question(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_question_roundtrip_with_facets() {
        let db = create_test_db().await;
        let question = db.get_question(3).await.unwrap().unwrap();
        assert_eq!(question.title, "Median of Two Sorted Arrays");
        assert_eq!(question.difficulty, Difficulty::Hard);
        assert!(question.tags.contains("Binary Search"));
        assert!(question.companies.contains("Google"));
        assert!(!question.solved);
        assert!(db.get_question(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sql_and_memory_predicates_agree() {
        let db = create_test_db().await;
        db.seed_questions(&[seed(90, "Ärger Sum", 1, &[]), seed(91, "ÉTÉ Intervals", 2, &[])])
            .await
            .unwrap();
        let all = db.get_all_questions().await.unwrap();

        let queries = vec![
            QuestionQuery::all(),
            QuestionQuery::all().with_text("two"),
            QuestionQuery::all().with_text("ärger"),
            QuestionQuery::all().with_text("ÄRGER"),
            QuestionQuery::all().with_text("été"),
            QuestionQuery::new(QuestionFilter::empty().with_tags(["Array"])),
            QuestionQuery::new(QuestionFilter::empty().with_levels([Difficulty::Medium])),
            QuestionQuery::new(QuestionFilter {
                top_liked: true,
                ..QuestionFilter::empty()
            }),
            QuestionQuery::new(QuestionFilter::empty().with_companies(["Meta"])),
        ];

        for query in queries {
            let predicate = query.compile();
            let from_sql: Vec<i64> = db
                .query_questions(&predicate)
                .await
                .unwrap()
                .iter()
                .map(|q| q.id)
                .collect();
            let in_memory: Vec<i64> = all
                .iter()
                .filter(|q| predicate.matches(q))
                .map(|q| q.id)
                .collect();
            assert_eq!(from_sql, in_memory, "query {:?}", query);
        }

        let accented = QuestionQuery::all().with_text("ÄRGER").compile();
        let matched = db.query_questions(&accented).await.unwrap();
        assert_eq!(matched.iter().map(|q| q.id).collect::<Vec<_>>(), vec![90]);
    }

    #[tokio::test]
    async fn test_migrate_backfills_folded_titles() {
        let db = create_test_db().await;
        sqlx::query("INSERT INTO questions (id, title, difficulty) VALUES (95, 'Ödland Paths', 2)")
            .execute(db.pool())
            .await
            .unwrap();

        let before = QuestionQuery::all().with_text("ödland").compile();
        assert!(db.query_questions(&before).await.unwrap().is_empty());

        db.migrate().await.unwrap();
        let found = db.query_questions(&before).await.unwrap();
        assert_eq!(found.iter().map(|q| q.id).collect::<Vec<_>>(), vec![95]);
    }

    #[tokio::test]
    async fn test_facet_counts_and_stats() {
        let db = create_test_db().await;

        let tags = db.tag_counts().await.unwrap();
        assert_eq!(tags[0], FacetCount { name: "Array".to_string(), count: 2 });

        let companies = db.company_counts().await.unwrap();
        assert_eq!(companies, vec![FacetCount { name: "Google".to_string(), count: 3 }]);

        let stats = db.progress_stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.solved, 0);
        assert_eq!(stats.levels.len(), 3);
        assert_eq!(stats.levels[1].difficulty, Difficulty::Medium);
        assert_eq!(stats.levels[1].total, 1);
    }

    #[tokio::test]
    async fn test_notes() {
        let db = create_test_db().await;
        let note = db.save_note(1, "Use a hash map").await.unwrap().unwrap();
        assert_eq!(note.content, "Use a hash map");
        assert_eq!(db.get_note(1).await.unwrap().unwrap().content, "Use a hash map");

        assert!(db.save_note(1, "  ").await.unwrap().is_none());
        assert!(db.get_note(1).await.unwrap().is_none());

        assert!(db.save_note(999, "orphan").await.unwrap().is_none());
        assert!(db.get_note(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_solution_slots_are_independent() {
        let db = create_test_db().await;
        let swift = Language::new("Swift");
        let python = Language::new("Python");

        assert!(db.upsert_solution(1, &swift, "func twoSum()").await.unwrap());
        assert!(db.upsert_solution(1, &python, "def two_sum():").await.unwrap());
        assert!(db.upsert_solution(1, &swift, "func twoSum() {}").await.unwrap());
        assert!(!db.upsert_solution(999, &swift, "orphan").await.unwrap());

        let solution = db.get_solution(1).await.unwrap();
        assert_eq!(solution.snippets.len(), 2);
        assert_eq!(solution.snippets[&swift], "func twoSum() {}");
        assert_eq!(solution.snippets[&python], "def two_sum():");
    }

    #[tokio::test]
    async fn test_reminder_roundtrip() {
        let db = create_test_db().await;
        let now = Utc::now();
        let reminder = Reminder {
            id: Uuid::new_v4(),
            time: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
            date: None,
            repeat_days: BTreeSet::from([2, 4, 6]),
            enabled: true,
            filter: Some(QuestionFilter::empty().with_tags(["Array"])),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        db.save_reminder(&reminder).await.unwrap();
        let loaded = db.get_reminder(reminder.id).await.unwrap().unwrap();
        assert_eq!(loaded.time, reminder.time);
        assert_eq!(loaded.repeat_days, reminder.repeat_days);
        assert_eq!(loaded.filter, reminder.filter);

        let mut deleted = loaded.clone();
        deleted.is_deleted = true;
        db.save_reminder(&deleted).await.unwrap();
        assert!(db.list_reminders(false).await.unwrap().is_empty());
        assert_eq!(db.list_reminders(true).await.unwrap().len(), 1);
    }
}
