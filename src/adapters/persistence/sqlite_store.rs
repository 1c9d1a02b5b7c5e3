//! SQLite-backed store via libsql. Implements AttemptStore and
//! SubmissionStore with identity-scoped rows.
//!
//! Single database file (exams.db) in the given base directory. Attempt
//! creation inserts the attempt plus all answer rows in one transaction so no
//! partially created attempt is ever observable. WAL mode enables concurrent
//! readers + one writer.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use libsql::{Database, params};
use tracing::info;

use crate::domain::{
    AttemptStatus, DomainError, EntityKind, ExamAnswer, ExamAttempt, SyncStatus,
    SyncableSubmission, UserScope,
};
use crate::ports::{AttemptStore, SubmissionStore};

const ATTEMPTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS attempts (
    scope TEXT NOT NULL,
    id TEXT NOT NULL,
    exam_type_id TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    status TEXT NOT NULL,
    score INTEGER,
    passed INTEGER,
    total_questions INTEGER NOT NULL,
    remaining_time_ms INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    PRIMARY KEY (scope, id)
)"#;
const ATTEMPTS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_attempts_scope_status ON attempts (scope, status)";

const ANSWERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS answers (
    scope TEXT NOT NULL,
    id TEXT NOT NULL,
    attempt_id TEXT NOT NULL,
    question_id TEXT NOT NULL,
    selected_json TEXT NOT NULL DEFAULT '[]',
    is_correct INTEGER NOT NULL DEFAULT 0,
    is_flagged INTEGER NOT NULL DEFAULT 0,
    order_index INTEGER NOT NULL,
    answered_at INTEGER,
    PRIMARY KEY (scope, attempt_id, question_id)
)"#;

const SUBMISSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS submissions (
    scope TEXT NOT NULL,
    id TEXT NOT NULL,
    user_id TEXT,
    exam_type_id TEXT NOT NULL,
    score INTEGER NOT NULL,
    passed INTEGER NOT NULL,
    duration_ms INTEGER NOT NULL,
    submitted_at INTEGER NOT NULL,
    sync_status TEXT NOT NULL,
    sync_retries INTEGER NOT NULL DEFAULT 0,
    synced_at INTEGER,
    PRIMARY KEY (scope, id)
)"#;
const SUBMISSIONS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_submissions_scope_status ON submissions (scope, sync_status)";

const STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stats (
    scope TEXT PRIMARY KEY,
    exams_taken INTEGER NOT NULL DEFAULT 0
)"#;

/// SQLite store. One database file (exams.db) in the given base directory;
/// all identities share the file, partitioned by the scope column.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Connect to (or create) the database and ensure the schema exists.
    /// Call this once at startup; the returned store is safe to share via Arc.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(|e| DomainError::Storage(e.to_string()))?;
        let db_path = base.join("exams.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(|e| DomainError::Storage(e.to_string()))?;
        let conn = db.connect().map_err(|e| DomainError::Storage(e.to_string()))?;

        // WAL mode + synchronous=NORMAL: concurrent readers, durable enough.
        // PRAGMA returns a row; consume it (execute fails when rows come back).
        for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"] {
            let mut rows = conn
                .query(pragma, ())
                .await
                .map_err(|e| DomainError::Storage(format!("{pragma} failed: {e}")))?;
            while rows
                .next()
                .await
                .map_err(|e| DomainError::Storage(e.to_string()))?
                .is_some()
            {}
        }

        for ddl in [
            ATTEMPTS_TABLE,
            ATTEMPTS_INDEX,
            ANSWERS_TABLE,
            SUBMISSIONS_TABLE,
            SUBMISSIONS_INDEX,
            STATS_TABLE,
        ] {
            conn.execute(ddl, ())
                .await
                .map_err(|e| DomainError::Storage(e.to_string()))?;
        }

        info!(path = %db_path.display(), "sqlite store connected (WAL)");

        Ok(Self { db })
    }

    fn conn(&self) -> Result<libsql::Connection, DomainError> {
        self.db
            .connect()
            .map_err(|e| DomainError::Storage(e.to_string()))
    }

    fn storage_err(e: impl std::fmt::Display) -> DomainError {
        DomainError::Storage(e.to_string())
    }

    fn ms_to_datetime(ms: i64) -> Result<DateTime<Utc>, DomainError> {
        Utc.timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| DomainError::Storage(format!("invalid timestamp: {ms}")))
    }

    fn selected_to_json(selected: &BTreeSet<String>) -> Result<String, DomainError> {
        serde_json::to_string(selected).map_err(Self::storage_err)
    }

    /// Insert one submission row. Takes a plain connection so it runs both
    /// standalone and inside the finalize transaction.
    async fn insert_submission_row(
        conn: &libsql::Connection,
        scope: &UserScope,
        submission: &SyncableSubmission,
    ) -> Result<(), DomainError> {
        conn.execute(
            r#"
            INSERT INTO submissions
                (scope, id, user_id, exam_type_id, score, passed, duration_ms, submitted_at,
                 sync_status, sync_retries, synced_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                scope.storage_key(),
                submission.id.as_str(),
                submission.user_id.as_deref(),
                submission.exam_type_id.as_str(),
                i64::from(submission.score),
                i64::from(submission.passed),
                submission.duration_ms,
                submission.submitted_at.timestamp_millis(),
                submission.sync_status.as_str(),
                i64::from(submission.sync_retries),
                submission.synced_at.map(|t| t.timestamp_millis()),
            ],
        )
        .await
        .map_err(Self::storage_err)?;
        Ok(())
    }

    /// Nullable integer column. SQL NULL maps to `None`; any non-integer
    /// value is a corruption error, not an absence.
    fn opt_i64(row: &libsql::Row, idx: i32) -> Result<Option<i64>, DomainError> {
        match row.get_value(idx).map_err(Self::storage_err)? {
            libsql::Value::Null => Ok(None),
            libsql::Value::Integer(v) => Ok(Some(v)),
            other => Err(DomainError::Storage(format!(
                "column {idx}: expected integer, got {other:?}"
            ))),
        }
    }

    /// Nullable text column, same NULL-vs-corruption distinction.
    fn opt_text(row: &libsql::Row, idx: i32) -> Result<Option<String>, DomainError> {
        match row.get_value(idx).map_err(Self::storage_err)? {
            libsql::Value::Null => Ok(None),
            libsql::Value::Text(v) => Ok(Some(v)),
            other => Err(DomainError::Storage(format!(
                "column {idx}: expected text, got {other:?}"
            ))),
        }
    }

    fn attempt_from_row(row: &libsql::Row) -> Result<ExamAttempt, DomainError> {
        let status_str: String = row.get(5).map_err(Self::storage_err)?;
        let status = AttemptStatus::parse(&status_str)
            .ok_or_else(|| DomainError::Storage(format!("bad attempt status: {status_str}")))?;
        let completed_at = Self::opt_i64(row, 4)?
            .map(Self::ms_to_datetime)
            .transpose()?;
        Ok(ExamAttempt {
            id: row.get(0).map_err(Self::storage_err)?,
            exam_type_id: row.get(1).map_err(Self::storage_err)?,
            started_at: Self::ms_to_datetime(row.get(3).map_err(Self::storage_err)?)?,
            completed_at,
            status,
            score: Self::opt_i64(row, 6)?.map(|v| v as u32),
            passed: Self::opt_i64(row, 7)?.map(|v| v != 0),
            total_questions: row.get::<i64>(8).map_err(Self::storage_err)? as u32,
            remaining_time_ms: row.get(9).map_err(Self::storage_err)?,
            expires_at: Self::ms_to_datetime(row.get(10).map_err(Self::storage_err)?)?,
        })
    }

    fn answer_from_row(row: &libsql::Row) -> Result<ExamAnswer, DomainError> {
        let selected_json: String = row.get(3).map_err(Self::storage_err)?;
        let selected: BTreeSet<String> =
            serde_json::from_str(&selected_json).map_err(Self::storage_err)?;
        let answered_at = Self::opt_i64(row, 7)?
            .map(Self::ms_to_datetime)
            .transpose()?;
        Ok(ExamAnswer {
            id: row.get(0).map_err(Self::storage_err)?,
            attempt_id: row.get(1).map_err(Self::storage_err)?,
            question_id: row.get(2).map_err(Self::storage_err)?,
            selected,
            is_correct: row.get::<i64>(4).map_err(Self::storage_err)? != 0,
            is_flagged: row.get::<i64>(5).map_err(Self::storage_err)? != 0,
            order_index: row.get::<i64>(6).map_err(Self::storage_err)? as u32,
            answered_at,
        })
    }

    fn submission_from_row(row: &libsql::Row) -> Result<SyncableSubmission, DomainError> {
        let status_str: String = row.get(7).map_err(Self::storage_err)?;
        let sync_status = SyncStatus::parse(&status_str)
            .ok_or_else(|| DomainError::Storage(format!("bad sync status: {status_str}")))?;
        let synced_at = Self::opt_i64(row, 9)?
            .map(Self::ms_to_datetime)
            .transpose()?;
        Ok(SyncableSubmission {
            id: row.get(0).map_err(Self::storage_err)?,
            user_id: Self::opt_text(row, 1)?,
            exam_type_id: row.get(2).map_err(Self::storage_err)?,
            score: row.get::<i64>(3).map_err(Self::storage_err)? as u32,
            passed: row.get::<i64>(4).map_err(Self::storage_err)? != 0,
            duration_ms: row.get(5).map_err(Self::storage_err)?,
            submitted_at: Self::ms_to_datetime(row.get(6).map_err(Self::storage_err)?)?,
            sync_status,
            sync_retries: row.get::<i64>(8).map_err(Self::storage_err)? as u32,
            synced_at,
        })
    }
}

const ATTEMPT_COLUMNS: &str = "id, exam_type_id, scope, started_at, completed_at, status, score, \
                               passed, total_questions, remaining_time_ms, expires_at";
const ANSWER_COLUMNS: &str =
    "id, attempt_id, question_id, selected_json, is_correct, is_flagged, order_index, answered_at";
const SUBMISSION_COLUMNS: &str = "id, user_id, exam_type_id, score, passed, duration_ms, \
                                  submitted_at, sync_status, sync_retries, synced_at";

#[async_trait::async_trait]
impl AttemptStore for SqliteStore {
    async fn in_progress_attempt(
        &self,
        scope: &UserScope,
    ) -> Result<Option<ExamAttempt>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM attempts \
                     WHERE scope = ?1 AND status = 'in_progress' LIMIT 1"
                ),
                params![scope.storage_key()],
            )
            .await
            .map_err(Self::storage_err)?;
        match rows.next().await.map_err(Self::storage_err)? {
            Some(row) => Ok(Some(Self::attempt_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn create_attempt_with_answers(
        &self,
        scope: &UserScope,
        attempt: &ExamAttempt,
        answers: &[ExamAnswer],
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        let tx = conn.transaction().await.map_err(Self::storage_err)?;
        tx.execute(
            r#"
            INSERT INTO attempts
                (scope, id, exam_type_id, started_at, completed_at, status, score, passed,
                 total_questions, remaining_time_ms, expires_at)
            VALUES (?1, ?2, ?3, ?4, NULL, ?5, NULL, NULL, ?6, ?7, ?8)
            "#,
            params![
                scope.storage_key(),
                attempt.id.as_str(),
                attempt.exam_type_id.as_str(),
                attempt.started_at.timestamp_millis(),
                attempt.status.as_str(),
                i64::from(attempt.total_questions),
                attempt.remaining_time_ms,
                attempt.expires_at.timestamp_millis(),
            ],
        )
        .await
        .map_err(Self::storage_err)?;

        for answer in answers {
            tx.execute(
                r#"
                INSERT INTO answers
                    (scope, id, attempt_id, question_id, selected_json, is_correct, is_flagged,
                     order_index, answered_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, NULL)
                "#,
                params![
                    scope.storage_key(),
                    answer.id.as_str(),
                    answer.attempt_id.as_str(),
                    answer.question_id.as_str(),
                    Self::selected_to_json(&answer.selected)?,
                    i64::from(answer.order_index),
                ],
            )
            .await
            .map_err(Self::storage_err)?;
        }

        tx.commit().await.map_err(Self::storage_err)?;
        info!(
            attempt_id = %attempt.id,
            answers = answers.len(),
            "attempt persisted atomically"
        );
        Ok(())
    }

    async fn attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<Option<ExamAttempt>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                &format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE scope = ?1 AND id = ?2"),
                params![scope.storage_key(), attempt_id],
            )
            .await
            .map_err(Self::storage_err)?;
        match rows.next().await.map_err(Self::storage_err)? {
            Some(row) => Ok(Some(Self::attempt_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn answers_for_attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<Vec<ExamAnswer>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM answers \
                     WHERE scope = ?1 AND attempt_id = ?2 ORDER BY order_index"
                ),
                params![scope.storage_key(), attempt_id],
            )
            .await
            .map_err(Self::storage_err)?;
        let mut answers = Vec::new();
        while let Some(row) = rows.next().await.map_err(Self::storage_err)? {
            answers.push(Self::answer_from_row(&row)?);
        }
        Ok(answers)
    }

    async fn record_answer(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        question_id: &str,
        selected: &BTreeSet<String>,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) -> Result<ExamAnswer, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                &format!(
                    "UPDATE answers \
                     SET selected_json = ?4, is_correct = ?5, answered_at = ?6 \
                     WHERE scope = ?1 AND attempt_id = ?2 AND question_id = ?3 \
                     RETURNING {ANSWER_COLUMNS}"
                ),
                params![
                    scope.storage_key(),
                    attempt_id,
                    question_id,
                    Self::selected_to_json(selected)?,
                    i64::from(is_correct),
                    answered_at.timestamp_millis(),
                ],
            )
            .await
            .map_err(Self::storage_err)?;
        match rows.next().await.map_err(Self::storage_err)? {
            Some(row) => Self::answer_from_row(&row),
            None => Err(DomainError::not_found(EntityKind::Answer, question_id)),
        }
    }

    async fn toggle_flag(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        question_id: &str,
    ) -> Result<bool, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "UPDATE answers SET is_flagged = 1 - is_flagged \
                 WHERE scope = ?1 AND attempt_id = ?2 AND question_id = ?3 \
                 RETURNING is_flagged",
                params![scope.storage_key(), attempt_id, question_id],
            )
            .await
            .map_err(Self::storage_err)?;
        match rows.next().await.map_err(Self::storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(Self::storage_err)? != 0),
            None => Err(DomainError::not_found(EntityKind::Answer, question_id)),
        }
    }

    async fn update_remaining_time(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        remaining_ms: i64,
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE attempts SET remaining_time_ms = ?3 WHERE scope = ?1 AND id = ?2",
                params![scope.storage_key(), attempt_id, remaining_ms],
            )
            .await
            .map_err(Self::storage_err)?;
        if changed == 0 {
            return Err(DomainError::not_found(EntityKind::Attempt, attempt_id));
        }
        Ok(())
    }

    async fn finalize_attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        score: u32,
        passed: bool,
        completed_at: DateTime<Utc>,
        submission: &SyncableSubmission,
    ) -> Result<u64, DomainError> {
        let conn = self.conn()?;
        // One transaction covers the status flip, the counter bump and the
        // submission insert. An early return drops the transaction, which
        // rolls it back.
        let tx = conn.transaction().await.map_err(Self::storage_err)?;
        let changed = tx
            .execute(
                "UPDATE attempts \
                 SET status = 'completed', score = ?3, passed = ?4, completed_at = ?5 \
                 WHERE scope = ?1 AND id = ?2",
                params![
                    scope.storage_key(),
                    attempt_id,
                    i64::from(score),
                    i64::from(passed),
                    completed_at.timestamp_millis(),
                ],
            )
            .await
            .map_err(Self::storage_err)?;
        if changed == 0 {
            return Err(DomainError::not_found(EntityKind::Attempt, attempt_id));
        }

        Self::insert_submission_row(&tx, scope, submission).await?;

        let mut rows = tx
            .query(
                r#"
                INSERT INTO stats (scope, exams_taken) VALUES (?1, 1)
                ON CONFLICT (scope) DO UPDATE SET exams_taken = stats.exams_taken + 1
                RETURNING exams_taken
                "#,
                params![scope.storage_key()],
            )
            .await
            .map_err(Self::storage_err)?;
        let taken = match rows.next().await.map_err(Self::storage_err)? {
            Some(row) => row.get::<i64>(0).map_err(Self::storage_err)? as u64,
            None => return Err(DomainError::Storage("stats upsert returned no row".into())),
        };
        drop(rows);

        tx.commit().await.map_err(Self::storage_err)?;
        info!(%attempt_id, score, "attempt finalized");
        Ok(taken)
    }

    async fn abandon_attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE attempts SET status = 'abandoned' WHERE scope = ?1 AND id = ?2",
                params![scope.storage_key(), attempt_id],
            )
            .await
            .map_err(Self::storage_err)?;
        if changed == 0 {
            return Err(DomainError::not_found(EntityKind::Attempt, attempt_id));
        }
        Ok(())
    }

    async fn exams_taken(&self, scope: &UserScope) -> Result<u64, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                "SELECT exams_taken FROM stats WHERE scope = ?1",
                params![scope.storage_key()],
            )
            .await
            .map_err(Self::storage_err)?;
        match rows.next().await.map_err(Self::storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(Self::storage_err)? as u64),
            None => Ok(0),
        }
    }

    async fn clear_scope(&self, scope: &UserScope) -> Result<(), DomainError> {
        let conn = self.conn()?;
        let tx = conn.transaction().await.map_err(Self::storage_err)?;
        for sql in [
            "DELETE FROM answers WHERE scope = ?1",
            "DELETE FROM attempts WHERE scope = ?1",
            "DELETE FROM stats WHERE scope = ?1",
        ] {
            tx.execute(sql, params![scope.storage_key()])
                .await
                .map_err(Self::storage_err)?;
        }
        tx.commit().await.map_err(Self::storage_err)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SubmissionStore for SqliteStore {
    async fn insert_submission(
        &self,
        scope: &UserScope,
        submission: &SyncableSubmission,
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        Self::insert_submission_row(&conn, scope, submission).await
    }

    async fn submission(
        &self,
        scope: &UserScope,
        id: &str,
    ) -> Result<Option<SyncableSubmission>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE scope = ?1 AND id = ?2"
                ),
                params![scope.storage_key(), id],
            )
            .await
            .map_err(Self::storage_err)?;
        match rows.next().await.map_err(Self::storage_err)? {
            Some(row) => Ok(Some(Self::submission_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn submissions(&self, scope: &UserScope) -> Result<Vec<SyncableSubmission>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions \
                     WHERE scope = ?1 ORDER BY submitted_at"
                ),
                params![scope.storage_key()],
            )
            .await
            .map_err(Self::storage_err)?;
        let mut submissions = Vec::new();
        while let Some(row) = rows.next().await.map_err(Self::storage_err)? {
            submissions.push(Self::submission_from_row(&row)?);
        }
        Ok(submissions)
    }

    async fn submissions_with_status(
        &self,
        scope: &UserScope,
        status: SyncStatus,
    ) -> Result<Vec<SyncableSubmission>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {SUBMISSION_COLUMNS} FROM submissions \
                     WHERE scope = ?1 AND sync_status = ?2 ORDER BY submitted_at"
                ),
                params![scope.storage_key(), status.as_str()],
            )
            .await
            .map_err(Self::storage_err)?;
        let mut submissions = Vec::new();
        while let Some(row) = rows.next().await.map_err(Self::storage_err)? {
            submissions.push(Self::submission_from_row(&row)?);
        }
        Ok(submissions)
    }

    async fn set_sync_state(
        &self,
        scope: &UserScope,
        id: &str,
        status: SyncStatus,
        retries: u32,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE submissions \
                 SET sync_status = ?3, sync_retries = ?4, synced_at = ?5 \
                 WHERE scope = ?1 AND id = ?2",
                params![
                    scope.storage_key(),
                    id,
                    status.as_str(),
                    i64::from(retries),
                    synced_at.map(|t| t.timestamp_millis()),
                ],
            )
            .await
            .map_err(Self::storage_err)?;
        if changed == 0 {
            return Err(DomainError::not_found(EntityKind::Submission, id));
        }
        Ok(())
    }

    async fn clear_scope(&self, scope: &UserScope) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM submissions WHERE scope = ?1",
            params![scope.storage_key()],
        )
        .await
        .map_err(Self::storage_err)?;
        Ok(())
    }
}
