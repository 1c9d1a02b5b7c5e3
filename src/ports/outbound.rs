//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters. All local-storage ports take an explicit
//! [`UserScope`]: rows belonging to one identity are invisible to another.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::domain::{
    DomainError, ExamAnswer, ExamAttempt, ExamTypeConfig, Question, SyncStatus,
    SyncableSubmission, UserScope,
};

/// Read-only source of approved questions, fed by the out-of-scope content
/// moderation pipeline.
#[async_trait::async_trait]
pub trait QuestionPool: Send + Sync {
    /// All approved questions for one domain.
    async fn approved_questions_by_domain(
        &self,
        domain: &str,
    ) -> Result<Vec<Question>, DomainError>;

    /// Approved question count per domain, in one batched read. Used to fail
    /// fast before drawing anything.
    async fn approved_count_by_domain(&self) -> Result<HashMap<String, u32>, DomainError>;

    /// Resolve questions by id (session resume, grading breakdown). Missing
    /// ids are simply absent from the result; callers decide whether that is
    /// an error.
    async fn questions_by_ids(&self, ids: &[String]) -> Result<Vec<Question>, DomainError>;
}

/// Locally cached exam-type configs, populated by an out-of-scope periodic
/// sync job. Absence surfaces as `ConfigMissing` in the engines.
#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync {
    async fn cached_exam_type_config(
        &self,
        id: &str,
    ) -> Result<Option<ExamTypeConfig>, DomainError>;
}

/// Local persistence for attempts and their answer rows.
#[async_trait::async_trait]
pub trait AttemptStore: Send + Sync {
    /// The single `InProgress` attempt for this scope, if any (expired or not).
    async fn in_progress_attempt(
        &self,
        scope: &UserScope,
    ) -> Result<Option<ExamAttempt>, DomainError>;

    /// Persist the attempt plus one answer row per question in a single
    /// transaction. No partial state is ever observable.
    async fn create_attempt_with_answers(
        &self,
        scope: &UserScope,
        attempt: &ExamAttempt,
        answers: &[ExamAnswer],
    ) -> Result<(), DomainError>;

    async fn attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<Option<ExamAttempt>, DomainError>;

    /// Answer rows ordered by `order_index`.
    async fn answers_for_attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<Vec<ExamAnswer>, DomainError>;

    /// Overwrite the pre-created (attempt, question) row with a selection.
    /// `NotFound` when no such row exists.
    async fn record_answer(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        question_id: &str,
        selected: &BTreeSet<String>,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) -> Result<ExamAnswer, DomainError>;

    /// Flip the flag on one answer row; returns the resulting value.
    async fn toggle_flag(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        question_id: &str,
    ) -> Result<bool, DomainError>;

    /// Timer checkpoint.
    async fn update_remaining_time(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        remaining_ms: i64,
    ) -> Result<(), DomainError>;

    /// Transition to `Completed` with the final score, bump the exams-taken
    /// counter and queue the submission, all as one atomic unit. A crash can
    /// never leave a completed attempt without its queued submission. Returns
    /// the new counter value; `NotFound` when the attempt does not exist.
    async fn finalize_attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        score: u32,
        passed: bool,
        completed_at: DateTime<Utc>,
        submission: &SyncableSubmission,
    ) -> Result<u64, DomainError>;

    /// Transition to `Abandoned` (explicit abandonment or expiry cleanup).
    async fn abandon_attempt(&self, scope: &UserScope, attempt_id: &str)
    -> Result<(), DomainError>;

    async fn exams_taken(&self, scope: &UserScope) -> Result<u64, DomainError>;

    /// Delete every attempt, answer and counter row for this scope. Called on
    /// sign-out before any other identity's data may be loaded.
    async fn clear_scope(&self, scope: &UserScope) -> Result<(), DomainError>;
}

/// Local queue of results awaiting remote reconciliation.
#[async_trait::async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert_submission(
        &self,
        scope: &UserScope,
        submission: &SyncableSubmission,
    ) -> Result<(), DomainError>;

    async fn submission(
        &self,
        scope: &UserScope,
        id: &str,
    ) -> Result<Option<SyncableSubmission>, DomainError>;

    /// All submissions for this scope, ascending by original submission time.
    async fn submissions(&self, scope: &UserScope) -> Result<Vec<SyncableSubmission>, DomainError>;

    /// Submissions in one sync state, ascending by original submission time.
    async fn submissions_with_status(
        &self,
        scope: &UserScope,
        status: SyncStatus,
    ) -> Result<Vec<SyncableSubmission>, DomainError>;

    async fn set_sync_state(
        &self,
        scope: &UserScope,
        id: &str,
        status: SyncStatus,
        retries: u32,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), DomainError>;

    async fn clear_scope(&self, scope: &UserScope) -> Result<(), DomainError>;
}

/// Record created by the remote submission endpoint.
#[derive(Debug, Clone)]
pub struct RemoteResult {
    pub remote_id: String,
    /// Anonymous calls come back already synced; authenticated calls come
    /// back pending-style and are reconciled later.
    pub sync_status: SyncStatus,
}

/// Remote system of record for exam results.
#[async_trait::async_trait]
pub trait ResultsGateway: Send + Sync {
    /// Create a result record remotely. Network timeouts surface through the
    /// same `Remote` error path as rejections.
    async fn create_result(
        &self,
        bearer_token: Option<&str>,
        submission: &SyncableSubmission,
    ) -> Result<RemoteResult, DomainError>;
}

/// Identity boundary. Credential acquisition is out of scope; the engines
/// only need to know who (if anyone) is signed in.
#[async_trait::async_trait]
pub trait Identity: Send + Sync {
    async fn current_user_id(&self) -> Option<String>;

    async fn bearer_token(&self) -> Option<String>;

    /// Forget the current identity. Engines flush identity-scoped local state
    /// around this call.
    async fn sign_out(&self) -> Result<(), DomainError>;
}
