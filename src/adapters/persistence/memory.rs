//! In-memory store. Same contracts as the sqlite store without touching disk;
//! used by unit tests and ephemeral runs.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    AttemptStatus, DomainError, EntityKind, ExamAnswer, ExamAttempt, SyncStatus,
    SyncableSubmission, UserScope,
};
use crate::ports::{AttemptStore, SubmissionStore};

#[derive(Default)]
struct ScopeData {
    attempts: HashMap<String, ExamAttempt>,
    /// Keyed by attempt id; kept sorted by order_index.
    answers: HashMap<String, Vec<ExamAnswer>>,
    submissions: HashMap<String, SyncableSubmission>,
    exams_taken: u64,
}

pub struct MemoryStore {
    inner: Mutex<HashMap<String, ScopeData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AttemptStore for MemoryStore {
    async fn in_progress_attempt(
        &self,
        scope: &UserScope,
    ) -> Result<Option<ExamAttempt>, DomainError> {
        let inner = self.inner.lock().await;
        Ok(inner.get(scope.storage_key()).and_then(|data| {
            data.attempts
                .values()
                .find(|a| a.status == AttemptStatus::InProgress)
                .cloned()
        }))
    }

    async fn create_attempt_with_answers(
        &self,
        scope: &UserScope,
        attempt: &ExamAttempt,
        answers: &[ExamAnswer],
    ) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let data = inner.entry(scope.storage_key().to_string()).or_default();
        let mut rows = answers.to_vec();
        rows.sort_by_key(|a| a.order_index);
        data.attempts.insert(attempt.id.clone(), attempt.clone());
        data.answers.insert(attempt.id.clone(), rows);
        Ok(())
    }

    async fn attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<Option<ExamAttempt>, DomainError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .get(scope.storage_key())
            .and_then(|data| data.attempts.get(attempt_id).cloned()))
    }

    async fn answers_for_attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<Vec<ExamAnswer>, DomainError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .get(scope.storage_key())
            .and_then(|data| data.answers.get(attempt_id).cloned())
            .unwrap_or_default())
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
        let mut inner = self.inner.lock().await;
        let row = inner
            .get_mut(scope.storage_key())
            .and_then(|data| data.answers.get_mut(attempt_id))
            .and_then(|rows| rows.iter_mut().find(|a| a.question_id == question_id))
            .ok_or_else(|| DomainError::not_found(EntityKind::Answer, question_id))?;
        row.selected = selected.clone();
        row.is_correct = is_correct;
        row.answered_at = Some(answered_at);
        Ok(row.clone())
    }

    async fn toggle_flag(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        question_id: &str,
    ) -> Result<bool, DomainError> {
        let mut inner = self.inner.lock().await;
        let row = inner
            .get_mut(scope.storage_key())
            .and_then(|data| data.answers.get_mut(attempt_id))
            .and_then(|rows| rows.iter_mut().find(|a| a.question_id == question_id))
            .ok_or_else(|| DomainError::not_found(EntityKind::Answer, question_id))?;
        row.is_flagged = !row.is_flagged;
        Ok(row.is_flagged)
    }

    async fn update_remaining_time(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        remaining_ms: i64,
    ) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let attempt = inner
            .get_mut(scope.storage_key())
            .and_then(|data| data.attempts.get_mut(attempt_id))
            .ok_or_else(|| DomainError::not_found(EntityKind::Attempt, attempt_id))?;
        attempt.remaining_time_ms = remaining_ms;
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
        // Single lock hold keeps attempt, counter and queue in step.
        let mut inner = self.inner.lock().await;
        let data = inner
            .get_mut(scope.storage_key())
            .ok_or_else(|| DomainError::not_found(EntityKind::Attempt, attempt_id))?;
        let attempt = data
            .attempts
            .get_mut(attempt_id)
            .ok_or_else(|| DomainError::not_found(EntityKind::Attempt, attempt_id))?;
        attempt.status = AttemptStatus::Completed;
        attempt.score = Some(score);
        attempt.passed = Some(passed);
        attempt.completed_at = Some(completed_at);
        data.exams_taken += 1;
        data.submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(data.exams_taken)
    }

    async fn abandon_attempt(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let attempt = inner
            .get_mut(scope.storage_key())
            .and_then(|data| data.attempts.get_mut(attempt_id))
            .ok_or_else(|| DomainError::not_found(EntityKind::Attempt, attempt_id))?;
        attempt.status = AttemptStatus::Abandoned;
        Ok(())
    }

    async fn exams_taken(&self, scope: &UserScope) -> Result<u64, DomainError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .get(scope.storage_key())
            .map(|data| data.exams_taken)
            .unwrap_or(0))
    }

    async fn clear_scope(&self, scope: &UserScope) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        if let Some(data) = inner.get_mut(scope.storage_key()) {
            data.attempts.clear();
            data.answers.clear();
            data.exams_taken = 0;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_submission(
        &self,
        scope: &UserScope,
        submission: &SyncableSubmission,
    ) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let data = inner.entry(scope.storage_key().to_string()).or_default();
        data.submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    async fn submission(
        &self,
        scope: &UserScope,
        id: &str,
    ) -> Result<Option<SyncableSubmission>, DomainError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .get(scope.storage_key())
            .and_then(|data| data.submissions.get(id).cloned()))
    }

    async fn submissions(&self, scope: &UserScope) -> Result<Vec<SyncableSubmission>, DomainError> {
        let inner = self.inner.lock().await;
        let mut all: Vec<SyncableSubmission> = inner
            .get(scope.storage_key())
            .map(|data| data.submissions.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by_key(|s| s.submitted_at);
        Ok(all)
    }

    async fn submissions_with_status(
        &self,
        scope: &UserScope,
        status: SyncStatus,
    ) -> Result<Vec<SyncableSubmission>, DomainError> {
        let mut all = self.submissions(scope).await?;
        all.retain(|s| s.sync_status == status);
        Ok(all)
    }

    async fn set_sync_state(
        &self,
        scope: &UserScope,
        id: &str,
        status: SyncStatus,
        retries: u32,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        let submission = inner
            .get_mut(scope.storage_key())
            .and_then(|data| data.submissions.get_mut(id))
            .ok_or_else(|| DomainError::not_found(EntityKind::Submission, id))?;
        submission.sync_status = status;
        submission.sync_retries = retries;
        submission.synced_at = synced_at;
        Ok(())
    }

    async fn clear_scope(&self, scope: &UserScope) -> Result<(), DomainError> {
        let mut inner = self.inner.lock().await;
        if let Some(data) = inner.get_mut(scope.storage_key()) {
            data.submissions.clear();
        }
        Ok(())
    }
}
