//! Attempt lifecycle: start -> answer/navigate/flag/checkpoint -> submit or
//! abandon. Runs entirely against local storage so a session survives full
//! process restarts.
//!
//! - At most one in-progress attempt per identity scope
//! - "Expired" is derived on read (now > expires_at) and flipped to Abandoned
//!   before "no session" is reported
//! - Attempt + answer rows are created in one transaction; no partial state
//!   is observable

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::validation::validate_selection;
use crate::domain::{
    AttemptStatus, DomainError, EntityKind, ExamAnswer, ExamAttempt, Question, SyncStatus,
    SyncableSubmission, UserScope,
};
use crate::ports::{AttemptStore, ConfigSource, QuestionPool, SessionEvent, SessionObserver};
use crate::shared::Clock;
use crate::usecases::generator::ExamGenerator;
use crate::usecases::scoring::{ScoreSummary, ScoringEngine};

/// A reconstructed exam-taking session. `questions` and `answers` share the
/// same order, fixed by `order_index` at generation time.
#[derive(Debug, Clone)]
pub struct ExamSession {
    pub attempt: ExamAttempt,
    pub questions: Vec<Question>,
    pub answers: Vec<ExamAnswer>,
}

/// One navigation position inside a session.
#[derive(Debug)]
pub struct SessionPosition<'a> {
    pub index: usize,
    pub question: &'a Question,
    pub answer: &'a ExamAnswer,
}

/// Owns the attempt lifecycle. Depends on the generator for assembly and the
/// scoring engine for grading.
pub struct ExamSessionEngine {
    attempts: Arc<dyn AttemptStore>,
    configs: Arc<dyn ConfigSource>,
    pool: Arc<dyn QuestionPool>,
    generator: ExamGenerator,
    scoring: Arc<ScoringEngine>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn SessionObserver>,
}

impl ExamSessionEngine {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        configs: Arc<dyn ConfigSource>,
        pool: Arc<dyn QuestionPool>,
        scoring: Arc<ScoringEngine>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        let generator = ExamGenerator::new(Arc::clone(&pool));
        Self {
            attempts,
            configs,
            pool,
            generator,
            scoring,
            clock,
            observer,
        }
    }

    pub fn generator(&self) -> &ExamGenerator {
        &self.generator
    }

    /// Starts a new attempt. Fails with `AlreadyInProgress` while any
    /// in-progress attempt exists, expired or not; the caller resolves that
    /// via resume (which abandons expired attempts) or an explicit abandon.
    pub async fn start_exam(
        &self,
        scope: &UserScope,
        exam_type_id: &str,
    ) -> Result<ExamSession, DomainError> {
        if self.attempts.in_progress_attempt(scope).await?.is_some() {
            return Err(DomainError::AlreadyInProgress);
        }

        let config = self
            .configs
            .cached_exam_type_config(exam_type_id)
            .await?
            .ok_or_else(|| DomainError::ConfigMissing(exam_type_id.to_string()))?;

        let generated = self.generator.generate_exam(&config).await?;
        let now = self.clock.now();
        let attempt = ExamAttempt::begin(
            Uuid::new_v4().to_string(),
            exam_type_id.to_string(),
            now,
            generated.questions.len() as u32,
            config.time_limit_ms(),
        );
        let answers: Vec<ExamAnswer> = generated
            .questions
            .iter()
            .enumerate()
            .map(|(idx, q)| {
                ExamAnswer::blank(
                    Uuid::new_v4().to_string(),
                    attempt.id.clone(),
                    q.id.clone(),
                    idx as u32,
                )
            })
            .collect();

        self.attempts
            .create_attempt_with_answers(scope, &attempt, &answers)
            .await?;

        self.observer.on_event(&SessionEvent::ExamStarted {
            attempt_id: attempt.id.clone(),
            exam_type_id: exam_type_id.to_string(),
            total_questions: attempt.total_questions,
        });

        Ok(ExamSession {
            attempt,
            questions: generated.questions,
            answers,
        })
    }

    /// True iff a stored attempt is in progress and not yet past its TTL.
    pub async fn has_in_progress_exam(&self, scope: &UserScope) -> Result<bool, DomainError> {
        let now = self.clock.now();
        Ok(self
            .attempts
            .in_progress_attempt(scope)
            .await?
            .is_some_and(|a| !a.is_expired(now)))
    }

    /// Reconstructs the open session, with `remaining_time_ms` exactly as
    /// last checkpointed. An expired attempt is abandoned as a side effect
    /// and `None` is returned, not an error condition.
    pub async fn resume_exam(
        &self,
        scope: &UserScope,
    ) -> Result<Option<ExamSession>, DomainError> {
        let Some(attempt) = self.attempts.in_progress_attempt(scope).await? else {
            return Ok(None);
        };

        if attempt.is_expired(self.clock.now()) {
            self.attempts.abandon_attempt(scope, &attempt.id).await?;
            warn!(attempt_id = %attempt.id, "in-progress attempt past TTL, abandoned");
            self.observer.on_event(&SessionEvent::ExamAbandoned {
                attempt_id: attempt.id.clone(),
                expired: true,
            });
            return Ok(None);
        }

        let answers = self.attempts.answers_for_attempt(scope, &attempt.id).await?;
        let ids: Vec<String> = answers.iter().map(|a| a.question_id.clone()).collect();
        let mut by_id: HashMap<String, Question> = self
            .pool
            .questions_by_ids(&ids)
            .await?
            .into_iter()
            .map(|q| (q.id.clone(), q))
            .collect();
        let mut questions = Vec::with_capacity(answers.len());
        for answer in &answers {
            let question = by_id.remove(&answer.question_id).ok_or_else(|| {
                DomainError::not_found(EntityKind::Question, &answer.question_id)
            })?;
            questions.push(question);
        }

        info!(
            attempt_id = %attempt.id,
            remaining_ms = attempt.remaining_time_ms,
            "session resumed"
        );

        Ok(Some(ExamSession {
            attempt,
            questions,
            answers,
        }))
    }

    /// Idempotent upsert keyed by (attempt, question). Overwrites the
    /// selection and freezes `is_correct` at this moment via set equality.
    pub async fn save_answer(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        question_id: &str,
        selected: BTreeSet<String>,
    ) -> Result<ExamAnswer, DomainError> {
        let attempt = self.require_active(scope, attempt_id).await?;

        let wanted = [question_id.to_string()];
        let question = self
            .pool
            .questions_by_ids(&wanted)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::not_found(EntityKind::Question, question_id))?;

        let field_errors = validate_selection(&question, &selected);
        if !field_errors.is_empty() {
            return Err(DomainError::Validation(field_errors));
        }

        let is_correct = question.is_correct_selection(&selected);
        let updated = self
            .attempts
            .record_answer(
                scope,
                &attempt.id,
                question_id,
                &selected,
                is_correct,
                self.clock.now(),
            )
            .await?;

        self.observer.on_event(&SessionEvent::AnswerSaved {
            attempt_id: attempt.id.clone(),
            question_id: question_id.to_string(),
            is_correct,
        });

        Ok(updated)
    }

    /// Flips the review flag; returns the resulting value.
    pub async fn toggle_question_flag(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        question_id: &str,
    ) -> Result<bool, DomainError> {
        let is_flagged = self
            .attempts
            .toggle_flag(scope, attempt_id, question_id)
            .await?;
        self.observer.on_event(&SessionEvent::FlagToggled {
            attempt_id: attempt_id.to_string(),
            question_id: question_id.to_string(),
            is_flagged,
        });
        Ok(is_flagged)
    }

    /// Pure navigation. `target_index` must already be validated by the
    /// caller; out-of-range values are a programmer error.
    pub fn navigate_to_question<'a>(
        answers: &'a [ExamAnswer],
        questions: &'a [Question],
        target_index: usize,
    ) -> Result<SessionPosition<'a>, DomainError> {
        if target_index >= questions.len() || target_index >= answers.len() {
            return Err(DomainError::InvalidIndex {
                index: target_index,
                len: questions.len(),
            });
        }
        Ok(SessionPosition {
            index: target_index,
            question: &questions[target_index],
            answer: &answers[target_index],
        })
    }

    /// Timer checkpoint (~30 s cadence from the UI). Bounds timer-accuracy
    /// loss on an abrupt process kill to one checkpoint interval.
    pub async fn persist_remaining_time(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        remaining_ms: i64,
    ) -> Result<(), DomainError> {
        let remaining_ms = remaining_ms.max(0);
        self.attempts
            .update_remaining_time(scope, attempt_id, remaining_ms)
            .await?;
        self.observer.on_event(&SessionEvent::TimeCheckpointed {
            attempt_id: attempt_id.to_string(),
            remaining_ms,
        });
        Ok(())
    }

    /// Grades, then completes the attempt, bumps the aggregate counter and
    /// queues the result for sync in one atomic store operation. Anonymous
    /// results are created already synced.
    pub async fn submit_exam(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<ScoreSummary, DomainError> {
        let attempt = self
            .attempts
            .attempt(scope, attempt_id)
            .await?
            .ok_or_else(|| DomainError::not_found(EntityKind::Attempt, attempt_id))?;
        match attempt.status {
            AttemptStatus::Completed => {
                return Err(DomainError::AlreadySubmitted(attempt_id.to_string()));
            }
            AttemptStatus::Abandoned => {
                return Err(DomainError::AttemptNotActive(attempt_id.to_string()));
            }
            AttemptStatus::InProgress => {}
        }

        let completed_at = self.clock.now();
        let summary = self
            .scoring
            .grade(scope, attempt_id, attempt.started_at, completed_at)
            .await?;

        let anonymous = scope.user_id().is_none();
        let submission = SyncableSubmission {
            id: Uuid::new_v4().to_string(),
            user_id: scope.user_id().map(str::to_string),
            exam_type_id: attempt.exam_type_id.clone(),
            score: summary.score,
            passed: summary.passed,
            duration_ms: summary.time_spent_ms,
            submitted_at: completed_at,
            // No user-scoped remote record exists for anonymous results, so
            // there is nothing to reconcile.
            sync_status: if anonymous {
                SyncStatus::Synced
            } else {
                SyncStatus::Pending
            },
            sync_retries: 0,
            synced_at: anonymous.then_some(completed_at),
        };
        let exams_taken = self
            .attempts
            .finalize_attempt(
                scope,
                attempt_id,
                summary.score,
                summary.passed,
                completed_at,
                &submission,
            )
            .await?;

        info!(
            attempt_id,
            score = summary.score,
            passed = summary.passed,
            exams_taken,
            "exam submitted"
        );
        self.observer.on_event(&SessionEvent::ExamSubmitted {
            attempt_id: attempt_id.to_string(),
            score: summary.score,
            passed: summary.passed,
        });

        Ok(summary)
    }

    /// Explicit user abandonment (also used by expiry cleanup internally).
    pub async fn abandon_exam(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<(), DomainError> {
        self.attempts.abandon_attempt(scope, attempt_id).await?;
        self.observer.on_event(&SessionEvent::ExamAbandoned {
            attempt_id: attempt_id.to_string(),
            expired: false,
        });
        Ok(())
    }

    async fn require_active(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<ExamAttempt, DomainError> {
        let attempt = self
            .attempts
            .attempt(scope, attempt_id)
            .await?
            .ok_or_else(|| DomainError::not_found(EntityKind::Attempt, attempt_id))?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(DomainError::AttemptNotActive(attempt_id.to_string()));
        }
        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::content::json_catalog::JsonCatalog;
    use crate::adapters::persistence::memory::MemoryStore;
    use crate::domain::entities::{
        AnswerOption, Difficulty, ExamDomain, ExamTypeConfig, QuestionContent,
    };
    use crate::ports::SubmissionStore;
    use crate::shared::ManualClock;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    struct RecordingObserver {
        events: Mutex<Vec<SessionEvent>>,
    }

    impl RecordingObserver {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl SessionObserver for RecordingObserver {
        fn on_event(&self, event: &SessionEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn catalog() -> JsonCatalog {
        let domains = vec![
            ExamDomain {
                id: "net".into(),
                name: "Networking".into(),
                weight: 0.5,
                question_count: 10,
            },
            ExamDomain {
                id: "sec".into(),
                name: "Security".into(),
                weight: 0.5,
                question_count: 10,
            },
        ];
        let config = ExamTypeConfig {
            id: "cert".into(),
            name: "Cert".into(),
            domains,
            passing_score: 70,
            time_limit_minutes: 10,
            question_count: 6,
        };
        let questions = ["net", "sec"]
            .iter()
            .flat_map(|d| {
                (0..10).map(move |i| Question {
                    id: format!("{d}-{i}"),
                    domain: d.to_string(),
                    difficulty: Difficulty::Easy,
                    content: QuestionContent::Text {
                        body: format!("{d} question {i}"),
                    },
                    options: vec![
                        AnswerOption {
                            id: "a".into(),
                            text: "right".into(),
                        },
                        AnswerOption {
                            id: "b".into(),
                            text: "wrong".into(),
                        },
                    ],
                    correct_answers: std::iter::once("a".to_string()).collect(),
                    explanation: None,
                    version: 1,
                })
            })
            .collect();
        JsonCatalog::from_parts(vec![config], questions)
    }

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        observer: Arc<RecordingObserver>,
        engine: ExamSessionEngine,
    }

    fn harness() -> Harness {
        harness_on(Arc::new(MemoryStore::new()))
    }

    /// Builds an engine over an existing store; a fresh engine on the same
    /// store simulates a full process restart.
    fn harness_on(store: Arc<MemoryStore>) -> Harness {
        let catalog = Arc::new(catalog());
        let clock = Arc::new(ManualClock::at(Utc::now()));
        let observer = Arc::new(RecordingObserver::new());
        let scoring = Arc::new(ScoringEngine::new(
            store.clone(),
            store.clone(),
            catalog.clone(),
            catalog.clone(),
        ));
        let engine = ExamSessionEngine::new(
            store.clone(),
            catalog.clone(),
            catalog,
            scoring,
            clock.clone(),
            observer.clone(),
        );
        Harness {
            store,
            clock,
            observer,
            engine,
        }
    }

    fn pick(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn start_creates_attempt_and_one_row_per_question() {
        let h = harness();
        let scope = UserScope::anonymous();
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();

        assert_eq!(session.questions.len(), 6);
        assert_eq!(session.answers.len(), 6);
        assert_eq!(session.attempt.remaining_time_ms, 10 * 60_000);
        for (idx, answer) in session.answers.iter().enumerate() {
            assert_eq!(answer.order_index as usize, idx);
            assert_eq!(answer.question_id, session.questions[idx].id);
            assert!(!answer.is_answered());
        }

        let stored = h.store.answers_for_attempt(&scope, &session.attempt.id).await.unwrap();
        assert_eq!(stored.len(), 6);
    }

    #[tokio::test]
    async fn second_start_conflicts_even_when_expired() {
        let h = harness();
        let scope = UserScope::anonymous();
        h.engine.start_exam(&scope, "cert").await.unwrap();

        match h.engine.start_exam(&scope, "cert").await.unwrap_err() {
            DomainError::AlreadyInProgress => {}
            other => panic!("expected AlreadyInProgress, got {other}"),
        }

        // Still a conflict after expiry: the caller must resolve explicitly.
        h.clock.advance(Duration::hours(25));
        match h.engine.start_exam(&scope, "cert").await.unwrap_err() {
            DomainError::AlreadyInProgress => {}
            other => panic!("expected AlreadyInProgress, got {other}"),
        }
    }

    #[tokio::test]
    async fn resume_after_restart_returns_exact_checkpoint() {
        let h = harness();
        let scope = UserScope::anonymous();
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();
        h.engine
            .persist_remaining_time(&scope, &session.attempt.id, 123_456)
            .await
            .unwrap();

        // Fresh engine over the same store = restarted process.
        let h2 = harness_on(h.store.clone());
        let resumed = h2.engine.resume_exam(&scope).await.unwrap().unwrap();
        assert_eq!(resumed.attempt.remaining_time_ms, 123_456);
        assert_eq!(resumed.questions.len(), 6);
        assert_eq!(
            resumed.answers[3].question_id,
            resumed.questions[3].id,
            "question order must follow order_index"
        );
    }

    #[tokio::test]
    async fn expired_attempt_is_abandoned_on_resume_not_an_error() {
        let h = harness();
        let scope = UserScope::anonymous();
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();

        h.clock.advance(Duration::hours(25));
        assert!(!h.engine.has_in_progress_exam(&scope).await.unwrap());

        let resumed = h.engine.resume_exam(&scope).await.unwrap();
        assert!(resumed.is_none());

        let stored = h.store.attempt(&scope, &session.attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Abandoned);
        assert!(h
            .observer
            .events()
            .iter()
            .any(|e| matches!(e, SessionEvent::ExamAbandoned { expired: true, .. })));
    }

    #[tokio::test]
    async fn save_answer_freezes_correctness_and_is_idempotent() {
        let h = harness();
        let scope = UserScope::anonymous();
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();
        let qid = session.questions[0].id.clone();

        let saved = h
            .engine
            .save_answer(&scope, &session.attempt.id, &qid, pick(&["a"]))
            .await
            .unwrap();
        assert!(saved.is_correct);
        assert!(saved.is_answered());

        // Overwrite with a wrong selection: correctness recomputed at answer
        // time, row count unchanged.
        let resaved = h
            .engine
            .save_answer(&scope, &session.attempt.id, &qid, pick(&["b"]))
            .await
            .unwrap();
        assert!(!resaved.is_correct);
        let rows = h.store.answers_for_attempt(&scope, &session.attempt.id).await.unwrap();
        assert_eq!(rows.len(), 6);
    }

    #[tokio::test]
    async fn save_answer_rejects_foreign_option_ids() {
        let h = harness();
        let scope = UserScope::anonymous();
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();
        let qid = session.questions[0].id.clone();

        match h
            .engine
            .save_answer(&scope, &session.attempt.id, &qid, pick(&["zz"]))
            .await
            .unwrap_err()
        {
            DomainError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("expected Validation, got {other}"),
        }
    }

    #[tokio::test]
    async fn toggle_flag_flips_and_reports() {
        let h = harness();
        let scope = UserScope::anonymous();
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();
        let qid = session.questions[2].id.clone();

        assert!(h
            .engine
            .toggle_question_flag(&scope, &session.attempt.id, &qid)
            .await
            .unwrap());
        assert!(!h
            .engine
            .toggle_question_flag(&scope, &session.attempt.id, &qid)
            .await
            .unwrap());
    }

    #[test]
    fn navigation_bounds_are_programmer_errors() {
        let questions: Vec<Question> = Vec::new();
        let answers: Vec<ExamAnswer> = Vec::new();
        match ExamSessionEngine::navigate_to_question(&answers, &questions, 0).unwrap_err() {
            DomainError::InvalidIndex { index, len } => {
                assert_eq!(index, 0);
                assert_eq!(len, 0);
            }
            other => panic!("expected InvalidIndex, got {other}"),
        }
    }

    #[tokio::test]
    async fn submit_completes_grades_and_queues_submission() {
        let h = harness();
        let scope = UserScope::user("u1");
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();

        // 5 of 6 correct -> 83%, pass at 70.
        for (i, q) in session.questions.iter().enumerate() {
            let selection = if i == 0 { pick(&["b"]) } else { pick(&["a"]) };
            h.engine
                .save_answer(&scope, &session.attempt.id, &q.id, selection)
                .await
                .unwrap();
        }
        h.clock.advance(Duration::minutes(7));

        let summary = h.engine.submit_exam(&scope, &session.attempt.id).await.unwrap();
        assert_eq!(summary.score, 83);
        assert!(summary.passed);
        assert_eq!(summary.correct_count, 5);
        assert_eq!(summary.time_spent_ms, 7 * 60_000);
        assert!(!summary.domains.is_empty());

        let stored = h.store.attempt(&scope, &session.attempt.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AttemptStatus::Completed);
        assert_eq!(stored.score, Some(83));
        assert_eq!(h.store.exams_taken(&scope).await.unwrap(), 1);

        let queue = h.store.submissions(&scope).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].sync_status, SyncStatus::Pending);
        assert_eq!(queue[0].user_id.as_deref(), Some("u1"));

        match h.engine.submit_exam(&scope, &session.attempt.id).await.unwrap_err() {
            DomainError::AlreadySubmitted(_) => {}
            other => panic!("expected AlreadySubmitted, got {other}"),
        }
    }

    #[tokio::test]
    async fn anonymous_submission_is_created_already_synced() {
        let h = harness();
        let scope = UserScope::anonymous();
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();
        h.engine.submit_exam(&scope, &session.attempt.id).await.unwrap();

        let queue = h.store.submissions(&scope).await.unwrap();
        assert_eq!(queue[0].sync_status, SyncStatus::Synced);
        assert!(queue[0].synced_at.is_some());
        assert!(queue[0].user_id.is_none());
    }

    #[tokio::test]
    async fn identity_scopes_never_observe_each_other() {
        let h = harness();
        let alice = UserScope::user("alice");
        let bob = UserScope::user("bob");

        h.engine.start_exam(&alice, "cert").await.unwrap();
        assert!(h.engine.has_in_progress_exam(&alice).await.unwrap());
        assert!(!h.engine.has_in_progress_exam(&bob).await.unwrap());
        assert!(h.engine.resume_exam(&bob).await.unwrap().is_none());

        // Bob can start his own attempt; Alice's does not conflict.
        h.engine.start_exam(&bob, "cert").await.unwrap();
    }

    #[tokio::test]
    async fn observer_receives_lifecycle_events() {
        let h = harness();
        let scope = UserScope::anonymous();
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();
        let qid = session.questions[0].id.clone();
        h.engine
            .save_answer(&scope, &session.attempt.id, &qid, pick(&["a"]))
            .await
            .unwrap();
        h.engine.submit_exam(&scope, &session.attempt.id).await.unwrap();

        let events = h.observer.events();
        assert!(matches!(events[0], SessionEvent::ExamStarted { .. }));
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::AnswerSaved { is_correct: true, .. })));
        assert!(matches!(
            events.last().unwrap(),
            SessionEvent::ExamSubmitted { .. }
        ));
    }

    #[tokio::test]
    async fn abandoned_attempt_rejects_mutations() {
        let h = harness();
        let scope = UserScope::anonymous();
        let session = h.engine.start_exam(&scope, "cert").await.unwrap();
        h.engine.abandon_exam(&scope, &session.attempt.id).await.unwrap();

        let qid = session.questions[0].id.clone();
        match h
            .engine
            .save_answer(&scope, &session.attempt.id, &qid, pick(&["a"]))
            .await
            .unwrap_err()
        {
            DomainError::AttemptNotActive(_) => {}
            other => panic!("expected AttemptNotActive, got {other}"),
        }
        match h.engine.submit_exam(&scope, &session.attempt.id).await.unwrap_err() {
            DomainError::AttemptNotActive(_) => {}
            other => panic!("expected AttemptNotActive, got {other}"),
        }
    }
}
