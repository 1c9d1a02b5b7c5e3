//! Grading and per-domain performance classification.
//!
//! Correctness was frozen per answer at answer time, so grading is a pure
//! count over persisted rows; question-content changes after the fact can
//! never alter a completed attempt's score.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::{
    DomainError, DomainScore, EntityKind, ExamAnswer, ExamTypeConfig, Question, Strength,
    SyncStatus, UserScope,
};
use crate::ports::{AttemptStore, ConfigSource, QuestionPool, SubmissionStore};

/// Score of one completed attempt.
#[derive(Debug, Clone)]
pub struct ScoreSummary {
    pub attempt_id: String,
    pub score: u32,
    pub passed: bool,
    pub correct_count: u32,
    pub total_questions: u32,
    /// `completed_at - started_at` from the two persisted timestamps, so it
    /// stays correct across pause/resume.
    pub time_spent_ms: i64,
    pub domains: Vec<DomainScore>,
}

/// Which population a history aggregate was computed over. Local-only and
/// server-truth aggregation can diverge; they are never blended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Every local submission regardless of sync status.
    LocalOnly,
    /// Synced submissions only, i.e. what the remote system of record has.
    ServerTruth,
}

#[derive(Debug, Clone)]
pub struct HistoryStats {
    pub mode: AggregationMode,
    pub attempts: u32,
    pub passed: u32,
    pub average_score: f64,
    pub best_score: u32,
}

/// Grades completed attempts and classifies domain-level strength.
pub struct ScoringEngine {
    attempts: Arc<dyn AttemptStore>,
    submissions: Arc<dyn SubmissionStore>,
    configs: Arc<dyn ConfigSource>,
    pool: Arc<dyn QuestionPool>,
}

impl ScoringEngine {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        submissions: Arc<dyn SubmissionStore>,
        configs: Arc<dyn ConfigSource>,
        pool: Arc<dyn QuestionPool>,
    ) -> Self {
        Self {
            attempts,
            submissions,
            configs,
            pool,
        }
    }

    /// Percentage rounded half-up, e.g. 50/65 -> 77, 40/65 -> 62.
    pub fn round_percentage(correct: u32, total: u32) -> u32 {
        if total == 0 {
            return 0;
        }
        let correct = u64::from(correct);
        let total = u64::from(total);
        ((correct * 100 * 2 + total) / (2 * total)) as u32
    }

    /// Score for a stored, completed attempt.
    pub async fn calculate_score(
        &self,
        scope: &UserScope,
        attempt_id: &str,
    ) -> Result<ScoreSummary, DomainError> {
        let attempt = self
            .attempts
            .attempt(scope, attempt_id)
            .await?
            .ok_or_else(|| DomainError::not_found(EntityKind::Attempt, attempt_id))?;
        let completed_at = attempt
            .completed_at
            .ok_or_else(|| DomainError::AttemptNotActive(attempt_id.to_string()))?;
        self.grade(scope, attempt_id, attempt.started_at, completed_at)
            .await
    }

    /// Grades an attempt as of `completed_at`. Used by submission (before the
    /// completion write lands) and by [`calculate_score`] afterwards.
    pub(crate) async fn grade(
        &self,
        scope: &UserScope,
        attempt_id: &str,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Result<ScoreSummary, DomainError> {
        let attempt = self
            .attempts
            .attempt(scope, attempt_id)
            .await?
            .ok_or_else(|| DomainError::not_found(EntityKind::Attempt, attempt_id))?;
        let config = self
            .configs
            .cached_exam_type_config(&attempt.exam_type_id)
            .await?
            .ok_or_else(|| DomainError::ConfigMissing(attempt.exam_type_id.clone()))?;

        let answers = self.attempts.answers_for_attempt(scope, attempt_id).await?;
        let correct_count = answers.iter().filter(|a| a.is_correct).count() as u32;
        let total_questions = attempt.total_questions;
        let score = Self::round_percentage(correct_count, total_questions);
        let passed = score >= config.passing_score;

        let ids: Vec<String> = answers.iter().map(|a| a.question_id.clone()).collect();
        let questions_by_id: HashMap<String, Question> = self
            .pool
            .questions_by_ids(&ids)
            .await?
            .into_iter()
            .map(|q| (q.id.clone(), q))
            .collect();
        let domains = Self::calculate_domain_breakdown(&answers, &questions_by_id, &config);

        info!(
            attempt_id,
            score, passed, correct_count, total_questions, "attempt graded"
        );

        Ok(ScoreSummary {
            attempt_id: attempt_id.to_string(),
            score,
            passed,
            correct_count,
            total_questions,
            time_spent_ms: (completed_at - started_at).num_milliseconds(),
            domains,
        })
    }

    /// Per-domain correctness, in config declaration order. Domains with zero
    /// answered questions are omitted rather than shown as 0%.
    pub fn calculate_domain_breakdown(
        answers: &[ExamAnswer],
        questions_by_id: &HashMap<String, Question>,
        config: &ExamTypeConfig,
    ) -> Vec<DomainScore> {
        struct Tally {
            correct: u32,
            total: u32,
            answered: u32,
        }
        let mut tallies: HashMap<&str, Tally> = HashMap::new();

        for answer in answers {
            let Some(question) = questions_by_id.get(&answer.question_id) else {
                continue;
            };
            let tally = tallies.entry(question.domain.as_str()).or_insert(Tally {
                correct: 0,
                total: 0,
                answered: 0,
            });
            tally.total += 1;
            if answer.is_answered() {
                tally.answered += 1;
            }
            if answer.is_correct {
                tally.correct += 1;
            }
        }

        config
            .domains
            .iter()
            .filter_map(|domain| {
                let tally = tallies.get(domain.id.as_str())?;
                if tally.answered == 0 {
                    return None;
                }
                let percentage = Self::round_percentage(tally.correct, tally.total);
                Some(DomainScore {
                    domain_id: domain.id.clone(),
                    domain_name: domain.name.clone(),
                    correct: tally.correct,
                    total: tally.total,
                    percentage,
                    strength: Strength::from_percentage(percentage),
                })
            })
            .collect()
    }

    /// Aggregate over every local submission, whatever its sync status.
    pub async fn local_history(&self, scope: &UserScope) -> Result<HistoryStats, DomainError> {
        let submissions = self.submissions.submissions(scope).await?;
        Ok(Self::aggregate(
            AggregationMode::LocalOnly,
            submissions.iter().map(|s| (s.score, s.passed)),
        ))
    }

    /// Aggregate over synced submissions only, the server's view.
    pub async fn synced_history(&self, scope: &UserScope) -> Result<HistoryStats, DomainError> {
        let submissions = self
            .submissions
            .submissions_with_status(scope, SyncStatus::Synced)
            .await?;
        Ok(Self::aggregate(
            AggregationMode::ServerTruth,
            submissions.iter().map(|s| (s.score, s.passed)),
        ))
    }

    fn aggregate(
        mode: AggregationMode,
        results: impl Iterator<Item = (u32, bool)>,
    ) -> HistoryStats {
        let mut attempts = 0u32;
        let mut passed = 0u32;
        let mut sum = 0u64;
        let mut best = 0u32;
        for (score, pass) in results {
            attempts += 1;
            if pass {
                passed += 1;
            }
            sum += u64::from(score);
            best = best.max(score);
        }
        let average_score = if attempts == 0 {
            0.0
        } else {
            sum as f64 / f64::from(attempts)
        };
        HistoryStats {
            mode,
            attempts,
            passed,
            average_score,
            best_score: best,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::content::json_catalog::JsonCatalog;
    use crate::adapters::persistence::memory::MemoryStore;
    use crate::domain::entities::{
        AnswerOption, AttemptStatus, Difficulty, ExamAttempt, ExamDomain, QuestionContent,
        SyncableSubmission,
    };
    use chrono::Duration;

    fn question(id: &str, domain: &str) -> Question {
        Question {
            id: id.into(),
            domain: domain.into(),
            difficulty: Difficulty::Medium,
            content: QuestionContent::Text { body: "?".into() },
            options: vec![AnswerOption {
                id: "a".into(),
                text: "A".into(),
            }],
            correct_answers: std::iter::once("a".to_string()).collect(),
            explanation: None,
            version: 1,
        }
    }

    fn config(passing_score: u32, domains: Vec<ExamDomain>) -> ExamTypeConfig {
        ExamTypeConfig {
            id: "cert".into(),
            name: "Cert".into(),
            domains,
            passing_score,
            time_limit_minutes: 90,
            question_count: 65,
        }
    }

    fn domain(id: &str, weight: f64) -> ExamDomain {
        ExamDomain {
            id: id.into(),
            name: id.to_uppercase(),
            weight,
            question_count: 0,
        }
    }

    fn answer(attempt: &str, question: &str, idx: u32, correct: bool) -> ExamAnswer {
        ExamAnswer {
            id: format!("ans-{question}"),
            attempt_id: attempt.into(),
            question_id: question.into(),
            selected: std::iter::once("a".to_string()).collect(),
            is_correct: correct,
            is_flagged: false,
            order_index: idx,
            answered_at: Some(Utc::now()),
        }
    }

    fn submission(id: &str, score: u32, passed: bool, status: SyncStatus) -> SyncableSubmission {
        SyncableSubmission {
            id: id.into(),
            user_id: Some("u1".into()),
            exam_type_id: "cert".into(),
            score,
            passed,
            duration_ms: 60_000,
            submitted_at: Utc::now(),
            sync_status: status,
            sync_retries: 0,
            synced_at: None,
        }
    }

    #[test]
    fn half_up_rounding() {
        assert_eq!(ScoringEngine::round_percentage(50, 65), 77);
        assert_eq!(ScoringEngine::round_percentage(40, 65), 62);
        assert_eq!(ScoringEngine::round_percentage(7, 10), 70);
        assert_eq!(ScoringEngine::round_percentage(1, 2), 50);
        assert_eq!(ScoringEngine::round_percentage(0, 10), 0);
        assert_eq!(ScoringEngine::round_percentage(10, 10), 100);
        assert_eq!(ScoringEngine::round_percentage(0, 0), 0);
    }

    #[test]
    fn breakdown_strength_bands_and_omission() {
        let cfg = config(
            70,
            vec![domain("net", 0.34), domain("sec", 0.33), domain("ops", 0.33)],
        );
        let mut questions_by_id = HashMap::new();
        let mut answers = Vec::new();
        let mut idx = 0u32;
        // net: 8/10, sec: 5/10, ops: never answered
        for i in 0..10 {
            let q = question(&format!("net-{i}"), "net");
            answers.push(answer("at1", &q.id, idx, i < 8));
            questions_by_id.insert(q.id.clone(), q);
            idx += 1;
        }
        for i in 0..10 {
            let q = question(&format!("sec-{i}"), "sec");
            answers.push(answer("at1", &q.id, idx, i < 5));
            questions_by_id.insert(q.id.clone(), q);
            idx += 1;
        }
        for i in 0..5 {
            let q = question(&format!("ops-{i}"), "ops");
            answers.push(ExamAnswer::blank(
                format!("ans-ops-{i}"),
                "at1".into(),
                q.id.clone(),
                idx,
            ));
            questions_by_id.insert(q.id.clone(), q);
            idx += 1;
        }

        let scores = ScoringEngine::calculate_domain_breakdown(&answers, &questions_by_id, &cfg);
        assert_eq!(scores.len(), 2, "unanswered domain must be omitted");
        assert_eq!(scores[0].domain_id, "net");
        assert_eq!(scores[0].percentage, 80);
        assert_eq!(scores[0].strength, Strength::Strong);
        assert_eq!(scores[1].domain_id, "sec");
        assert_eq!(scores[1].percentage, 50);
        assert_eq!(scores[1].strength, Strength::Weak);
    }

    #[test]
    fn exactly_seventy_percent_is_moderate() {
        let cfg = config(70, vec![domain("net", 1.0)]);
        let mut questions_by_id = HashMap::new();
        let mut answers = Vec::new();
        for i in 0..10 {
            let q = question(&format!("net-{i}"), "net");
            answers.push(answer("at1", &q.id, i, i < 7));
            questions_by_id.insert(q.id.clone(), q);
        }
        let scores = ScoringEngine::calculate_domain_breakdown(&answers, &questions_by_id, &cfg);
        assert_eq!(scores[0].percentage, 70);
        assert_eq!(scores[0].strength, Strength::Moderate);
    }

    fn engine_with(
        store: Arc<MemoryStore>,
        catalog: Arc<JsonCatalog>,
    ) -> ScoringEngine {
        ScoringEngine::new(store.clone(), store, catalog.clone(), catalog)
    }

    #[tokio::test]
    async fn calculate_score_reads_persisted_timestamps() {
        let store = Arc::new(MemoryStore::new());
        let cfg = config(70, vec![domain("net", 1.0)]);
        let questions: Vec<Question> = (0..4).map(|i| question(&format!("net-{i}"), "net")).collect();
        let catalog = Arc::new(JsonCatalog::from_parts(vec![cfg], questions.clone()));
        let scope = UserScope::anonymous();

        let started = Utc::now() - Duration::minutes(40);
        let mut attempt = ExamAttempt::begin("at1".into(), "cert".into(), started, 4, 90 * 60_000);
        attempt.status = AttemptStatus::Completed;
        attempt.completed_at = Some(started + Duration::minutes(30));
        let answers: Vec<ExamAnswer> = questions
            .iter()
            .enumerate()
            .map(|(i, q)| answer("at1", &q.id, i as u32, i < 3))
            .collect();
        store
            .create_attempt_with_answers(&scope, &attempt, &answers)
            .await
            .unwrap();

        let engine = engine_with(store, catalog);
        let summary = engine.calculate_score(&scope, "at1").await.unwrap();
        assert_eq!(summary.score, 75);
        assert!(summary.passed);
        assert_eq!(summary.correct_count, 3);
        assert_eq!(summary.time_spent_ms, 30 * 60_000);
    }

    #[tokio::test]
    async fn missing_attempt_and_missing_config_are_distinct_errors() {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(JsonCatalog::from_parts(vec![], vec![]));
        let scope = UserScope::anonymous();
        let engine = engine_with(store.clone(), catalog);

        match engine.calculate_score(&scope, "ghost").await.unwrap_err() {
            DomainError::NotFound { kind, .. } => assert_eq!(kind, EntityKind::Attempt),
            other => panic!("expected NotFound, got {other}"),
        }

        let started = Utc::now() - Duration::minutes(5);
        let mut attempt =
            ExamAttempt::begin("at1".into(), "unknown-cert".into(), started, 1, 60_000);
        attempt.status = AttemptStatus::Completed;
        attempt.completed_at = Some(Utc::now());
        store
            .create_attempt_with_answers(&scope, &attempt, &[])
            .await
            .unwrap();
        match engine.calculate_score(&scope, "at1").await.unwrap_err() {
            DomainError::ConfigMissing(id) => assert_eq!(id, "unknown-cert"),
            other => panic!("expected ConfigMissing, got {other}"),
        }
    }

    #[tokio::test]
    async fn history_modes_never_blend() {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(JsonCatalog::from_parts(vec![], vec![]));
        let scope = UserScope::user("u1");

        for (id, score, passed, status) in [
            ("s1", 80, true, SyncStatus::Synced),
            ("s2", 60, false, SyncStatus::Pending),
            ("s3", 90, true, SyncStatus::Failed),
        ] {
            store
                .insert_submission(&scope, &submission(id, score, passed, status))
                .await
                .unwrap();
        }

        let engine = engine_with(store, catalog);
        let local = engine.local_history(&scope).await.unwrap();
        assert_eq!(local.mode, AggregationMode::LocalOnly);
        assert_eq!(local.attempts, 3);
        assert_eq!(local.passed, 2);
        assert_eq!(local.best_score, 90);

        let synced = engine.synced_history(&scope).await.unwrap();
        assert_eq!(synced.mode, AggregationMode::ServerTruth);
        assert_eq!(synced.attempts, 1);
        assert_eq!(synced.best_score, 80);
        assert!((synced.average_score - 80.0).abs() < f64::EPSILON);
    }
}
