//! Domain entities. Pure data structures for the core business.
//!
//! No storage/HTTP types here; these are mapped from adapters.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long an in-progress attempt stays resumable before it is treated as
/// abandoned on the next read.
pub const ATTEMPT_TTL_HOURS: i64 = 24;

/// Identity scope for all local storage access. Every read and write is keyed
/// by this scope; one identity can never observe another identity's rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserScope {
    user_id: Option<String>,
}

impl UserScope {
    /// Scope for a signed-in user.
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: Some(id.into()),
        }
    }

    /// Scope for the local anonymous profile.
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn from_user_id(user_id: Option<String>) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Key used to partition local storage rows.
    pub fn storage_key(&self) -> &str {
        self.user_id.as_deref().unwrap_or("local")
    }
}

/// One weighted domain inside an exam type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDomain {
    pub id: String,
    pub name: String,
    /// Fraction of the exam drawn from this domain. All weights sum to ~1.0.
    pub weight: f64,
    /// Approved question count the content pipeline last reported.
    pub question_count: u32,
}

/// Exam blueprint, cached locally by an out-of-scope sync job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamTypeConfig {
    pub id: String,
    pub name: String,
    pub domains: Vec<ExamDomain>,
    /// Minimum percentage score to pass.
    pub passing_score: u32,
    pub time_limit_minutes: u32,
    /// Total questions per generated exam.
    pub question_count: u32,
}

impl ExamTypeConfig {
    pub fn time_limit_ms(&self) -> i64 {
        i64::from(self.time_limit_minutes) * 60_000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Question body. Closed union validated at the storage/catalog boundary:
/// unknown tags are rejected when the catalog is loaded, not downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionContent {
    Text { body: String },
    Markdown { body: String },
    Code { language: String, body: String },
}

impl QuestionContent {
    pub fn body(&self) -> &str {
        match self {
            Self::Text { body } | Self::Markdown { body } | Self::Code { body, .. } => body,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
}

/// An approved question. Immutable from the engine's perspective; content
/// updates arrive as new versions through the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub domain: String,
    pub difficulty: Difficulty,
    pub content: QuestionContent,
    pub options: Vec<AnswerOption>,
    pub correct_answers: BTreeSet<String>,
    pub explanation: Option<String>,
    pub version: u32,
}

impl Question {
    /// Order-independent set equality against the correct-answer set.
    pub fn is_correct_selection(&self, selected: &BTreeSet<String>) -> bool {
        !selected.is_empty() && *selected == self.correct_answers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// One instance of a user taking a full exam.
///
/// Invariant: at most one `InProgress` attempt exists per identity scope.
/// "Expired" is derived (`now > expires_at`), never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: String,
    pub exam_type_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    pub score: Option<u32>,
    pub passed: Option<bool>,
    pub total_questions: u32,
    /// Exam timer as last checkpointed. Never recomputed from wall-clock
    /// elapsed time: the process may have been fully stopped in between.
    pub remaining_time_ms: i64,
    pub expires_at: DateTime<Utc>,
}

impl ExamAttempt {
    pub fn begin(
        id: String,
        exam_type_id: String,
        started_at: DateTime<Utc>,
        total_questions: u32,
        time_limit_ms: i64,
    ) -> Self {
        Self {
            id,
            exam_type_id,
            started_at,
            completed_at: None,
            status: AttemptStatus::InProgress,
            score: None,
            passed: None,
            total_questions,
            remaining_time_ms: time_limit_ms,
            expires_at: started_at + Duration::hours(ATTEMPT_TTL_HOURS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// One row per generated question, created in the same transaction as the
/// attempt. `order_index` fixes navigation order for the attempt's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamAnswer {
    pub id: String,
    pub attempt_id: String,
    pub question_id: String,
    pub selected: BTreeSet<String>,
    /// Frozen at answer time via set equality. Never recomputed at grading,
    /// even if question content changes later (offline grading determinism).
    pub is_correct: bool,
    pub is_flagged: bool,
    pub order_index: u32,
    pub answered_at: Option<DateTime<Utc>>,
}

impl ExamAnswer {
    /// Unanswered row as created at exam start.
    pub fn blank(id: String, attempt_id: String, question_id: String, order_index: u32) -> Self {
        Self {
            id,
            attempt_id,
            question_id,
            selected: BTreeSet::new(),
            is_correct: false,
            is_flagged: false,
            order_index,
            answered_at: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.answered_at.is_some()
    }
}

/// Qualitative per-domain performance label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Strong,
    Moderate,
    Weak,
}

impl Strength {
    /// Inclusive at 70 and 80: `>=80` strong, `70..80` moderate, else weak.
    pub fn from_percentage(pct: u32) -> Self {
        if pct >= 80 {
            Self::Strong
        } else if pct >= 70 {
            Self::Moderate
        } else {
            Self::Weak
        }
    }
}

/// Derived per-domain result. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainScore {
    pub domain_id: String,
    pub domain_name: String,
    pub correct: u32,
    pub total: u32,
    pub percentage: u32,
    pub strength: Strength,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "synced" => Some(Self::Synced),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Locally recorded exam result awaiting reconciliation with the remote
/// system of record. Created at submit time; mutated only by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncableSubmission {
    pub id: String,
    /// `None` for anonymous results; those have no user-scoped remote record
    /// to reconcile and are created already `Synced`.
    pub user_id: Option<String>,
    pub exam_type_id: String,
    pub score: u32,
    pub passed: bool,
    pub duration_ms: i64,
    pub submitted_at: DateTime<Utc>,
    pub sync_status: SyncStatus,
    pub sync_retries: u32,
    pub synced_at: Option<DateTime<Utc>>,
}
