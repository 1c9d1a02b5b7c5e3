//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these. The taxonomy drives retry
//! policy: only `Remote` is ever retried, and only inside the sync engine.

use thiserror::Error;

use crate::domain::validation::FieldError;

/// What kind of record a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Attempt,
    Answer,
    Question,
    Submission,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Attempt => "attempt",
            Self::Answer => "answer",
            Self::Question => "question",
            Self::Submission => "submission",
        };
        f.write_str(s)
    }
}

/// Exact per-domain deficit reported when a quota exceeds the approved pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainShortfall {
    pub domain: String,
    pub required: u32,
    pub available: u32,
}

impl DomainShortfall {
    pub fn shortfall(&self) -> u32 {
        self.required.saturating_sub(self.available)
    }
}

#[derive(Error, Debug)]
pub enum DomainError {
    /// Bad input. Synchronous, never retried.
    #[error("validation failed: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// Missing attempt/question/submission. Surfaced, never retried.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Exam-type config absent from the local cache.
    #[error("exam type config missing: {0}")]
    ConfigMissing(String),

    /// An in-progress attempt already exists (expired or not); the caller
    /// must resume or abandon it first.
    #[error("an exam attempt is already in progress")]
    AlreadyInProgress,

    /// Re-submitting a completed attempt.
    #[error("attempt already submitted: {0}")]
    AlreadySubmitted(String),

    /// Mutating an attempt that is no longer in progress.
    #[error("attempt is not active: {0}")]
    AttemptNotActive(String),

    /// Quota exceeds the approved pool for one or more domains.
    #[error("insufficient questions: {}", format_shortfalls(.0))]
    InsufficientQuestions(Vec<DomainShortfall>),

    /// Out-of-range navigation target. Programmer error, not user-recoverable.
    #[error("question index {index} out of range (0..{len})")]
    InvalidIndex { index: usize, len: usize },

    /// Local persistence failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Transient network/remote failure. Handled entirely inside the sync
    /// engine's retry policy; only visible through submission status.
    #[error("remote error: {0}")]
    Remote(String),
}

impl DomainError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_shortfalls(shortfalls: &[DomainShortfall]) -> String {
    shortfalls
        .iter()
        .map(|s| {
            format!(
                "{} short by {} ({} required, {} available)",
                s.domain,
                s.shortfall(),
                s.required,
                s.available
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}
