//! Core domain layer. No external I/O dependencies.
//!
//! Entities and business rules live here. Dependencies flow inward.

pub mod entities;
pub mod errors;
pub mod validation;

pub use entities::{
    AnswerOption, AttemptStatus, Difficulty, DomainScore, ExamAnswer, ExamAttempt, ExamDomain,
    ExamTypeConfig, Question, QuestionContent, Strength, SyncStatus, SyncableSubmission, UserScope,
};
pub use errors::{DomainError, DomainShortfall, EntityKind};
pub use validation::FieldError;
