//! Session event seam.
//!
//! Engines publish state changes through an explicit observer instead of a
//! shared mutable global. UI layers subscribe here; tests record events.

/// A state change worth surfacing outside the engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ExamStarted {
        attempt_id: String,
        exam_type_id: String,
        total_questions: u32,
    },
    AnswerSaved {
        attempt_id: String,
        question_id: String,
        is_correct: bool,
    },
    FlagToggled {
        attempt_id: String,
        question_id: String,
        is_flagged: bool,
    },
    TimeCheckpointed {
        attempt_id: String,
        remaining_ms: i64,
    },
    ExamSubmitted {
        attempt_id: String,
        score: u32,
        passed: bool,
    },
    ExamAbandoned {
        attempt_id: String,
        /// True when abandonment was expiry cleanup rather than a user action.
        expired: bool,
    },
    SubmissionSynced {
        submission_id: String,
    },
    SubmissionSyncFailed {
        submission_id: String,
        retries: u32,
    },
}

/// Observer for session events. Implementations must be cheap and
/// non-blocking; engines call this inline.
pub trait SessionObserver: Send + Sync {
    fn on_event(&self, event: &SessionEvent);
}

/// Discards all events.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Logs every event through `tracing`.
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::ExamStarted {
                attempt_id,
                exam_type_id,
                total_questions,
            } => tracing::info!(attempt_id, exam_type_id, total_questions, "exam started"),
            SessionEvent::AnswerSaved {
                attempt_id,
                question_id,
                ..
            } => tracing::debug!(attempt_id, question_id, "answer saved"),
            SessionEvent::FlagToggled {
                attempt_id,
                question_id,
                is_flagged,
            } => tracing::debug!(attempt_id, question_id, is_flagged, "flag toggled"),
            SessionEvent::TimeCheckpointed {
                attempt_id,
                remaining_ms,
            } => tracing::debug!(attempt_id, remaining_ms, "time checkpointed"),
            SessionEvent::ExamSubmitted {
                attempt_id,
                score,
                passed,
            } => tracing::info!(attempt_id, score, passed, "exam submitted"),
            SessionEvent::ExamAbandoned {
                attempt_id,
                expired,
            } => tracing::info!(attempt_id, expired, "exam abandoned"),
            SessionEvent::SubmissionSynced { submission_id } => {
                tracing::info!(submission_id, "submission synced")
            }
            SessionEvent::SubmissionSyncFailed {
                submission_id,
                retries,
            } => tracing::warn!(submission_id, retries, "submission sync failed"),
        }
    }
}
