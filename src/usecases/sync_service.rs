//! Result reconciliation with the remote system of record.
//!
//! - Pending submissions are pushed in ascending original-submission order
//! - Failed submissions are retried sequentially with exponential backoff;
//!   ordering and remote rate limits matter more than throughput, so there is
//!   no parallel fan-out
//! - Status and retry count are committed before every backoff sleep, so a
//!   process death mid-delay loses only elapsed delay time, never correctness
//! - Transient remote failures never bubble to the caller; they are visible
//!   only through submission status

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{DomainError, EntityKind, SyncStatus, SyncableSubmission, UserScope};
use crate::ports::{
    AttemptStore, Identity, ResultsGateway, SessionEvent, SessionObserver, SubmissionStore,
};
use crate::shared::Clock;
use crate::shared::config::{DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_CAP};

/// Exponent clamp for the backoff doubling; keeps the multiplier well inside
/// u32 even for absurd retry counts.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Backoff and give-up policy for failed submissions.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    /// Informational ceiling unless `enforce_cap` is set.
    pub retry_cap: u32,
    /// When false (the default), capped submissions are still retried; the
    /// engine never gives up, it only backs off harder.
    pub enforce_cap: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            retry_cap: DEFAULT_RETRY_CAP,
            enforce_cap: false,
        }
    }
}

impl RetryPolicy {
    /// `base x 2^retries`: 0 -> 5 s, 1 -> 10 s, 2 -> 20 s with the default base.
    pub fn backoff_delay(&self, retries: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(retries.min(MAX_BACKOFF_EXPONENT));
        self.base_delay.saturating_mul(multiplier)
    }
}

/// Outcome counts of one sync pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Reconciles locally recorded results with the remote endpoint.
pub struct SyncEngine {
    submissions: Arc<dyn SubmissionStore>,
    attempts: Arc<dyn AttemptStore>,
    remote: Arc<dyn ResultsGateway>,
    identity: Arc<dyn Identity>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn SessionObserver>,
    policy: RetryPolicy,
}

impl SyncEngine {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        attempts: Arc<dyn AttemptStore>,
        remote: Arc<dyn ResultsGateway>,
        identity: Arc<dyn Identity>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn SessionObserver>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            submissions,
            attempts,
            remote,
            identity,
            clock,
            observer,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Pushes every Pending submission owned by `user_id`. First failure
    /// moves a submission to Failed with retries = 1.
    pub async fn sync_pending_attempts(&self, user_id: &str) -> Result<SyncReport, DomainError> {
        let scope = UserScope::user(user_id);
        let pending = self
            .submissions
            .submissions_with_status(&scope, SyncStatus::Pending)
            .await?;
        let token = self.identity.bearer_token().await;

        let mut report = SyncReport::default();
        for submission in pending {
            match self.push_one(&scope, &submission, token.as_deref()).await? {
                PushOutcome::Synced => report.synced += 1,
                PushOutcome::Failed => {
                    // First failure for a pending record.
                    self.submissions
                        .set_sync_state(&scope, &submission.id, SyncStatus::Failed, 1, None)
                        .await?;
                    self.observer.on_event(&SessionEvent::SubmissionSyncFailed {
                        submission_id: submission.id.clone(),
                        retries: 1,
                    });
                    report.failed += 1;
                }
            }
        }

        info!(user_id, synced = report.synced, failed = report.failed, "pending sync pass done");
        Ok(report)
    }

    /// Retries Failed submissions in ascending original-submission order,
    /// strictly sequentially, sleeping `base x 2^retries` before each one.
    pub async fn retry_failed_attempts(&self, user_id: &str) -> Result<SyncReport, DomainError> {
        let scope = UserScope::user(user_id);
        let failed = self
            .submissions
            .submissions_with_status(&scope, SyncStatus::Failed)
            .await?;
        let token = self.identity.bearer_token().await;

        let mut report = SyncReport::default();
        for submission in failed {
            if self.policy.enforce_cap && submission.sync_retries >= self.policy.retry_cap {
                warn!(
                    submission_id = %submission.id,
                    retries = submission.sync_retries,
                    cap = self.policy.retry_cap,
                    "retry cap reached, skipping"
                );
                report.skipped += 1;
                continue;
            }

            // Status and retry count were committed before this suspension
            // point; dying here only loses elapsed delay time.
            tokio::time::sleep(self.policy.backoff_delay(submission.sync_retries)).await;

            match self.push_one(&scope, &submission, token.as_deref()).await? {
                PushOutcome::Synced => report.synced += 1,
                PushOutcome::Failed => {
                    let retries = submission.sync_retries + 1;
                    self.submissions
                        .set_sync_state(&scope, &submission.id, SyncStatus::Failed, retries, None)
                        .await?;
                    self.observer.on_event(&SessionEvent::SubmissionSyncFailed {
                        submission_id: submission.id.clone(),
                        retries,
                    });
                    report.failed += 1;
                }
            }
        }

        info!(
            user_id,
            synced = report.synced,
            failed = report.failed,
            skipped = report.skipped,
            "retry pass done"
        );
        Ok(report)
    }

    /// Remote-driven acceptance outside the retry loop.
    pub async fn mark_synced(&self, user_id: &str, submission_id: &str) -> Result<(), DomainError> {
        let scope = UserScope::user(user_id);
        self.require_submission(&scope, submission_id).await?;
        self.submissions
            .set_sync_state(
                &scope,
                submission_id,
                SyncStatus::Synced,
                0,
                Some(self.clock.now()),
            )
            .await?;
        self.observer.on_event(&SessionEvent::SubmissionSynced {
            submission_id: submission_id.to_string(),
        });
        Ok(())
    }

    /// Remote-driven rejection outside the retry loop. Returns the new retry
    /// count.
    pub async fn mark_failed(&self, user_id: &str, submission_id: &str) -> Result<u32, DomainError> {
        let scope = UserScope::user(user_id);
        let submission = self.require_submission(&scope, submission_id).await?;
        let retries = submission.sync_retries + 1;
        self.submissions
            .set_sync_state(&scope, submission_id, SyncStatus::Failed, retries, None)
            .await?;
        self.observer.on_event(&SessionEvent::SubmissionSyncFailed {
            submission_id: submission_id.to_string(),
            retries,
        });
        Ok(retries)
    }

    /// Sign-out hook: clears every locally persisted row for the outgoing
    /// identity (attempts, answers, submissions, aggregate stats) before any
    /// other identity's data may be loaded.
    pub async fn handle_sign_out(&self, scope: &UserScope) -> Result<(), DomainError> {
        self.attempts.clear_scope(scope).await?;
        self.submissions.clear_scope(scope).await?;
        info!(scope = scope.storage_key(), "local exam data cleared on sign-out");
        Ok(())
    }

    async fn push_one(
        &self,
        scope: &UserScope,
        submission: &SyncableSubmission,
        token: Option<&str>,
    ) -> Result<PushOutcome, DomainError> {
        match self.remote.create_result(token, submission).await {
            Ok(remote) => {
                self.submissions
                    .set_sync_state(
                        scope,
                        &submission.id,
                        SyncStatus::Synced,
                        0,
                        Some(self.clock.now()),
                    )
                    .await?;
                info!(
                    submission_id = %submission.id,
                    remote_id = %remote.remote_id,
                    "submission synced"
                );
                self.observer.on_event(&SessionEvent::SubmissionSynced {
                    submission_id: submission.id.clone(),
                });
                Ok(PushOutcome::Synced)
            }
            // Timeouts and rejections share this path; both stay local.
            Err(DomainError::Remote(reason)) => {
                warn!(submission_id = %submission.id, %reason, "remote create failed");
                Ok(PushOutcome::Failed)
            }
            Err(other) => Err(other),
        }
    }

    async fn require_submission(
        &self,
        scope: &UserScope,
        submission_id: &str,
    ) -> Result<SyncableSubmission, DomainError> {
        self.submissions
            .submission(scope, submission_id)
            .await?
            .ok_or_else(|| DomainError::not_found(EntityKind::Submission, submission_id))
    }
}

enum PushOutcome {
    Synced,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::memory::MemoryStore;
    use crate::adapters::remote::mock_results::MockResultsGateway;
    use crate::ports::NoopObserver;
    use crate::shared::ManualClock;
    use chrono::{Duration as ChronoDuration, Utc};

    struct TokenIdentity;

    #[async_trait::async_trait]
    impl Identity for TokenIdentity {
        async fn current_user_id(&self) -> Option<String> {
            Some("u1".into())
        }

        async fn bearer_token(&self) -> Option<String> {
            Some("token-u1".into())
        }

        async fn sign_out(&self) -> Result<(), DomainError> {
            Ok(())
        }
    }

    fn submission(id: &str, minutes_ago: i64, status: SyncStatus, retries: u32) -> SyncableSubmission {
        SyncableSubmission {
            id: id.into(),
            user_id: Some("u1".into()),
            exam_type_id: "cert".into(),
            score: 75,
            passed: true,
            duration_ms: 50 * 60_000,
            submitted_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
            sync_status: status,
            sync_retries: retries,
            synced_at: None,
        }
    }

    fn engine(
        store: Arc<MemoryStore>,
        remote: Arc<MockResultsGateway>,
        policy: RetryPolicy,
    ) -> SyncEngine {
        SyncEngine::new(
            store.clone(),
            store,
            remote,
            Arc::new(TokenIdentity),
            Arc::new(ManualClock::at(Utc::now())),
            Arc::new(NoopObserver),
            policy,
        )
    }

    #[test]
    fn backoff_doubles_from_five_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(5_000));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(10_000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(20_000));
        // Huge retry counts stay finite.
        assert!(policy.backoff_delay(400) > Duration::from_millis(0));
    }

    #[tokio::test]
    async fn pending_failure_moves_to_failed_with_one_retry() {
        let store = Arc::new(MemoryStore::new());
        let scope = UserScope::user("u1");
        store
            .insert_submission(&scope, &submission("s1", 10, SyncStatus::Pending, 0))
            .await
            .unwrap();
        store
            .insert_submission(&scope, &submission("s2", 5, SyncStatus::Pending, 0))
            .await
            .unwrap();

        let remote = Arc::new(MockResultsGateway::new());
        remote.enqueue_failure("503 service unavailable");

        let engine = engine(store.clone(), remote, RetryPolicy::default());
        let report = engine.sync_pending_attempts("u1").await.unwrap();
        assert_eq!(report, SyncReport { synced: 1, failed: 1, skipped: 0 });

        // s1 is older and was pushed first, eating the scripted failure.
        let s1 = store.submission(&scope, "s1").await.unwrap().unwrap();
        assert_eq!(s1.sync_status, SyncStatus::Failed);
        assert_eq!(s1.sync_retries, 1);
        let s2 = store.submission(&scope, "s2").await.unwrap().unwrap();
        assert_eq!(s2.sync_status, SyncStatus::Synced);
        assert_eq!(s2.sync_retries, 0);
        assert!(s2.synced_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_is_sequential_in_submission_order_and_resets_on_success() {
        let store = Arc::new(MemoryStore::new());
        let scope = UserScope::user("u1");
        store
            .insert_submission(&scope, &submission("older", 60, SyncStatus::Failed, 2))
            .await
            .unwrap();
        store
            .insert_submission(&scope, &submission("newer", 30, SyncStatus::Failed, 1))
            .await
            .unwrap();

        let remote = Arc::new(MockResultsGateway::new());
        remote.enqueue_success();
        remote.enqueue_failure("timeout");

        let engine = engine(store.clone(), remote.clone(), RetryPolicy::default());
        let report = engine.retry_failed_attempts("u1").await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 1);

        assert_eq!(remote.calls(), vec!["older".to_string(), "newer".to_string()]);

        let older = store.submission(&scope, "older").await.unwrap().unwrap();
        assert_eq!(older.sync_status, SyncStatus::Synced);
        assert_eq!(older.sync_retries, 0);
        let newer = store.submission(&scope, "newer").await.unwrap().unwrap();
        assert_eq!(newer.sync_status, SyncStatus::Failed);
        assert_eq!(newer.sync_retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn capped_submissions_are_still_retried_by_default() {
        let store = Arc::new(MemoryStore::new());
        let scope = UserScope::user("u1");
        store
            .insert_submission(&scope, &submission("s1", 10, SyncStatus::Failed, 12))
            .await
            .unwrap();

        let remote = Arc::new(MockResultsGateway::new());
        let engine = engine(store.clone(), remote.clone(), RetryPolicy::default());
        let report = engine.retry_failed_attempts("u1").await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn enforced_cap_skips_without_touching_the_remote() {
        let store = Arc::new(MemoryStore::new());
        let scope = UserScope::user("u1");
        store
            .insert_submission(&scope, &submission("s1", 10, SyncStatus::Failed, 12))
            .await
            .unwrap();

        let remote = Arc::new(MockResultsGateway::new());
        let policy = RetryPolicy {
            enforce_cap: true,
            ..RetryPolicy::default()
        };
        let engine = engine(store.clone(), remote.clone(), policy);
        let report = engine.retry_failed_attempts("u1").await.unwrap();
        assert_eq!(report.skipped, 1);
        assert!(remote.calls().is_empty());

        let s1 = store.submission(&scope, "s1").await.unwrap().unwrap();
        assert_eq!(s1.sync_status, SyncStatus::Failed);
        assert_eq!(s1.sync_retries, 12);
    }

    #[tokio::test]
    async fn explicit_terminal_transitions() {
        let store = Arc::new(MemoryStore::new());
        let scope = UserScope::user("u1");
        store
            .insert_submission(&scope, &submission("s1", 10, SyncStatus::Pending, 0))
            .await
            .unwrap();

        let remote = Arc::new(MockResultsGateway::new());
        let engine = engine(store.clone(), remote, RetryPolicy::default());

        engine.mark_failed("u1", "s1").await.unwrap();
        let s1 = store.submission(&scope, "s1").await.unwrap().unwrap();
        assert_eq!(s1.sync_status, SyncStatus::Failed);
        assert_eq!(s1.sync_retries, 1);

        engine.mark_synced("u1", "s1").await.unwrap();
        let s1 = store.submission(&scope, "s1").await.unwrap().unwrap();
        assert_eq!(s1.sync_status, SyncStatus::Synced);
        assert_eq!(s1.sync_retries, 0);
        assert!(s1.synced_at.is_some());

        match engine.mark_synced("u1", "ghost").await.unwrap_err() {
            DomainError::NotFound { kind, .. } => assert_eq!(kind, EntityKind::Submission),
            other => panic!("expected NotFound, got {other}"),
        }
    }

    #[tokio::test]
    async fn sign_out_clears_only_the_outgoing_identity() {
        let store = Arc::new(MemoryStore::new());
        let alice = UserScope::user("alice");
        let bob = UserScope::user("bob");
        let mut bob_sub = submission("b1", 5, SyncStatus::Pending, 0);
        bob_sub.user_id = Some("bob".into());
        store
            .insert_submission(&alice, &submission("a1", 10, SyncStatus::Pending, 0))
            .await
            .unwrap();
        store.insert_submission(&bob, &bob_sub).await.unwrap();

        let remote = Arc::new(MockResultsGateway::new());
        let engine = engine(store.clone(), remote, RetryPolicy::default());
        engine.handle_sign_out(&alice).await.unwrap();

        assert!(store.submissions(&alice).await.unwrap().is_empty());
        assert_eq!(store.submissions(&bob).await.unwrap().len(), 1);
    }
}
