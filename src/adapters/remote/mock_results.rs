//! Scripted in-process results gateway. Used by tests and by offline runs
//! where no remote endpoint is configured.

use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

use crate::domain::{DomainError, SyncStatus, SyncableSubmission};
use crate::ports::{RemoteResult, ResultsGateway};

enum Scripted {
    Success,
    Failure(String),
}

/// Responds with scripted outcomes in order; once the script is exhausted,
/// every call succeeds. Records the submission id of each call.
pub struct MockResultsGateway {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl MockResultsGateway {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn enqueue_success(&self) {
        self.script.lock().unwrap().push_back(Scripted::Success);
    }

    pub fn enqueue_failure(&self, reason: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Failure(reason.to_string()));
    }

    /// Submission ids in push order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockResultsGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ResultsGateway for MockResultsGateway {
    async fn create_result(
        &self,
        bearer_token: Option<&str>,
        submission: &SyncableSubmission,
    ) -> Result<RemoteResult, DomainError> {
        self.calls.lock().unwrap().push(submission.id.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Failure(reason)) => Err(DomainError::Remote(reason)),
            Some(Scripted::Success) | None => Ok(RemoteResult {
                remote_id: Uuid::new_v4().to_string(),
                sync_status: if bearer_token.is_some() {
                    SyncStatus::Pending
                } else {
                    SyncStatus::Synced
                },
            }),
        }
    }
}
