//! HTTP client for the remote results endpoint.
//!
//! Every failure mode a sync pass can hit (connect error, timeout, non-2xx,
//! unparseable body) maps to `DomainError::Remote` so the sync engine treats
//! them all as retryable.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DomainError, SyncStatus, SyncableSubmission};
use crate::ports::{RemoteResult, ResultsGateway};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Serialize)]
struct CreateResultRequest<'a> {
    exam_type_id: &'a str,
    score: u32,
    passed: bool,
    duration_ms: i64,
    submitted_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Deserialize)]
struct CreateResultResponse {
    id: String,
    sync_status: String,
}

pub struct HttpResultsGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpResultsGateway {
    pub fn new(base_url: impl Into<String>) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DomainError::Remote(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait::async_trait]
impl ResultsGateway for HttpResultsGateway {
    async fn create_result(
        &self,
        bearer_token: Option<&str>,
        submission: &SyncableSubmission,
    ) -> Result<RemoteResult, DomainError> {
        let url = format!("{}/results", self.base_url.trim_end_matches('/'));
        let body = CreateResultRequest {
            exam_type_id: &submission.exam_type_id,
            score: submission.score,
            passed: submission.passed,
            duration_ms: submission.duration_ms,
            submitted_at: submission.submitted_at,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::Remote(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DomainError::Remote(format!(
                "results endpoint returned {status}: {detail}"
            )));
        }

        let parsed: CreateResultResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Remote(format!("bad results response: {e}")))?;
        let sync_status = SyncStatus::parse(&parsed.sync_status).unwrap_or(SyncStatus::Synced);
        debug!(submission_id = %submission.id, remote_id = %parsed.id, "result created remotely");

        Ok(RemoteResult {
            remote_id: parsed.id,
            sync_status,
        })
    }
}
