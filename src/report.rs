//! Pushes verification decisions to the backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pipeline::Decision;

/// Body of the PUT sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub submission_id: i64,
    pub status: Decision,
}

/// Client for the backend's submission endpoint.
#[derive(Debug, Clone)]
pub struct BackendReporter {
    client: reqwest::Client,
    endpoint: String,
}

impl BackendReporter {
    /// Create a reporter for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Report {
                submission_id: 0,
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// PUT the decision for `submission_id`. Not retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend answers with a
    /// non-success status.
    pub async fn report(&self, submission_id: i64, decision: Decision) -> Result<()> {
        let body = VerificationReport {
            submission_id,
            status: decision,
        };

        let response = self
            .client
            .put(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Report {
                submission_id,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Report {
                submission_id,
                reason: format!("backend responded {status}"),
            });
        }

        tracing::info!(
            submission_id,
            status = %decision,
            response_status = %status,
            "Verification reported"
        );
        Ok(())
    }
}
