//! REST client for the Atelier HTTP API.
//!
//! Every call is made on behalf of one owner scope, sent in the
//! `x-owner-scope` header, and unwraps the `{ "data": ... }` envelope.

use atelier_core::asset::Asset;
use atelier_core::job::{Job, JobStatus};
use atelier_core::request::{JobListQuery, SubmitJobRequest};
use atelier_core::types::DbId;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ClientError;

/// Header carrying the caller's owner scope.
pub const OWNER_SCOPE_HEADER: &str = "x-owner-scope";

/// HTTP client for one API base URL and owner scope.
#[derive(Clone)]
pub struct AtelierApi {
    client: reqwest::Client,
    base_url: String,
    owner_scope: DbId,
}

/// Answer to a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CancelResult {
    /// `true` when this call moved the job to `canceled`.
    pub canceled: bool,
    pub status: JobStatus,
}

/// Tally returned by an explicit dispatch request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DispatchResult {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub canceled: usize,
    #[serde(default)]
    pub unrecorded: usize,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct Submitted {
    job_id: DbId,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

impl AtelierApi {
    /// * `base_url` - e.g. `http://host:3000`, without a trailing slash.
    pub fn new(base_url: impl Into<String>, owner_scope: DbId) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, owner_scope)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pool, timeouts).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, owner_scope: DbId) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            owner_scope,
        }
    }

    pub fn owner_scope(&self) -> DbId {
        self.owner_scope
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// WebSocket URL of the live job feed, derived from the base URL.
    pub fn live_feed_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/ws/jobs")
    }

    /// `POST /api/v1/jobs`. Returns the new job id.
    pub async fn submit_job(&self, request: &SubmitJobRequest) -> Result<DbId, ClientError> {
        let response = self
            .client
            .post(self.url("/api/v1/jobs"))
            .header(OWNER_SCOPE_HEADER, self.owner_scope)
            .json(request)
            .send()
            .await?;

        let submitted: Submitted = Self::parse_data(response).await?;
        Ok(submitted.job_id)
    }

    /// `GET /api/v1/jobs/{id}`.
    pub async fn get_job(&self, job_id: DbId) -> Result<Job, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/v1/jobs/{job_id}")))
            .header(OWNER_SCOPE_HEADER, self.owner_scope)
            .send()
            .await?;

        Self::parse_data(response).await
    }

    /// `GET /api/v1/jobs`.
    pub async fn list_jobs(&self, query: &JobListQuery) -> Result<Vec<Job>, ClientError> {
        let response = self
            .client
            .get(self.url("/api/v1/jobs"))
            .header(OWNER_SCOPE_HEADER, self.owner_scope)
            .query(query)
            .send()
            .await?;

        Self::parse_data(response).await
    }

    /// `POST /api/v1/jobs/{id}/cancel`.
    pub async fn cancel_job(&self, job_id: DbId) -> Result<CancelResult, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/api/v1/jobs/{job_id}/cancel")))
            .header(OWNER_SCOPE_HEADER, self.owner_scope)
            .send()
            .await?;

        Self::parse_data(response).await
    }

    /// `POST /api/v1/jobs/dispatch`: ask the server to process queued
    /// jobs now instead of waiting for the scheduled loop.
    pub async fn dispatch(&self) -> Result<DispatchResult, ClientError> {
        let response = self
            .client
            .post(self.url("/api/v1/jobs/dispatch"))
            .header(OWNER_SCOPE_HEADER, self.owner_scope)
            .send()
            .await?;

        Self::parse_data(response).await
    }

    /// `GET /api/v1/assets?ids=...`. Ids that are unknown or not yet
    /// visible are simply missing from the answer.
    pub async fn get_assets(&self, ids: &[DbId]) -> Result<Vec<Asset>, ClientError> {
        let joined = ids
            .iter()
            .map(DbId::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .get(self.url("/api/v1/assets"))
            .header(OWNER_SCOPE_HEADER, self.owner_scope)
            .query(&[("ids", joined)])
            .send()
            .await?;

        Self::parse_data(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Turn a non-2xx response into [`ClientError::Api`], reading the
    /// `{error, code}` body when the server sent one.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => (parsed.code, parsed.error),
            Err(_) => ("UNKNOWN".to_string(), body),
        };

        Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn parse_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let response = Self::ensure_success(response).await?;
        let envelope: Envelope<T> = response.json().await?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_feed_url_follows_the_scheme() {
        assert_eq!(
            AtelierApi::new("http://localhost:3000/", 1).live_feed_url(),
            "ws://localhost:3000/ws/jobs"
        );
        assert_eq!(
            AtelierApi::new("https://atelier.example", 1).live_feed_url(),
            "wss://atelier.example/ws/jobs"
        );
    }
}
