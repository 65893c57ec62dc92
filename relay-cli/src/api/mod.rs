//! API client module
//!
//! HTTP client for the orchestrator's job API. Every request carries the
//! configured owner in the `X-Owner-Id` header.

pub mod error;

pub use error::{ClientError, Result};

use relay_core::dto::job::{JobPage, JobView, ListJobsQuery, SubmitJob, SubmitJobResponse};
use relay_core::dto::metrics::MetricsSnapshot;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use uuid::Uuid;

const OWNER_HEADER: &str = "X-Owner-Id";

/// HTTP client for the orchestrator API
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    owner_id: i64,
    client: Client,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the orchestrator API
    /// * `owner_id` - Owner the requests are made on behalf of
    pub fn new(base_url: &str, owner_id: i64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            owner_id,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a job
    ///
    /// A repeated idempotency key returns the existing job rather than an error.
    pub async fn submit_job(&self, req: &SubmitJob) -> Result<SubmitJobResponse> {
        let request = self.client.post(self.url("/api/jobs")).json(req);
        self.send(request).await
    }

    /// Get one of the owner's jobs by ID
    pub async fn get_job(&self, id: Uuid) -> Result<JobView> {
        let request = self.client.get(self.url(&format!("/api/jobs/{}", id)));
        self.send(request).await
    }

    /// List the owner's jobs, newest first
    pub async fn list_jobs(&self, query: &ListJobsQuery) -> Result<JobPage> {
        let request = self.client.get(self.url("/api/jobs")).query(query);
        self.send(request).await
    }

    pub async fn metrics(&self) -> Result<MetricsSnapshot> {
        let request = self.client.get(self.url("/api/metrics"));
        self.send(request).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .header(OWNER_HEADER, self.owner_id)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/", 1);
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/api/jobs"), "http://localhost:8080/api/jobs");
    }
}
