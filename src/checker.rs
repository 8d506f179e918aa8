use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::models::{CheckResult, Endpoint, Failure};
use crate::validation::validate;

/// Fetches endpoint bodies and classifies them.
pub struct EndpointChecker {
    http_client: reqwest::Client,
    max_concurrency: usize,
}

impl EndpointChecker {
    pub fn new(request_timeout: Duration, max_concurrency: usize) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            max_concurrency: max_concurrency.max(1),
        })
    }

    /// Checks every endpoint once. Results come back in the order of `endpoints`,
    /// whatever the concurrency.
    pub async fn check_all(&self, endpoints: &[Endpoint]) -> Vec<CheckResult> {
        stream::iter(endpoints.iter().enumerate())
            .map(|(index, endpoint)| {
                debug!(index, total = endpoints.len(), "Queueing endpoint check");
                self.check(endpoint)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    pub async fn check(&self, endpoint: &Endpoint) -> CheckResult {
        info!(url = %endpoint.url, "Checking endpoint");
        let failure = match self.fetch(endpoint).await {
            Ok(body) => {
                let verdict = validate(&body);
                (!verdict.is_pass()).then_some(Failure::Validation(verdict))
            }
            Err(e) => Some(Failure::Transport(e.to_string())),
        };

        let result = CheckResult {
            endpoint: endpoint.clone(),
            checked_at: Utc::now(),
            failure,
        };
        if let Some(reason) = result.reason() {
            warn!(url = %endpoint.url, %reason, "Endpoint check failed");
        }
        result
    }

    async fn fetch(&self, endpoint: &Endpoint) -> Result<String, TransportError> {
        let transport_error = |source| TransportError {
            url: endpoint.url.clone(),
            source,
        };

        let response = self
            .http_client
            .get(&endpoint.url)
            .send()
            .await
            .map_err(transport_error)?;
        debug!(url = %endpoint.url, status = %response.status(), "Endpoint responded");

        response.text().await.map_err(transport_error)
    }
}
