//! HTTP client for a reasoning gateway.

use super::{
    Context, DecisionProvider, DecisionResponse, LearningRequest, ProviderError, ProviderErrorKind,
};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpDecisionProvider {
    client: Client,
    base_url: String,
    max_retry_elapsed: Duration,
}

/// Error body the gateway may return; keeps whatever trace it produced.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    cot_trace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

impl HttpDecisionProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retry_elapsed: Duration::from_secs(20),
        }
    }

    pub fn with_max_retry_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_retry_elapsed = elapsed;
        self
    }

    /// Provider calls have no side effects on our state, so transient
    /// failures are retried.
    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(ProviderError::new(ProviderErrorKind::Network(
                        e.to_string(),
                    )))
                })?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let parsed: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
                let err = ProviderError::new(ProviderErrorKind::Http {
                    status: status.as_u16(),
                    message: parsed.error.unwrap_or(text),
                })
                .with_trace(parsed.prompt, parsed.cot_trace);
                if status.as_u16() == 429 || status.is_server_error() {
                    return Err(backoff::Error::transient(err));
                }
                return Err(backoff::Error::permanent(err));
            }

            response.json::<T>().await.map_err(|e| {
                backoff::Error::permanent(ProviderError::new(ProviderErrorKind::Parse(
                    e.to_string(),
                )))
            })
        })
        .await
    }
}

#[async_trait]
impl DecisionProvider for HttpDecisionProvider {
    async fn decide(&self, context: &Context) -> Result<DecisionResponse, ProviderError> {
        debug!(
            "Requesting decisions: {} candidates, {} positions",
            context.candidates.len(),
            context.positions.len()
        );
        let response: DecisionResponse = self.post("/decide", context).await?;
        if response.decisions.is_empty() {
            warn!("Provider returned no decisions");
        }
        Ok(response)
    }

    async fn summarize(&self, request: &LearningRequest) -> Result<String, ProviderError> {
        debug!("Requesting learning summary over {} outcomes", request.outcomes.len());
        let response: SummaryResponse = self.post("/summarize", request).await?;
        Ok(response.summary)
    }
}
