//! Block-explorer client (`getsourcecode`).
//!
//! Downloads the raw verified-source payload of one address. Non-200
//! responses are retried up to `fetch.max_retries` times with a fixed pause;
//! network errors and empty results yield no payload and the caller skips the
//! contract.

use anyhow::Result;
use serde_json::Value;
use source_sieve_core::models::RawPayload;
use std::time::Duration;

use crate::config::{ChainConfig, FetchConfig};

#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl ExplorerClient {
    pub fn new(chain: &ChainConfig, fetch: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(fetch.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: chain.endpoint.clone(),
            api_key: chain.resolve_api_key(),
            max_retries: fetch.max_retries,
            retry_delay: Duration::from_secs(fetch.retry_delay_secs),
        })
    }

    pub fn source_url(&self, address: &str) -> String {
        format!("{}&address={}&apikey={}", self.endpoint, address, self.api_key)
    }

    /// Fetch the first `result` entry for `address`, or `None`.
    pub async fn get_raw_source(&self, address: &str) -> Option<RawPayload> {
        let url = self.source_url(address);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(address, error = %e, "explorer request failed");
                    return None;
                }
            };

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(address, %status, attempt, "explorer returned non-success status");
                continue;
            }

            return match response.json::<Value>().await {
                Ok(json) => parse_response(&json),
                Err(e) => {
                    tracing::warn!(address, error = %e, "explorer response is not JSON");
                    None
                }
            };
        }

        tracing::warn!(address, retries = self.max_retries, "giving up on explorer");
        None
    }
}

/// Extract `result[0]` from a `getsourcecode` response.
///
/// Explorers report errors with `result` as a string ("Invalid API Key", rate
/// limit notices, ...); those yield `None`.
pub fn parse_response(json: &Value) -> Option<RawPayload> {
    let first = json.get("result")?.as_array()?.first()?;
    serde_json::from_value(first.clone()).ok()
}
