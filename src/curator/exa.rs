use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ensure_provider, Curator};
use crate::error::{AppError, Result};
use crate::models::Strategy;

const EXA_API_URL: &str = "https://api.exa.ai/search";
const DEFAULT_NUM_RESULTS: u32 = 10;

/// Web search curator backed by the Exa search API.
pub struct ExaCurator {
    client: Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ExaParams {
    query: String,
    #[serde(default)]
    num_results: Option<u32>,
    /// Only return results published within this many days.
    #[serde(default)]
    since_days: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    num_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_published_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
}

impl ExaCurator {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl Curator for ExaCurator {
    fn provider(&self) -> &'static str {
        "exa"
    }

    async fn run(&self, strategy: &Strategy) -> Result<Vec<String>> {
        ensure_provider(self, strategy)?;
        let params: ExaParams = strategy.params()?;

        let request = SearchRequest {
            query: &params.query,
            num_results: params.num_results.unwrap_or(DEFAULT_NUM_RESULTS),
            start_published_date: params
                .since_days
                .map(|days| (Utc::now() - chrono::Duration::days(days)).to_rfc3339()),
        };

        let response = self
            .client
            .post(EXA_API_URL)
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::provider("exa", format!("HTTP {status}: {error_text}")));
        }

        let body: SearchResponse = response.json().await?;
        let urls: Vec<String> = body.results.into_iter().map(|r| r.url).collect();
        tracing::debug!(query = %params.query, found = urls.len(), "exa search complete");
        Ok(urls)
    }
}
