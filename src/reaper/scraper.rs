use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};

const USER_AGENT_STRING: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Fetches raw markup for a URL.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Plain HTTP scraper with a browser user agent.
pub struct HttpScraper {
    client: Client,
}

impl HttpScraper {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).map_err(|e| AppError::Extraction {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Extraction {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let response = self.client.get(parsed).send().await?;

        if !response.status().is_success() {
            return Err(AppError::Extraction {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        Ok(response.text().await?)
    }
}
