// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::result_document::ExtractionMode;
use crate::engines::extraction::PageExtractor;
use crate::engines::traits::{FetchError, FetchedPage, Fetcher, NavigationConfig};
use crate::utils::retry_policy::RetryPolicy;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use tracing::debug;

/// 静态抓取器
///
/// 基于reqwest的HTTP抓取，进程内共享一个客户端（连接池）。
/// 超时、408/429 和 5xx 按指数退避重试。
pub struct StaticFetcher {
    client: reqwest::Client,
    extractor: Arc<PageExtractor>,
    retry_policy: RetryPolicy,
}

impl StaticFetcher {
    pub fn new(config: &NavigationConfig, extractor: Arc<PageExtractor>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            extractor,
            retry_policy: RetryPolicy::navigation(config.backoff_base, config.max_retries),
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.is_empty() && !content_type.contains("html") && !content_type.starts_with("text/") {
            return Err(FetchError::UnsupportedContent(content_type));
        }

        let final_url = response.url().to_string();
        let body = response.text().await.map_err(classify)?;
        let content = self.extractor.extract(&body);

        Ok(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            title: content.title,
            text: content.text,
            html: content.html,
            links: content.links,
            mode: ExtractionMode::Static,
        })
    }
}

fn classify(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(error.to_string())
    } else if let Some(status) = error.status() {
        FetchError::Status(status.as_u16())
    } else {
        FetchError::Network(error.to_string())
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut retries = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && self.retry_policy.should_retry(retries) => {
                    retries += 1;
                    let backoff = self.retry_policy.calculate_backoff(retries);
                    debug!(url = %url, retries, backoff_ms = backoff.as_millis() as u64, "Static fetch failed, retrying: {}", e);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
