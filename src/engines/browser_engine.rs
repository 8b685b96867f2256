// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::result_document::ExtractionMode;
use crate::engines::extraction::PageExtractor;
use crate::engines::traits::{FetchError, FetchedPage, Fetcher, NavigationConfig};
use crate::utils::retry_policy::RetryPolicy;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 渲染抓取器
///
/// 每个进程一个浏览器实例。每个任务在独立的浏览器上下文中打开标签页，
/// Cookie 和存储不会跨任务共享；无论成功、失败、超时还是 panic，上下文都会被销毁。
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    extractor: Arc<PageExtractor>,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl BrowserFetcher {
    /// 启动本地浏览器，或连接 `remote_url` 指向的远程实例
    pub async fn launch(
        config: &NavigationConfig,
        remote_url: Option<&str>,
        extractor: Arc<PageExtractor>,
    ) -> Result<Self, FetchError> {
        let (browser, mut handler) = if let Some(url) = remote_url {
            info!("Connecting to remote Chrome instance at: {}", url);
            Browser::connect(url)
                .await
                .map_err(|e| FetchError::Render(format!("Failed to connect to remote Chrome: {}", e)))?
        } else {
            let browser_config = BrowserConfig::builder()
                .no_sandbox()
                .request_timeout(config.timeout)
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg(format!("--user-agent={}", config.user_agent))
                .build()
                .map_err(FetchError::Render)?;
            Browser::launch(browser_config)
                .await
                .map_err(|e| FetchError::Render(format!("Failed to launch Chrome: {}", e)))?
        };

        // Spawn a handler to process browser events
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            handler,
            extractor,
            timeout: config.timeout,
            retry_policy: RetryPolicy::navigation(config.backoff_base, config.max_retries),
        })
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<FetchedPage, FetchError> {
        let mut retries = 0;
        loop {
            let attempt = tokio::time::timeout(self.timeout, page.goto(url)).await;
            let error = match attempt {
                Ok(Ok(_)) => break,
                Ok(Err(e)) => FetchError::Render(e.to_string()),
                Err(_) => FetchError::Timeout(format!("navigation exceeded {:?}", self.timeout)),
            };
            if !self.retry_policy.should_retry(retries) {
                return Err(error);
            }
            retries += 1;
            let backoff = self.retry_policy.calculate_backoff(retries);
            debug!(url = %url, retries, "Navigation failed, retrying: {}", error);
            tokio::time::sleep(backoff).await;
        }

        let html = page
            .content()
            .await
            .map_err(|e| FetchError::Render(e.to_string()))?;
        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());
        let content = self.extractor.extract(&html);

        Ok(FetchedPage {
            final_url,
            status_code: 200,
            title: content.title,
            text: content.text,
            html: content.html,
            links: content.links,
            mode: ExtractionMode::Rendered,
        })
    }

    /// 在给定上下文中打开标签页并导航，正常返回时关闭标签页
    async fn fetch_in_context(
        &self,
        context: &BrowserContextId,
        url: &str,
    ) -> Result<FetchedPage, FetchError> {
        let page = self
            .browser
            .new_page(page_params(context)?)
            .await
            .map_err(|e| FetchError::Render(e.to_string()))?;

        let result = self.navigate(&page, url).await;
        if let Err(e) = page.close().await {
            warn!(url = %url, "Failed to close page: {}", e);
        }
        result
    }
}

/// 绑定到任务上下文的空白标签页
fn page_params(context: &BrowserContextId) -> Result<CreateTargetParams, FetchError> {
    CreateTargetParams::builder()
        .url("about:blank")
        .browser_context_id(context.clone())
        .build()
        .map_err(FetchError::Render)
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let context = self
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(|e| FetchError::Render(format!("Failed to create browser context: {}", e)))?;

        let result = AssertUnwindSafe(self.fetch_in_context(&context, url))
            .catch_unwind()
            .await;

        // disposing the context also closes any page left open by a panic
        if let Err(e) = self.browser.dispose_browser_context(context).await {
            warn!(url = %url, "Failed to dispose browser context: {}", e);
        }
        match result {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

impl Drop for BrowserFetcher {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
