// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{FetchError, FetchedPage, Fetcher};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// 抓取路由器
///
/// 按顺序尝试各抓取器：前一个失败或拿到空正文时交给下一个，
/// 返回最后一个失败的错误。永久失败（如 404）不会再交给下一个抓取器。
/// 典型配置为"静态优先，浏览器兜底"。
pub struct FetchRouter {
    fetchers: Vec<Arc<dyn Fetcher>>,
}

impl FetchRouter {
    /// 创建新的路由器实例
    ///
    /// # 参数
    ///
    /// * `fetchers` - 按优先级排列的抓取器列表
    pub fn new(fetchers: Vec<Arc<dyn Fetcher>>) -> Self {
        Self { fetchers }
    }

    pub fn fetcher_names(&self) -> Vec<&'static str> {
        self.fetchers.iter().map(|f| f.name()).collect()
    }
}

#[async_trait]
impl Fetcher for FetchRouter {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut last_error = FetchError::Other("no fetcher configured".to_string());
        let mut fallback: Option<FetchedPage> = None;
        let total = self.fetchers.len();

        for (index, fetcher) in self.fetchers.iter().enumerate() {
            let has_next = index + 1 < total;
            match fetcher.fetch(url).await {
                Ok(page) if page.text.is_empty() && has_next => {
                    debug!(url = %url, fetcher = fetcher.name(), "Empty body, trying next fetcher");
                    fallback.get_or_insert(page);
                }
                Ok(page) => return Ok(page),
                Err(e) if e.is_permanent() => {
                    debug!(url = %url, fetcher = fetcher.name(), "Permanent failure, no fallback: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    if has_next {
                        info!(url = %url, fetcher = fetcher.name(), "Fetch failed, falling back: {}", e);
                    }
                    last_error = e;
                }
            }
        }

        // an empty page is still a successful fetch
        fallback.ok_or(last_error)
    }

    fn name(&self) -> &'static str {
        "router"
    }
}
