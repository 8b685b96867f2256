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

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::result_document::ExtractionMode;

/// 抓取错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 超时
    #[error("Timeout: {0}")]
    Timeout(String),
    /// 非成功状态码
    #[error("HTTP status {0}")]
    Status(u16),
    /// 网络错误
    #[error("Network error: {0}")]
    Network(String),
    /// 非HTML内容
    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),
    /// 浏览器渲染失败
    #[error("Render error: {0}")]
    Render(String),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

impl FetchError {
    /// 判断错误是否可重试
    ///
    /// 超时、网络错误、408/429 和 5xx 可重试；其余 4xx 为永久失败。
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) | FetchError::Render(_) => true,
            FetchError::Status(code) => is_retryable_status(*code),
            FetchError::UnsupportedContent(_) | FetchError::Other(_) => false,
        }
    }

    /// 重投也不会成功的失败
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::Status(code) if (400..500).contains(code) && !is_retryable_status(*code))
    }
}

pub fn is_retryable_status(code: u16) -> bool {
    code == 0 || code == 408 || code == 429 || (500..600).contains(&code)
}

/// 抓取并提取后的页面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// 跟随重定向后的最终地址
    pub final_url: String,
    pub status_code: u16,
    pub title: Option<String>,
    /// 规范化后的正文
    pub text: String,
    /// 原始或选择性提取的HTML
    pub html: String,
    /// 页面上的原始 href（未解析、未过滤）
    pub links: Vec<String>,
    pub mode: ExtractionMode,
}

/// 导航参数
#[derive(Debug, Clone)]
pub struct NavigationConfig {
    pub user_agent: String,
    /// 单次导航的超时时间
    pub timeout: Duration,
    /// 可重试失败后的额外尝试次数
    pub max_retries: u32,
    /// 第 i 次重试前等待 base * 2^(i-1)
    pub backoff_base: Duration,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            user_agent: "crawlmesh-bot/0.1".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// 抓取器特质
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 抓取URL并提取内容
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;

    /// 抓取器名称
    fn name(&self) -> &'static str;
}
