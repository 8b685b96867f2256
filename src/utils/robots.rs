// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::infrastructure::cache::redis_client::RedisClient;
use crate::utils::retry_policy::RetryPolicy;

/// 抓取策略接口
///
/// 在准入和抓取之前判断URL是否允许被访问。
#[async_trait]
pub trait CrawlPolicy: Send + Sync {
    /// 检查URL是否被允许访问
    async fn is_allowed(&self, url: &str) -> Result<bool>;
}

/// 放行所有URL的策略，用于关闭 robots 检查的部署
#[derive(Debug, Clone, Default)]
pub struct AllowAllPolicy;

#[async_trait]
impl CrawlPolicy for AllowAllPolicy {
    async fn is_allowed(&self, _url: &str) -> Result<bool> {
        Ok(true)
    }
}

/// 缓存的Robots.txt内容
#[derive(Clone)]
struct CachedRobots {
    /// 内容
    content: String,

    /// 过期时间
    expires_at: Instant,
}

/// 基于 robots.txt 的抓取策略
///
/// 内容按源缓存在内存中，可选地再缓存到Redis供其他进程复用。
/// robots.txt 不存在、返回 4xx 或持续失败时按"全部允许"处理。
#[derive(Clone)]
pub struct RobotsPolicy {
    /// HTTP客户端
    client: Client,

    /// 匹配时使用的 User-Agent
    user_agent: String,

    /// 内存缓存
    memory_cache: Arc<DashMap<String, CachedRobots>>,

    /// Redis客户端
    redis_client: Option<RedisClient>,

    /// 重试策略
    retry_policy: RetryPolicy,

    /// 缓存时间
    cache_ttl: Duration,
}

#[async_trait]
impl CrawlPolicy for RobotsPolicy {
    async fn is_allowed(&self, url_str: &str) -> Result<bool> {
        let url = Url::parse(url_str)?;
        let content = self.robots_content(&url).await?;
        if content.is_empty() {
            return Ok(true);
        }
        let mut matcher = DefaultMatcher::default();
        Ok(matcher.one_agent_allowed_by_robots(&content, &self.user_agent, url.as_str()))
    }
}

impl RobotsPolicy {
    /// 创建新的Robots策略实例
    ///
    /// # 参数
    ///
    /// * `user_agent` - 抓取时使用的 User-Agent
    /// * `redis_client` - 可选的Redis缓存
    pub fn new(user_agent: impl Into<String>, redis_client: Option<RedisClient>) -> Self {
        Self {
            client: Client::new(),
            user_agent: user_agent.into(),
            memory_cache: Arc::new(DashMap::new()),
            redis_client,
            retry_policy: RetryPolicy {
                max_retries: 3,
                initial_backoff: Duration::from_secs(2),
                max_backoff: Duration::from_secs(10),
                ..Default::default()
            },
            cache_ttl: Duration::from_secs(3600),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn robots_url(url: &Url) -> Result<String> {
        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(anyhow::anyhow!("URL has no origin: {}", url));
        }
        Ok(format!("{}/robots.txt", origin.ascii_serialization()))
    }

    /// 获取Robots.txt内容（带缓存）
    async fn robots_content(&self, url: &Url) -> Result<String> {
        let robots_url = Self::robots_url(url)?;

        // 1. Check memory cache
        if let Some(cached) = self.memory_cache.get(&robots_url) {
            if cached.expires_at > Instant::now() {
                return Ok(cached.content.clone());
            }
        }

        // 2. Check Redis cache
        let redis_key = format!("robots_cache:{}", robots_url);
        if let Some(ref redis) = self.redis_client {
            if let Ok(Some(content)) = redis.get(&redis_key).await {
                self.remember(&robots_url, &content);
                return Ok(content);
            }
        }

        // 3. Fetch robots.txt with retry
        let content = self.fetch_robots(&robots_url).await;

        self.remember(&robots_url, &content);
        if let Some(ref redis) = self.redis_client {
            if let Err(e) = redis.set(&redis_key, &content, 86400).await {
                tracing::debug!("Failed to cache robots.txt in Redis: {}", e);
            }
        }

        Ok(content)
    }

    fn remember(&self, robots_url: &str, content: &str) {
        self.memory_cache.insert(
            robots_url.to_string(),
            CachedRobots {
                content: content.to_string(),
                expires_at: Instant::now() + self.cache_ttl,
            },
        );
    }

    async fn fetch_robots(&self, robots_url: &str) -> String {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < self.retry_policy.max_retries.max(1) {
            attempt += 1;
            let response = self
                .client
                .get(robots_url)
                .header("User-Agent", &self.user_agent)
                .timeout(Duration::from_secs(5))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    return resp.text().await.unwrap_or_default();
                }
                Ok(resp) if resp.status().is_server_error() => {
                    last_error = Some(anyhow::anyhow!("Server error: {}", resp.status()));
                }
                // 404 and other client errors mean there is no usable robots.txt
                Ok(_) => return String::new(),
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Request failed: {}", e));
                }
            }

            if attempt < self.retry_policy.max_retries {
                tokio::time::sleep(self.retry_policy.calculate_backoff(attempt)).await;
            }
        }

        if let Some(err) = last_error {
            tracing::warn!("Failed to fetch robots.txt from {}: {}", robots_url, err);
        }
        String::new()
    }
}
