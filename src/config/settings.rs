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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::services::admission_service::OriginLimits;
use crate::engines::traits::NavigationConfig;
use crate::queue::backend::BackendKind;
use crate::queue::frontier_bus::FrontierBusConfig;
use crate::queue::retry_tiers::{RetryTier, RetryTierPolicy};
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::crawl_worker::CrawlSettings;

/// 应用程序配置设置
///
/// 包含Redis、前沿队列、重试、爬取、准入、去重、抓取和工作器等配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Redis配置
    pub redis: RedisSettings,
    /// 前沿队列配置
    pub frontier: FrontierSettings,
    /// 重试分层配置
    pub retry: RetrySettings,
    /// 爬取范围配置
    pub crawl: CrawlScopeSettings,
    /// 准入控制配置
    pub admission: AdmissionSettings,
    /// 去重配置
    pub dedup: DedupSettings,
    /// 抓取配置
    pub fetch: FetchSettings,
    /// 工作器配置
    pub worker: WorkerSettings,
}

/// Redis配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis连接URL
    pub url: String,
}

/// 前沿队列配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierSettings {
    /// 后端类型 (stream, list, memory)
    pub backend: String,
    /// 去重集合和准入键的前缀
    pub key_prefix: String,
    /// 消费组名称
    pub group: String,
    /// 消费者名称，缺省时自动生成
    pub consumer: Option<String>,
    pub poll_interval_ms: u64,
    pub batch_size: usize,
    /// 待确认消息被认领前的空闲时间（毫秒）
    pub claim_idle_ms: u64,
    pub channels: ChannelSettings,
}

/// 通道名称
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSettings {
    pub initial: String,
    pub priority: String,
    pub revisit: String,
    pub dead_letter: String,
    pub results: Vec<String>,
}

/// 重试分层配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub tier_threshold: u32,
    pub short_tier: String,
    pub short_delay_secs: u64,
    pub long_tier: String,
    pub long_delay_secs: u64,
    /// 准入竞争最多延后的次数
    pub max_deferrals: u32,
    pub deferral_delay_ms: u64,
    /// 重试调度器轮询间隔（毫秒）
    pub promote_interval_ms: u64,
    pub promote_batch: usize,
}

/// 爬取范围配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlScopeSettings {
    pub max_depth: u32,
    pub same_origin_only: bool,
    pub include_raw_html: bool,
    pub respect_robots: bool,
    pub user_agent: String,
}

/// 准入控制配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionSettings {
    /// 每个源的默认并发上限
    pub per_origin_limit: u32,
    /// 按源覆盖的并发上限
    #[serde(default)]
    pub overrides: HashMap<String, u32>,
    /// 槽位租约有效期（秒）
    pub lease_ttl_secs: u64,
    pub wait_attempts: u32,
    pub wait_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupSettings {
    pub inflight_ttl_secs: u64,
}

/// 抓取配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSettings {
    pub navigation_timeout_secs: u64,
    pub max_nav_retries: u32,
    pub backoff_base_ms: u64,
    /// 先用静态抓取，失败或正文为空时再渲染
    pub static_first: bool,
    pub rendering_enabled: bool,
    /// 远程Chrome调试地址
    pub chromium_remote_url: Option<String>,
    #[serde(default)]
    pub include_selectors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    /// 每个进程同时处理的任务数
    pub concurrency: usize,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default.toml`、`config/{APP_ENVIRONMENT}.toml`
    /// 和 `CRAWLMESH__` 前缀的环境变量，最后做一致性检查。
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("CRAWLMESH")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("frontier.channels.results")
                    .with_list_parse_key("fetch.include_selectors")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 只使用内置默认值
    pub fn defaults() -> Result<Self, ConfigError> {
        let settings: Settings = Self::with_defaults(Config::builder())?
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            // Frontier
            .set_default("frontier.backend", "stream")?
            .set_default("frontier.key_prefix", "crawlmesh")?
            .set_default("frontier.group", "crawlers")?
            .set_default("frontier.poll_interval_ms", 500)?
            .set_default("frontier.batch_size", 10)?
            .set_default("frontier.claim_idle_ms", 300_000)?
            .set_default("frontier.channels.initial", "frontier.initial")?
            .set_default("frontier.channels.priority", "frontier.priority")?
            .set_default("frontier.channels.revisit", "frontier.revisit")?
            .set_default("frontier.channels.dead_letter", "frontier.dlq")?
            .set_default("frontier.channels.results", vec!["frontier.results"])?
            // Retry tiers
            .set_default("retry.max_attempts", 5)?
            .set_default("retry.tier_threshold", 3)?
            .set_default("retry.short_tier", "frontier.retry.short")?
            .set_default("retry.short_delay_secs", 30)?
            .set_default("retry.long_tier", "frontier.retry.long")?
            .set_default("retry.long_delay_secs", 300)?
            .set_default("retry.max_deferrals", 20)?
            .set_default("retry.deferral_delay_ms", 2000)?
            .set_default("retry.promote_interval_ms", 1000)?
            .set_default("retry.promote_batch", 100)?
            // Crawl scope
            .set_default("crawl.max_depth", 3)?
            .set_default("crawl.same_origin_only", true)?
            .set_default("crawl.include_raw_html", false)?
            .set_default("crawl.respect_robots", true)?
            .set_default("crawl.user_agent", "crawlmesh-bot/0.1")?
            // Admission
            .set_default("admission.per_origin_limit", 4)?
            .set_default("admission.lease_ttl_secs", 300)?
            .set_default("admission.wait_attempts", 3)?
            .set_default("admission.wait_interval_ms", 250)?
            // Dedup
            .set_default("dedup.inflight_ttl_secs", 240)?
            // Fetch
            .set_default("fetch.navigation_timeout_secs", 30)?
            .set_default("fetch.max_nav_retries", 2)?
            .set_default("fetch.backoff_base_ms", 500)?
            .set_default("fetch.static_first", true)?
            .set_default("fetch.rendering_enabled", false)?
            // Worker
            .set_default("worker.concurrency", 3)
    }

    /// 一致性检查，无效配置在启动时即失败
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend_kind()?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.admission.per_origin_limit == 0 {
            return Err(ConfigError::Message(
                "admission.per_origin_limit must be at least 1".to_string(),
            ));
        }
        if let Some((origin, _)) = self.admission.overrides.iter().find(|(_, limit)| **limit == 0) {
            return Err(ConfigError::Message(format!(
                "admission.overrides.{} must be at least 1",
                origin
            )));
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Message(
                "worker.concurrency must be at least 1".to_string(),
            ));
        }
        if !self.fetch.static_first && !self.fetch.rendering_enabled {
            return Err(ConfigError::Message(
                "at least one of fetch.static_first or fetch.rendering_enabled must be set"
                    .to_string(),
            ));
        }

        // 租约和在途标记必须撑过最慢的一次处理，
        // 在途标记必须在崩溃消息被重新认领之前过期
        let budget = self.task_budget();
        if self.lease_ttl() <= budget {
            return Err(ConfigError::Message(format!(
                "admission.lease_ttl_secs ({}s) must exceed the worst-case task time ({:?})",
                self.admission.lease_ttl_secs, budget
            )));
        }
        if self.inflight_ttl() <= budget {
            return Err(ConfigError::Message(format!(
                "dedup.inflight_ttl_secs ({}s) must exceed the worst-case task time ({:?})",
                self.dedup.inflight_ttl_secs, budget
            )));
        }
        if self.claim_idle() < self.inflight_ttl() {
            return Err(ConfigError::Message(format!(
                "frontier.claim_idle_ms ({}) must be at least dedup.inflight_ttl_secs ({}s)",
                self.frontier.claim_idle_ms, self.dedup.inflight_ttl_secs
            )));
        }
        Ok(())
    }

    /// 单个任务持有准入租约和在途标记的最长时间
    ///
    /// 准入轮询加上每个启用的抓取器的全部导航尝试与退避。
    pub fn task_budget(&self) -> Duration {
        let navigation = self.navigation();
        let policy = RetryPolicy::navigation(navigation.backoff_base, navigation.max_retries);
        let per_fetcher = navigation.timeout * (navigation.max_retries + 1)
            + (1..=navigation.max_retries)
                .map(|retry| policy.calculate_backoff(retry))
                .sum::<Duration>();
        let fetchers = u32::from(self.fetch.static_first) + u32::from(self.fetch.rendering_enabled);
        let admission_wait = Duration::from_millis(self.admission.wait_interval_ms)
            * self.admission.wait_attempts;

        per_fetcher * fetchers + admission_wait
    }

    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.frontier.backend.parse().map_err(ConfigError::Message)
    }

    /// 消费者按偏好顺序读取的通道
    pub fn consume_channels(&self) -> Vec<String> {
        let channels = &self.frontier.channels;
        vec![
            channels.revisit.clone(),
            channels.priority.clone(),
            channels.initial.clone(),
        ]
    }

    pub fn retry_policy(&self) -> RetryTierPolicy {
        RetryTierPolicy {
            max_attempts: self.retry.max_attempts,
            tier_threshold: self.retry.tier_threshold,
            short: RetryTier::new(
                self.retry.short_tier.as_str(),
                Duration::from_secs(self.retry.short_delay_secs),
            ),
            long: RetryTier::new(
                self.retry.long_tier.as_str(),
                Duration::from_secs(self.retry.long_delay_secs),
            ),
            max_deferrals: self.retry.max_deferrals,
            deferral_delay: Duration::from_millis(self.retry.deferral_delay_ms),
        }
    }

    pub fn bus_config(&self) -> FrontierBusConfig {
        FrontierBusConfig {
            dead_letter_channel: self.frontier.channels.dead_letter.clone(),
            poll_interval: Duration::from_millis(self.frontier.poll_interval_ms),
            batch_size: self.frontier.batch_size,
            retry: self.retry_policy(),
        }
    }

    pub fn origin_limits(&self) -> OriginLimits {
        self.admission
            .overrides
            .iter()
            .fold(OriginLimits::new(self.admission.per_origin_limit), |limits, (origin, limit)| {
                limits.with_override(origin.as_str(), *limit)
            })
    }

    pub fn navigation(&self) -> NavigationConfig {
        NavigationConfig {
            user_agent: self.crawl.user_agent.clone(),
            timeout: Duration::from_secs(self.fetch.navigation_timeout_secs),
            max_retries: self.fetch.max_nav_retries,
            backoff_base: Duration::from_millis(self.fetch.backoff_base_ms),
        }
    }

    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            max_depth: self.crawl.max_depth,
            same_origin_only: self.crawl.same_origin_only,
            include_raw_html: self.crawl.include_raw_html,
            child_channel: self.frontier.channels.initial.clone(),
            result_channels: self.frontier.channels.results.clone(),
            admission_wait_attempts: self.admission.wait_attempts,
            admission_wait_interval: Duration::from_millis(self.admission.wait_interval_ms),
        }
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.admission.lease_ttl_secs)
    }

    pub fn inflight_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup.inflight_ttl_secs)
    }

    pub fn claim_idle(&self) -> Duration {
        Duration::from_millis(self.frontier.claim_idle_ms)
    }

    pub fn promote_interval(&self) -> Duration {
        Duration::from_millis(self.retry.promote_interval_ms)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod settings_test;
