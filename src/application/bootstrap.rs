// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::settings::Settings;
use crate::domain::services::admission_service::AdmissionController;
use crate::domain::services::dedup_service::DedupStore;
use crate::engines::browser_engine::BrowserFetcher;
use crate::engines::extraction::PageExtractor;
use crate::engines::reqwest_engine::StaticFetcher;
use crate::engines::router::FetchRouter;
use crate::engines::traits::Fetcher;
use crate::infrastructure::cache::redis_client::RedisClient;
use crate::infrastructure::services::local_admission_service::LocalAdmissionController;
use crate::infrastructure::services::memory_dedup_service::InMemoryDedupStore;
use crate::infrastructure::services::redis_admission_service::RedisAdmissionController;
use crate::infrastructure::services::redis_dedup_service::RedisDedupStore;
use crate::queue::backend::{BackendKind, QueueBackend};
use crate::queue::frontier_bus::FrontierBus;
use crate::queue::memory::InMemoryBackend;
use crate::queue::redis_list::RedisListBackend;
use crate::queue::redis_stream::RedisStreamBackend;
use crate::utils::robots::{AllowAllPolicy, CrawlPolicy, RobotsPolicy};

/// 前沿协作者
///
/// 进程启动时构造一次，之后以 `Arc` 注入各个工作器。
pub struct Frontier {
    pub backend: Arc<dyn QueueBackend>,
    pub bus: Arc<FrontierBus>,
    pub dedup: Arc<dyn DedupStore>,
    pub admission: Arc<dyn AdmissionController>,
    /// 内存后端时为 None
    pub redis: Option<RedisClient>,
}

/// 按配置构造队列后端、总线、去重集合和准入控制器
///
/// 内存后端使用进程内实现，其余后端共享同一个Redis。
pub async fn build_frontier(settings: &Settings) -> Result<Frontier> {
    let kind = settings.backend_kind()?;

    let (backend, dedup, admission, redis): (
        Arc<dyn QueueBackend>,
        Arc<dyn DedupStore>,
        Arc<dyn AdmissionController>,
        Option<RedisClient>,
    ) = match kind {
        BackendKind::Memory => {
            let backend: Arc<dyn QueueBackend> = Arc::new(InMemoryBackend::new());
            let dedup: Arc<dyn DedupStore> = Arc::new(InMemoryDedupStore::new());
            let admission: Arc<dyn AdmissionController> =
                Arc::new(LocalAdmissionController::new(settings.origin_limits()));
            (backend, dedup, admission, None)
        }
        BackendKind::SimpleQueue | BackendKind::GroupedStream => {
            let redis = RedisClient::new(&settings.redis.url)
                .await
                .context("Failed to create Redis client")?;
            redis
                .ping()
                .await
                .with_context(|| format!("Redis is not reachable at {}", settings.redis.url))?;

            let backend: Arc<dyn QueueBackend> = if kind == BackendKind::GroupedStream {
                Arc::new(RedisStreamBackend::new(redis.clone(), settings.claim_idle()))
            } else {
                Arc::new(RedisListBackend::new(redis.clone()))
            };
            let prefix = settings.frontier.key_prefix.as_str();
            let dedup: Arc<dyn DedupStore> = Arc::new(RedisDedupStore::new(
                redis.clone(),
                prefix,
                settings.inflight_ttl(),
            ));
            let admission: Arc<dyn AdmissionController> = Arc::new(RedisAdmissionController::new(
                redis.clone(),
                prefix,
                settings.origin_limits(),
                settings.lease_ttl(),
            ));
            (backend, dedup, admission, Some(redis))
        }
    };

    info!(backend = %kind, guarantee = ?backend.guarantee(), "Frontier backend ready");
    let bus = Arc::new(FrontierBus::new(backend.clone(), settings.bus_config()));

    Ok(Frontier {
        backend,
        bus,
        dedup,
        admission,
        redis,
    })
}

/// 构造抓取器：静态优先，按需追加浏览器兜底
pub async fn build_fetcher(settings: &Settings) -> Result<Arc<dyn Fetcher>> {
    let navigation = settings.navigation();
    let extractor = Arc::new(
        PageExtractor::new(&settings.fetch.include_selectors)
            .context("Invalid fetch.include_selectors")?,
    );

    let mut fetchers: Vec<Arc<dyn Fetcher>> = Vec::new();
    if settings.fetch.static_first {
        fetchers.push(Arc::new(StaticFetcher::new(&navigation, extractor.clone())?));
    }
    if settings.fetch.rendering_enabled {
        let browser = BrowserFetcher::launch(
            &navigation,
            settings.fetch.chromium_remote_url.as_deref(),
            extractor,
        )
        .await?;
        fetchers.push(Arc::new(browser));
    }

    let router = FetchRouter::new(fetchers);
    info!(fetchers = ?router.fetcher_names(), "Fetch router ready");
    Ok(Arc::new(router))
}

/// 构造 robots 策略
pub fn build_policy(settings: &Settings, redis: Option<RedisClient>) -> Arc<dyn CrawlPolicy> {
    if settings.crawl.respect_robots {
        Arc::new(RobotsPolicy::new(settings.crawl.user_agent.as_str(), redis))
    } else {
        Arc::new(AllowAllPolicy)
    }
}
