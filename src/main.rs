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

use crawlmesh::application::bootstrap;
use crawlmesh::config::settings::Settings;
use crawlmesh::domain::services::schema_validator::VersionedSchemaValidator;
use crawlmesh::queue::frontier_bus::ConsumeOptions;
use crawlmesh::queue::scheduler::RetryScheduler;
use crawlmesh::utils::telemetry;
use crawlmesh::workers::crawl_worker::CrawlWorker;
use crawlmesh::workers::frontier_consumer::FrontierConsumer;
use crawlmesh::workers::manager::WorkerManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// 主函数
///
/// 工作进程入口：构造所有协作者，启动前沿消费者和重试调度器，
/// 收到 Ctrl-C 后停止拉取并等待在途任务结算
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    telemetry::describe_metrics();
    info!("Starting crawlmesh worker...");

    // 2. Load configuration
    let settings = Settings::new()?;
    info!("Configuration loaded");

    // 3. Frontier, dedup and admission
    let frontier = bootstrap::build_frontier(&settings).await?;

    // 4. Fetch engines and policy
    let fetcher = bootstrap::build_fetcher(&settings).await?;
    let policy = bootstrap::build_policy(&settings, frontier.redis.clone());

    let worker = Arc::new(CrawlWorker::new(
        frontier.bus.clone(),
        frontier.dedup.clone(),
        frontier.admission.clone(),
        fetcher,
        policy,
        Arc::new(VersionedSchemaValidator::new()),
        settings.crawl_settings(),
    ));

    let consumer = settings
        .frontier
        .consumer
        .clone()
        .unwrap_or_else(|| format!("crawler-{}", uuid::Uuid::new_v4()));
    let options = ConsumeOptions {
        channels: settings.consume_channels(),
        group: settings.frontier.group.clone(),
        consumer,
        concurrency: settings.worker.concurrency,
    };

    let retry_policy = settings.retry_policy();
    let scheduler = RetryScheduler::new(
        frontier.backend.clone(),
        retry_policy.tiers().iter().map(|t| t.name.clone()).collect(),
        settings.promote_interval(),
        settings.retry.promote_batch,
    );

    // 5. Start workers
    let mut manager = WorkerManager::new(Duration::from_secs(
        settings.fetch.navigation_timeout_secs * 2,
    ));
    manager.register(Arc::new(FrontierConsumer::new(
        frontier.bus.clone(),
        options,
        worker,
    )));
    manager.register(Arc::new(scheduler));
    manager.start_workers();
    info!("Workers started");

    // 6. Wait for shutdown
    manager.wait_for_shutdown().await;
    Ok(())
}
