// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{bail, Context};
use crawlmesh::application::bootstrap;
use crawlmesh::application::use_cases::seed_frontier::SeedFrontierUseCase;
use crawlmesh::config::settings::Settings;
use crawlmesh::domain::models::task::Priority;
use crawlmesh::queue::backend::BackendKind;
use crawlmesh::utils::telemetry;
use tracing::info;

/// 种子注入
///
/// 从 `CRAWLMESH_SEED_URLS`（逗号分隔）读取种子，按 `CRAWLMESH_SEED_PRIORITY`
/// 写入 initial 或 priority 通道后退出。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_telemetry();

    let settings = Settings::new()?;
    if settings.backend_kind()? == BackendKind::Memory {
        bail!("the memory backend is process-local; seed a Redis-backed frontier instead");
    }

    let urls: Vec<String> = std::env::var("CRAWLMESH_SEED_URLS")
        .context("CRAWLMESH_SEED_URLS is not set")?
        .split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        bail!("CRAWLMESH_SEED_URLS contains no URLs");
    }

    let priority: Priority = match std::env::var("CRAWLMESH_SEED_PRIORITY") {
        Ok(value) => value.parse().map_err(anyhow::Error::msg)?,
        Err(_) => Priority::Normal,
    };

    let frontier = bootstrap::build_frontier(&settings).await?;
    let use_case = SeedFrontierUseCase::new(
        frontier.bus,
        frontier.dedup,
        settings.frontier.channels.initial.as_str(),
        settings.frontier.channels.priority.as_str(),
    );

    let report = use_case.execute(&urls, priority).await?;
    info!(
        "Seeding finished: {} enqueued, {} already seen, {} invalid",
        report.enqueued, report.skipped, report.invalid
    );
    Ok(())
}
