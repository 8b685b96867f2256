// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_histogram};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化日志
///
/// 过滤规则取自 `RUST_LOG`，`LOG_FORMAT=json` 时输出结构化JSON日志。
pub fn init_telemetry() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,crawlmesh=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// 注册指标说明
///
/// 只描述指标，不安装导出器；由宿主进程决定是否安装记录器。
pub fn describe_metrics() {
    describe_counter!(
        "crawler_pages_processed_total",
        "Total number of pages fetched and published"
    );
    describe_counter!(
        "crawler_pages_failed_total",
        "Total number of tasks that ended without a published result"
    );
    describe_counter!(
        "crawler_links_enqueued_total",
        "Total number of child tasks enqueued from discovered links"
    );
    describe_counter!(
        "frontier_messages_settled_total",
        "Total number of deliveries settled by the frontier bus"
    );
    describe_histogram!(
        "crawler_fetch_duration_seconds",
        "Duration of page fetches in seconds"
    );
}
