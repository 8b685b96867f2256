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

use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use validator::Validate;

use crate::domain::models::task::{CrawlTask, Priority};
use crate::domain::services::dedup_service::{DedupError, DedupSet, DedupStore};
use crate::queue::backend::QueueError;
use crate::queue::frontier_bus::FrontierBus;
use crate::utils::url_utils;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Dedup error: {0}")]
    Dedup(#[from] DedupError),
}

/// 种子注入统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// 新入队的任务数
    pub enqueued: usize,
    /// 已见过而跳过的URL数
    pub skipped: usize,
    /// 无法解析或协议不支持的URL数
    pub invalid: usize,
}

/// 种子注入用例
///
/// 规范化种子URL，经 Seen 集合去重后以深度 0 入队。
/// 高优先级种子写入 priority 通道，其余写入 initial 通道。
pub struct SeedFrontierUseCase {
    bus: Arc<FrontierBus>,
    dedup: Arc<dyn DedupStore>,
    initial_channel: String,
    priority_channel: String,
}

impl SeedFrontierUseCase {
    pub fn new(
        bus: Arc<FrontierBus>,
        dedup: Arc<dyn DedupStore>,
        initial_channel: impl Into<String>,
        priority_channel: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            dedup,
            initial_channel: initial_channel.into(),
            priority_channel: priority_channel.into(),
        }
    }

    pub async fn execute<S: AsRef<str>>(
        &self,
        urls: &[S],
        priority: Priority,
    ) -> Result<SeedReport, SeedError> {
        let channel = match priority {
            Priority::High => &self.priority_channel,
            Priority::Normal => &self.initial_channel,
        };
        let mut report = SeedReport::default();

        for raw in urls {
            let raw = raw.as_ref().trim();
            let url = match url_utils::canonicalize_url(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => url.to_string(),
                _ => {
                    warn!("Skipping invalid seed URL: {}", raw);
                    report.invalid += 1;
                    continue;
                }
            };

            let task = CrawlTask::new(url, 0).with_priority(priority);
            if task.validate().is_err() {
                warn!("Skipping invalid seed URL: {}", raw);
                report.invalid += 1;
                continue;
            }

            if !self.dedup.add_if_absent(DedupSet::Seen, &task.url).await? {
                report.skipped += 1;
                continue;
            }

            if let Err(e) = self.bus.enqueue(channel, &task).await {
                self.dedup.remove(DedupSet::Seen, &task.url).await?;
                return Err(e.into());
            }
            report.enqueued += 1;
        }

        info!(
            channel = %channel,
            enqueued = report.enqueued,
            skipped = report.skipped,
            invalid = report.invalid,
            "Frontier seeded"
        );
        Ok(report)
    }
}
