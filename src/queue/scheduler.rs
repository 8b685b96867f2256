// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info};

use super::backend::{QueueBackend, QueueError};
use crate::utils::errors::WorkerError;
use crate::workers::Worker;

/// 重试调度器
///
/// 周期性地把各重试层中到期的消息移回源通道，`attempts` 保持不变。
pub struct RetryScheduler {
    backend: Arc<dyn QueueBackend>,
    tiers: Vec<String>,
    interval: Duration,
    batch: usize,
}

impl RetryScheduler {
    /// 创建新的重试调度器实例
    ///
    /// # 参数
    ///
    /// * `backend` - 队列后端
    /// * `tiers` - 需要轮询的重试层
    /// * `interval` - 轮询间隔
    /// * `batch` - 每层每次最多移动的消息数
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        tiers: Vec<String>,
        interval: Duration,
        batch: usize,
    ) -> Self {
        Self {
            backend,
            tiers,
            interval,
            batch: batch.max(1),
        }
    }

    /// 执行一轮提升，返回移动的消息总数
    pub async fn promote_due(&self) -> Result<usize, QueueError> {
        let now = Utc::now();
        let mut total = 0;
        for tier in &self.tiers {
            let moved = self.backend.promote_due(tier, now, self.batch).await?;
            if moved > 0 {
                debug!(tier = %tier, moved, "Promoted due retries");
            }
            total += moved;
        }
        Ok(total)
    }
}

#[async_trait]
impl Worker for RetryScheduler {
    async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        info!(tiers = ?self.tiers, interval_ms = self.interval.as_millis() as u64, "Retry scheduler started");
        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.promote_due().await {
                        error!("Failed to promote due retries: {}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }

        info!("Retry scheduler stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "retry-scheduler"
    }
}
