// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// 每个源的并发上限
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginLimits {
    /// 默认上限
    pub default_limit: u32,
    /// 按源覆盖的上限，键为 `scheme://host[:port]`
    #[serde(default)]
    pub overrides: HashMap<String, u32>,
}

impl OriginLimits {
    pub fn new(default_limit: u32) -> Self {
        Self {
            default_limit,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, origin: impl Into<String>, limit: u32) -> Self {
        self.overrides.insert(origin.into(), limit);
        self
    }

    /// 上限至少为 1，否则该源永远无法被抓取
    pub fn limit_for(&self, origin: &str) -> u32 {
        self.overrides
            .get(origin)
            .copied()
            .unwrap_or(self.default_limit)
            .max(1)
    }
}

/// 已获取的槽位租约
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotLease {
    pub origin: String,
    pub token: String,
}

/// 准入控制错误类型
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Redis连接错误: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("信号量已关闭: {0}")]
    Closed(String),

    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 按源的准入控制
///
/// `try_acquire` 对"检查计数并占用槽位"是原子的：同一时刻某个源的
/// 在途任务数不会超过其上限。获取失败时不等待，直接返回 `None`。
#[async_trait]
pub trait AdmissionController: Send + Sync {
    /// 尝试为源获取一个槽位
    async fn try_acquire(&self, origin: &str) -> Result<Option<SlotLease>, AdmissionError>;

    /// 归还槽位，重复归还同一租约是无害的
    async fn release(&self, lease: &SlotLease) -> Result<(), AdmissionError>;

    /// 源当前的在途数量
    async fn in_flight(&self, origin: &str) -> Result<u32, AdmissionError>;
}

/// 槽位守卫
///
/// 显式调用 [`AdmissionPermit::release`] 归还槽位；若守卫在未归还的情况下被丢弃
/// （例如任务被取消），在当前运行时上异步归还。
pub struct AdmissionPermit {
    controller: Arc<dyn AdmissionController>,
    lease: Option<SlotLease>,
}

impl AdmissionPermit {
    pub async fn try_acquire(
        controller: Arc<dyn AdmissionController>,
        origin: &str,
    ) -> Result<Option<Self>, AdmissionError> {
        let lease = controller.try_acquire(origin).await?;
        Ok(lease.map(|lease| Self {
            controller,
            lease: Some(lease),
        }))
    }

    pub fn lease(&self) -> Option<&SlotLease> {
        self.lease.as_ref()
    }

    pub async fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            if let Err(e) = self.controller.release(&lease).await {
                warn!(origin = %lease.origin, "Failed to release admission slot: {}", e);
            }
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let controller = Arc::clone(&self.controller);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = controller.release(&lease).await {
                        warn!(origin = %lease.origin, "Failed to release admission slot: {}", e);
                    }
                });
            }
            Err(_) => {
                warn!(origin = %lease.origin, "No runtime to release admission slot, lease will expire");
            }
        }
    }
}
