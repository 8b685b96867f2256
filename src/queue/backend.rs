// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::models::envelope::{DeliveryEnvelope, WireMessage};

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 消息不存在或已被确认
    #[error("Unknown delivery: {0}")]
    UnknownDelivery(String),

    /// 消费者已关闭
    #[error("Consumer closed")]
    Closed,
}

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Redis 列表：取出即删除
    SimpleQueue,
    /// Redis Streams + 消费组：显式确认
    GroupedStream,
    /// 进程内队列
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BackendKind::SimpleQueue => write!(f, "list"),
            BackendKind::GroupedStream => write!(f, "stream"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "list" | "simple_queue" => Ok(BackendKind::SimpleQueue),
            "stream" | "grouped_stream" => Ok(BackendKind::GroupedStream),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("Invalid frontier backend: {}", other)),
        }
    }
}

/// 投递保证
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryGuarantee {
    /// 取出即从队列删除，处理中崩溃会丢消息
    BestEffort,
    /// 处理完成后确认，未确认的消息会被重新投递
    AtLeastOnce,
}

/// 延迟重投的消息，到期后回到 `target` 通道
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedMessage {
    /// 保证同内容的两条延迟消息在有序集合中不会合并
    pub id: String,
    pub target: String,
    pub message: WireMessage,
}

impl DelayedMessage {
    pub fn new(target: impl Into<String>, message: WireMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            message,
        }
    }
}

/// 队列后端
///
/// 对 FrontierBus 暴露统一的推送、拉取、确认和延迟调度能力。
#[async_trait]
pub trait QueueBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn guarantee(&self) -> DeliveryGuarantee;

    /// 消费前的准备工作（如创建消费组），必须幂等
    async fn prepare(&self, channels: &[String], group: &str) -> Result<(), QueueError>;

    async fn push(&self, channel: &str, message: WireMessage) -> Result<(), QueueError>;

    /// 按 `channels` 的顺序拉取，最多 `max` 条，不阻塞
    async fn fetch(
        &self,
        channels: &[String],
        group: &str,
        consumer: &str,
        max: usize,
    ) -> Result<Vec<DeliveryEnvelope>, QueueError>;

    async fn ack(&self, envelope: &DeliveryEnvelope, group: &str) -> Result<(), QueueError>;

    /// 把消息放入延迟层，`due` 之后才会被重新投递
    async fn schedule(
        &self,
        tier: &str,
        delayed: DelayedMessage,
        due: DateTime<Utc>,
    ) -> Result<(), QueueError>;

    /// 把延迟层中已到期的消息原子地移回各自的源通道，返回移动条数
    async fn promote_due(
        &self,
        tier: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, QueueError>;

    /// 通道中的消息数
    async fn depth(&self, channel: &str) -> Result<u64, QueueError>;
}
