// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use uuid::Uuid;

use super::backend::{BackendKind, DelayedMessage, DeliveryGuarantee, QueueBackend, QueueError};
use crate::domain::models::envelope::{DeliveryEnvelope, WireMessage};
use crate::infrastructure::cache::redis_client::RedisClient;

/// 到期消息移回源列表
///
/// 目标通道取自消息本身，未在 KEYS 中声明：只适用于单节点Redis，
/// 集群部署需要让所有通道和重试层共享同一个 hash tag（如 `{frontier}.initial`）。
const PROMOTE_SCRIPT: &str = r#"
    local due = redis.call("ZRANGEBYSCORE", KEYS[1], "-inf", ARGV[1], "LIMIT", 0, tonumber(ARGV[2]))
    for _, raw in ipairs(due) do
        redis.call("ZREM", KEYS[1], raw)
        local entry = cjson.decode(raw)
        redis.call("LPUSH", entry["target"], cjson.encode(entry["message"]))
    end
    return #due
"#;

/// Redis 列表后端（SimpleQueue）
///
/// 生产者 `LPUSH`，消费者 `RPOP`，先进先出。消息在取出时即被删除，
/// 处理中崩溃的消息不会被重新投递，确认是空操作。
pub struct RedisListBackend {
    redis: RedisClient,
}

impl RedisListBackend {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl QueueBackend for RedisListBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SimpleQueue
    }

    fn guarantee(&self) -> DeliveryGuarantee {
        DeliveryGuarantee::BestEffort
    }

    async fn prepare(&self, _channels: &[String], _group: &str) -> Result<(), QueueError> {
        Ok(())
    }

    async fn push(&self, channel: &str, message: WireMessage) -> Result<(), QueueError> {
        let mut conn = self.redis.get_connection().await?;
        conn.lpush::<_, _, ()>(channel, message.encode()?).await?;
        Ok(())
    }

    async fn fetch(
        &self,
        channels: &[String],
        _group: &str,
        _consumer: &str,
        max: usize,
    ) -> Result<Vec<DeliveryEnvelope>, QueueError> {
        let mut conn = self.redis.get_connection().await?;
        let mut batch = Vec::new();
        for channel in channels {
            while batch.len() < max {
                let raw: Option<String> = conn.rpop(channel, None).await?;
                let Some(raw) = raw else {
                    break;
                };
                batch.push(DeliveryEnvelope::from_wire(
                    Uuid::new_v4().to_string(),
                    channel.clone(),
                    WireMessage::decode(&raw),
                ));
            }
        }
        Ok(batch)
    }

    async fn ack(&self, _envelope: &DeliveryEnvelope, _group: &str) -> Result<(), QueueError> {
        Ok(())
    }

    async fn schedule(
        &self,
        tier: &str,
        delayed: DelayedMessage,
        due: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        let mut conn = self.redis.get_connection().await?;
        let member = serde_json::to_string(&delayed)?;
        conn.zadd::<_, _, _, ()>(tier, member, due.timestamp_millis())
            .await?;
        Ok(())
    }

    async fn promote_due(
        &self,
        tier: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, QueueError> {
        let mut conn = self.redis.get_connection().await?;
        let moved: i64 = redis::Script::new(PROMOTE_SCRIPT)
            .key(tier)
            .arg(now.timestamp_millis())
            .arg(limit)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved.max(0) as usize)
    }

    async fn depth(&self, channel: &str) -> Result<u64, QueueError> {
        let mut conn = self.redis.get_connection().await?;
        let len: u64 = conn.llen(channel).await?;
        Ok(len)
    }
}
