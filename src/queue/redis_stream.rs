// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::{BackendKind, DelayedMessage, DeliveryGuarantee, QueueBackend, QueueError};
use crate::domain::models::envelope::{DeliveryEnvelope, WireMessage};
use crate::infrastructure::cache::redis_client::RedisClient;

/// 到期消息重新追加到源流
///
/// 目标通道取自消息本身，未在 KEYS 中声明：只适用于单节点Redis，
/// 集群部署需要让所有通道和重试层共享同一个 hash tag（如 `{frontier}.initial`）。
const PROMOTE_SCRIPT: &str = r#"
    local due = redis.call("ZRANGEBYSCORE", KEYS[1], "-inf", ARGV[1], "LIMIT", 0, tonumber(ARGV[2]))
    for _, raw in ipairs(due) do
        redis.call("ZREM", KEYS[1], raw)
        local entry = cjson.decode(raw)
        local m = entry["message"]
        local key = m["key"]
        if key == nil or key == cjson.null then
            key = ""
        end
        redis.call("XADD", entry["target"], "*",
            "payload", m["payload"],
            "attempts", tostring(m["attempts"] or 0),
            "deferrals", tostring(m["deferrals"] or 0),
            "key", key)
    end
    return #due
"#;

/// Redis Streams 后端（GroupedStream）
///
/// 每个通道一个流，消费者通过消费组读取，处理完成后 `XACK`。
/// 空闲超过 `claim_idle` 的未确认条目会被其他消费者认领，
/// 因此崩溃的消费者不会丢消息（至少一次投递）。
pub struct RedisStreamBackend {
    redis: RedisClient,
    claim_idle: Duration,
}

impl RedisStreamBackend {
    pub fn new(redis: RedisClient, claim_idle: Duration) -> Self {
        Self { redis, claim_idle }
    }

    fn envelope(channel: &str, entry: &StreamId) -> DeliveryEnvelope {
        let number = |field: &str| -> u32 {
            entry
                .get::<String>(field)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)
        };
        let message = WireMessage {
            payload: entry.get::<String>("payload").unwrap_or_default(),
            attempts: number("attempts"),
            deferrals: number("deferrals"),
            key: entry.get::<String>("key").filter(|k| !k.is_empty()),
            last_error: entry.get::<String>("last_error"),
        };
        DeliveryEnvelope::from_wire(entry.id.clone(), channel, message)
    }

    /// 认领其他消费者遗留的超时未确认条目
    async fn reclaim(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        channel: &str,
        group: &str,
        consumer: &str,
        max: usize,
    ) -> Result<Vec<DeliveryEnvelope>, QueueError> {
        let pending: StreamPendingCountReply = conn
            .xpending_count(channel, group, "-", "+", max)
            .await?;
        let idle_ms = self.claim_idle.as_millis() as u64;
        let stale: Vec<String> = pending
            .ids
            .iter()
            .filter(|p| p.last_delivered_ms as u64 >= idle_ms)
            .map(|p| p.id.clone())
            .collect();
        if stale.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamClaimReply = conn
            .xclaim(channel, group, consumer, idle_ms, stale.as_slice())
            .await?;
        if !claimed.ids.is_empty() {
            info!(
                channel = %channel,
                count = claimed.ids.len(),
                "Reclaimed stale pending entries"
            );
        }
        Ok(claimed
            .ids
            .iter()
            .map(|entry| Self::envelope(channel, entry))
            .collect())
    }
}

#[async_trait]
impl QueueBackend for RedisStreamBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GroupedStream
    }

    fn guarantee(&self) -> DeliveryGuarantee {
        DeliveryGuarantee::AtLeastOnce
    }

    async fn prepare(&self, channels: &[String], group: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.get_connection().await?;
        for channel in channels {
            // "0" so entries added before the group existed are still delivered
            let created: redis::RedisResult<()> =
                conn.xgroup_create_mkstream(channel, group, "0").await;
            match created {
                Ok(()) => debug!(channel = %channel, group = %group, "Created consumer group"),
                Err(e) if e.to_string().contains("BUSYGROUP") => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn push(&self, channel: &str, message: WireMessage) -> Result<(), QueueError> {
        let mut conn = self.redis.get_connection().await?;
        let mut fields: Vec<(&str, String)> = vec![
            ("payload", message.payload),
            ("attempts", message.attempts.to_string()),
            ("deferrals", message.deferrals.to_string()),
            ("key", message.key.unwrap_or_default()),
        ];
        if let Some(error) = message.last_error {
            fields.push(("last_error", error));
        }
        conn.xadd::<_, _, _, _, ()>(channel, "*", fields.as_slice()).await?;
        Ok(())
    }

    async fn fetch(
        &self,
        channels: &[String],
        group: &str,
        consumer: &str,
        max: usize,
    ) -> Result<Vec<DeliveryEnvelope>, QueueError> {
        if channels.is_empty() || max == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.get_connection().await?;
        let mut batch = Vec::new();

        for channel in channels {
            if batch.len() >= max {
                break;
            }
            match self
                .reclaim(&mut conn, channel, group, consumer, max - batch.len())
                .await
            {
                Ok(claimed) => batch.extend(claimed),
                Err(e) => warn!(channel = %channel, "Failed to reclaim pending entries: {}", e),
            }
        }

        // one read per channel keeps the channel priority order
        for channel in channels {
            if batch.len() >= max {
                break;
            }
            let options = StreamReadOptions::default()
                .group(group, consumer)
                .count(max - batch.len());
            let reply: Option<StreamReadReply> = conn
                .xread_options(&[channel.as_str()], &[">"], &options)
                .await?;
            if let Some(reply) = reply {
                for key in reply.keys {
                    batch.extend(key.ids.iter().map(|entry| Self::envelope(&key.key, entry)));
                }
            }
        }

        Ok(batch)
    }

    async fn ack(&self, envelope: &DeliveryEnvelope, group: &str) -> Result<(), QueueError> {
        let mut conn = self.redis.get_connection().await?;
        conn.xack::<_, _, _, ()>(&envelope.channel, group, &[&envelope.delivery_id])
            .await?;
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
        let len: u64 = conn.xlen(channel).await?;
        Ok(len)
    }
}
