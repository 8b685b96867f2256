// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::services::admission_service::{
    AdmissionController, AdmissionError, OriginLimits, SlotLease,
};
use crate::infrastructure::cache::redis_client::RedisClient;

// 时间取自Redis服务器，各进程的时钟偏差不会误清理存活的租约
const ACQUIRE_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local ttl = tonumber(ARGV[2])
    local token = ARGV[3]
    local time = redis.call("TIME")
    local now = tonumber(time[1]) * 1000 + math.floor(tonumber(time[2]) / 1000)

    -- 清理过期的租约
    redis.call("ZREMRANGEBYSCORE", key, 0, now - ttl)

    local current = redis.call("ZCARD", key)
    if current < limit then
        redis.call("ZADD", key, now, token)
        redis.call("PEXPIRE", key, ttl * 2)
        return 1
    else
        return 0
    end
"#;

const IN_FLIGHT_SCRIPT: &str = r#"
    local key = KEYS[1]
    local ttl = tonumber(ARGV[1])
    local time = redis.call("TIME")
    local now = tonumber(time[1]) * 1000 + math.floor(tonumber(time[2]) / 1000)

    redis.call("ZREMRANGEBYSCORE", key, 0, now - ttl)
    return redis.call("ZCARD", key)
"#;

/// 基于Redis有序集合的分布式准入控制
///
/// 每个源一个有序集合，成员为租约令牌、分值为获取时的服务器时间（毫秒）。
/// 超过 `lease_ttl` 的租约视为持有者已崩溃，在下一次获取时被清理；
/// `lease_ttl` 必须大于单个任务的最长处理时间，启动时由配置校验保证。
pub struct RedisAdmissionController {
    redis: RedisClient,
    key_prefix: String,
    limits: OriginLimits,
    lease_ttl: Duration,
}

impl RedisAdmissionController {
    pub fn new(
        redis: RedisClient,
        key_prefix: impl Into<String>,
        limits: OriginLimits,
        lease_ttl: Duration,
    ) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
            limits,
            lease_ttl,
        }
    }

    /// 构建源的信号量键
    fn slot_key(&self, origin: &str) -> String {
        format!("{}:admission:{}", self.key_prefix, origin)
    }

    fn lease_ttl_ms(&self) -> i64 {
        self.lease_ttl.as_millis().max(1) as i64
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, AdmissionError> {
        Ok(self.redis.get_connection().await?)
    }
}

#[async_trait]
impl AdmissionController for RedisAdmissionController {
    async fn try_acquire(&self, origin: &str) -> Result<Option<SlotLease>, AdmissionError> {
        let mut conn = self.conn().await?;
        let token = Uuid::new_v4().to_string();

        let acquired: i64 = redis::Script::new(ACQUIRE_SCRIPT)
            .key(self.slot_key(origin))
            .arg(self.limits.limit_for(origin))
            .arg(self.lease_ttl_ms())
            .arg(&token)
            .invoke_async(&mut conn)
            .await?;

        if acquired == 1 {
            Ok(Some(SlotLease {
                origin: origin.to_string(),
                token,
            }))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, lease: &SlotLease) -> Result<(), AdmissionError> {
        let mut conn = self.conn().await?;
        conn.zrem::<_, _, ()>(self.slot_key(&lease.origin), &lease.token)
            .await?;
        Ok(())
    }

    async fn in_flight(&self, origin: &str) -> Result<u32, AdmissionError> {
        let mut conn = self.conn().await?;
        let current: i64 = redis::Script::new(IN_FLIGHT_SCRIPT)
            .key(self.slot_key(origin))
            .arg(self.lease_ttl_ms())
            .invoke_async(&mut conn)
            .await?;
        Ok(current.max(0) as u32)
    }
}
