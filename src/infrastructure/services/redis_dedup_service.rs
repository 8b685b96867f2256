// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

use crate::domain::services::dedup_service::{DedupError, DedupSet, DedupStore};
use crate::infrastructure::cache::redis_client::RedisClient;

/// 基于Redis的去重存储
///
/// - Seen / ContentHash：集合，`SADD` 的返回值即"是否新插入"
/// - Inflight：每个URL一个带TTL的键，`SET NX EX` 保证原子性和崩溃后自动过期
/// - 指纹：哈希表 fingerprint -> 首个URL
pub struct RedisDedupStore {
    redis: RedisClient,
    key_prefix: String,
    inflight_ttl: Duration,
}

impl RedisDedupStore {
    pub fn new(redis: RedisClient, key_prefix: impl Into<String>, inflight_ttl: Duration) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
            inflight_ttl,
        }
    }

    fn set_key(&self, set: DedupSet) -> String {
        format!("{}:{}", self.key_prefix, set.as_str())
    }

    fn inflight_key(&self, url: &str) -> String {
        format!("{}:inflight:{}", self.key_prefix, url)
    }

    fn fingerprint_key(&self) -> String {
        format!("{}:fingerprints", self.key_prefix)
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, DedupError> {
        Ok(self.redis.get_connection().await?)
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn add_if_absent(&self, set: DedupSet, key: &str) -> Result<bool, DedupError> {
        let mut conn = self.conn().await?;
        match set {
            DedupSet::Inflight => {
                let reply: Option<String> = redis::cmd("SET")
                    .arg(self.inflight_key(key))
                    .arg(1)
                    .arg("NX")
                    .arg("EX")
                    .arg(self.inflight_ttl.as_secs().max(1))
                    .query_async(&mut conn)
                    .await?;
                Ok(reply.is_some())
            }
            DedupSet::Seen | DedupSet::ContentHash => {
                let added: i64 = conn.sadd(self.set_key(set), key).await?;
                Ok(added == 1)
            }
        }
    }

    async fn remove(&self, set: DedupSet, key: &str) -> Result<(), DedupError> {
        let mut conn = self.conn().await?;
        match set {
            DedupSet::Inflight => conn.del::<_, ()>(self.inflight_key(key)).await?,
            DedupSet::Seen | DedupSet::ContentHash => {
                conn.srem::<_, _, ()>(self.set_key(set), key).await?
            }
        }
        Ok(())
    }

    async fn record_fingerprint(&self, fingerprint: &str, url: &str) -> Result<(), DedupError> {
        let mut conn = self.conn().await?;
        conn.hset_nx::<_, _, _, ()>(self.fingerprint_key(), fingerprint, url)
            .await?;
        Ok(())
    }
}
