// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::fmt;

/// 去重集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DedupSet {
    /// 已入队过的URL，永久保留
    Seen,
    /// 正在处理中的URL，带TTL
    Inflight,
    /// 已发布内容的哈希
    ContentHash,
}

impl DedupSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupSet::Seen => "seen",
            DedupSet::Inflight => "inflight",
            DedupSet::ContentHash => "content_hash",
        }
    }
}

impl fmt::Display for DedupSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 去重存储错误类型
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("Redis连接错误: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 去重存储
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// 原子地"检查并插入"，新插入返回 true，已存在返回 false
    async fn add_if_absent(&self, set: DedupSet, key: &str) -> Result<bool, DedupError>;

    /// 移除成员，成员不存在时无操作
    async fn remove(&self, set: DedupSet, key: &str) -> Result<(), DedupError>;

    /// 记录近似指纹对应的URL，已有记录时保留首个URL
    async fn record_fingerprint(&self, fingerprint: &str, url: &str) -> Result<(), DedupError>;
}
