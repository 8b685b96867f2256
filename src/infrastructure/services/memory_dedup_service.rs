// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::domain::services::dedup_service::{DedupError, DedupSet, DedupStore};

/// 进程内去重存储
///
/// Inflight 没有TTL：进程退出即清空，不存在崩溃后残留的问题。
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    seen: DashSet<String>,
    inflight: DashSet<String>,
    content_hashes: DashSet<String>,
    fingerprints: DashMap<String, String>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, set: DedupSet) -> &DashSet<String> {
        match set {
            DedupSet::Seen => &self.seen,
            DedupSet::Inflight => &self.inflight,
            DedupSet::ContentHash => &self.content_hashes,
        }
    }

    pub fn contains(&self, set: DedupSet, key: &str) -> bool {
        self.set(set).contains(key)
    }

    pub fn len(&self, set: DedupSet) -> usize {
        self.set(set).len()
    }

    pub fn is_empty(&self, set: DedupSet) -> bool {
        self.set(set).is_empty()
    }

    pub fn fingerprint_owner(&self, fingerprint: &str) -> Option<String> {
        self.fingerprints.get(fingerprint).map(|url| url.clone())
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn add_if_absent(&self, set: DedupSet, key: &str) -> Result<bool, DedupError> {
        Ok(self.set(set).insert(key.to_string()))
    }

    async fn remove(&self, set: DedupSet, key: &str) -> Result<(), DedupError> {
        self.set(set).remove(key);
        Ok(())
    }

    async fn record_fingerprint(&self, fingerprint: &str, url: &str) -> Result<(), DedupError> {
        self.fingerprints
            .entry(fingerprint.to_string())
            .or_insert_with(|| url.to_string());
        Ok(())
    }
}
