// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

use super::backend::{BackendKind, DelayedMessage, DeliveryGuarantee, QueueBackend, QueueError};
use crate::domain::models::envelope::{DeliveryEnvelope, WireMessage};

#[derive(Default)]
struct MemoryState {
    channels: HashMap<String, VecDeque<WireMessage>>,
    unacked: HashMap<String, DeliveryEnvelope>,
    delayed: HashMap<String, Vec<(DateTime<Utc>, DelayedMessage)>>,
    acked: u64,
}

/// 进程内队列后端
///
/// 单进程开发和测试用。未确认的投递保存在内存中，可通过
/// [`InMemoryBackend::requeue_unacked`] 模拟消费者崩溃后的重新投递。
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通道中排队的消息（按出队顺序）
    pub fn messages(&self, channel: &str) -> Vec<WireMessage> {
        self.state
            .lock()
            .channels
            .get(channel)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 延迟层中的消息
    pub fn delayed(&self, tier: &str) -> Vec<DelayedMessage> {
        self.state
            .lock()
            .delayed
            .get(tier)
            .map(|entries| entries.iter().map(|(_, m)| m.clone()).collect())
            .unwrap_or_default()
    }

    pub fn unacked_len(&self) -> usize {
        self.state.lock().unacked.len()
    }

    pub fn acked_count(&self) -> u64 {
        self.state.lock().acked
    }

    /// 把所有未确认的投递放回各自通道队首
    pub fn requeue_unacked(&self) -> usize {
        let mut state = self.state.lock();
        let pending: Vec<DeliveryEnvelope> = state.unacked.drain().map(|(_, e)| e).collect();
        let count = pending.len();
        for envelope in pending {
            state
                .channels
                .entry(envelope.channel.clone())
                .or_default()
                .push_front(envelope.to_wire());
        }
        count
    }
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn guarantee(&self) -> DeliveryGuarantee {
        DeliveryGuarantee::BestEffort
    }

    async fn prepare(&self, _channels: &[String], _group: &str) -> Result<(), QueueError> {
        Ok(())
    }

    async fn push(&self, channel: &str, message: WireMessage) -> Result<(), QueueError> {
        self.state
            .lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .push_back(message);
        Ok(())
    }

    async fn fetch(
        &self,
        channels: &[String],
        _group: &str,
        _consumer: &str,
        max: usize,
    ) -> Result<Vec<DeliveryEnvelope>, QueueError> {
        let mut state = self.state.lock();
        let mut batch = Vec::new();
        for channel in channels {
            while batch.len() < max {
                let Some(message) = state.channels.get_mut(channel).and_then(|q| q.pop_front())
                else {
                    break;
                };
                let envelope =
                    DeliveryEnvelope::from_wire(Uuid::new_v4().to_string(), channel.clone(), message);
                state
                    .unacked
                    .insert(envelope.delivery_id.clone(), envelope.clone());
                batch.push(envelope);
            }
        }
        Ok(batch)
    }

    async fn ack(&self, envelope: &DeliveryEnvelope, _group: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.unacked.remove(&envelope.delivery_id).is_none() {
            return Err(QueueError::UnknownDelivery(envelope.delivery_id.clone()));
        }
        state.acked += 1;
        Ok(())
    }

    async fn schedule(
        &self,
        tier: &str,
        delayed: DelayedMessage,
        due: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        self.state
            .lock()
            .delayed
            .entry(tier.to_string())
            .or_default()
            .push((due, delayed));
        Ok(())
    }

    async fn promote_due(
        &self,
        tier: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<usize, QueueError> {
        let mut state = self.state.lock();
        let Some(entries) = state.delayed.get_mut(tier) else {
            return Ok(0);
        };
        entries.sort_by_key(|(due, _)| *due);
        let ready = entries
            .iter()
            .take(limit)
            .take_while(|(due, _)| *due <= now)
            .count();
        let promoted: Vec<DelayedMessage> = entries.drain(..ready).map(|(_, m)| m).collect();
        for delayed in promoted {
            state
                .channels
                .entry(delayed.target)
                .or_default()
                .push_back(delayed.message);
        }
        Ok(ready)
    }

    async fn depth(&self, channel: &str) -> Result<u64, QueueError> {
        Ok(self
            .state
            .lock()
            .channels
            .get(channel)
            .map(|q| q.len() as u64)
            .unwrap_or(0))
    }
}
