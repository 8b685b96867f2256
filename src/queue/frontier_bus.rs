// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use metrics::counter;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

use super::backend::{DelayedMessage, QueueBackend, QueueError};
use super::retry_tiers::{RetryTierPolicy, SettleAction};
use crate::domain::models::delivery_state::DeliveryState;
use crate::domain::models::envelope::{DeliveryEnvelope, WireMessage};
use crate::domain::models::outcome::{HandlerOutcome, OutcomeReason};
use crate::domain::models::task::CrawlTask;

/// 投递处理器
///
/// 返回值决定消息的去向：ok 确认、retry 进入重试层、dlq 进入死信通道。
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, envelope: &DeliveryEnvelope) -> HandlerOutcome;
}

/// 消费参数
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    /// 按优先级从高到低排列的通道
    pub channels: Vec<String>,
    pub group: String,
    pub consumer: String,
    /// 同时处理的最大投递数
    pub concurrency: usize,
}

/// 总线配置
#[derive(Debug, Clone)]
pub struct FrontierBusConfig {
    pub dead_letter_channel: String,
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub retry: RetryTierPolicy,
}

impl Default for FrontierBusConfig {
    fn default() -> Self {
        Self {
            dead_letter_channel: "frontier.dlq".to_string(),
            poll_interval: Duration::from_millis(500),
            batch_size: 10,
            retry: RetryTierPolicy::default(),
        }
    }
}

/// 前沿消息总线
///
/// 在具体队列后端之上提供统一的入队、发布、消费和结算语义。
/// 每次投递恰好结算一次：先把消息推到下一个去处（重试层或死信通道），
/// 再确认原投递，中途失败时原投递保持未确认，由后端决定是否重投。
pub struct FrontierBus {
    backend: Arc<dyn QueueBackend>,
    config: FrontierBusConfig,
}

impl FrontierBus {
    pub fn new(backend: Arc<dyn QueueBackend>, config: FrontierBusConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }

    pub fn retry_policy(&self) -> &RetryTierPolicy {
        &self.config.retry
    }

    pub fn dead_letter_channel(&self) -> &str {
        &self.config.dead_letter_channel
    }

    /// 入队爬取任务，路由键为任务的源
    pub async fn enqueue(&self, channel: &str, task: &CrawlTask) -> Result<(), QueueError> {
        let message = WireMessage::new(task.to_payload()?, task.origin());
        self.backend.push(channel, message).await?;
        debug!(channel = %channel, url = %task.url, depth = task.depth, "Task enqueued");
        Ok(())
    }

    /// 发布任意可序列化的消息
    pub async fn publish<T: Serialize + Sync>(
        &self,
        channel: &str,
        payload: &T,
        routing_key: Option<&str>,
    ) -> Result<(), QueueError> {
        let message = WireMessage::new(
            serde_json::to_string(payload)?,
            routing_key.map(str::to_string),
        );
        self.backend.push(channel, message).await
    }

    /// 持续消费直到 `shutdown` 变为 true
    ///
    /// 每条投递在独立任务中处理，并发数由信号量限制。处理器 panic 会被
    /// 捕获并按 retry(exception) 结算。关闭时停止拉取并等待在途投递结算完毕。
    pub async fn consume(
        self: &Arc<Self>,
        options: ConsumeOptions,
        handler: Arc<dyn DeliveryHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), QueueError> {
        let concurrency = options.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        self.backend
            .prepare(&options.channels, &options.group)
            .await?;

        info!(
            channels = ?options.channels,
            group = %options.group,
            consumer = %options.consumer,
            concurrency,
            backend = %self.backend.kind(),
            "Frontier consumer started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let available = semaphore.available_permits();
            if available == 0 {
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        drop(permit);
                        continue;
                    }
                    _ = shutdown.changed() => break,
                }
            }

            let max = available.min(self.config.batch_size.max(1));
            let batch = match self
                .backend
                .fetch(&options.channels, &options.group, &options.consumer, max)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    error!("Failed to fetch from frontier: {}", e);
                    Vec::new()
                }
            };

            if batch.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => continue,
                    _ = shutdown.changed() => break,
                }
            }

            for envelope in batch {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| QueueError::Closed)?;
                let bus = Arc::clone(self);
                let handler = Arc::clone(&handler);
                let group = options.group.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = bus.dispatch(envelope, &group, handler.as_ref()).await {
                        error!("Failed to settle delivery: {}", e);
                    }
                });
            }
        }

        info!("Frontier consumer stopping, waiting for in-flight deliveries");
        let _drained = semaphore.acquire_many(concurrency as u32).await;
        info!("Frontier consumer stopped");
        Ok(())
    }

    /// 处理并结算单条投递
    pub async fn dispatch(
        &self,
        envelope: DeliveryEnvelope,
        group: &str,
        handler: &dyn DeliveryHandler,
    ) -> Result<DeliveryState, QueueError> {
        let outcome = match AssertUnwindSafe(handler.handle(&envelope))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(channel = %envelope.channel, "Delivery handler panicked: {}", message);
                HandlerOutcome::retry(OutcomeReason::Exception(message))
            }
        };
        self.settle(&envelope, group, &outcome).await
    }

    /// 按处理结果结算投递
    pub async fn settle(
        &self,
        envelope: &DeliveryEnvelope,
        group: &str,
        outcome: &HandlerOutcome,
    ) -> Result<DeliveryState, QueueError> {
        let settlement = self.config.retry.settle(envelope, outcome);

        match settlement.action {
            SettleAction::Ack => {}
            SettleAction::Delay {
                tier,
                delay,
                message,
            } => {
                let due = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                self.backend
                    .schedule(
                        &tier.name,
                        DelayedMessage::new(envelope.channel.clone(), message),
                        due,
                    )
                    .await?;
            }
            SettleAction::DeadLetter { message } => {
                warn!(
                    channel = %envelope.channel,
                    attempts = message.attempts,
                    reason = %outcome.reason,
                    "Delivery moved to dead letter channel"
                );
                self.backend
                    .push(&self.config.dead_letter_channel, message)
                    .await?;
            }
        }

        self.backend.ack(envelope, group).await?;
        counter!("frontier_messages_settled_total", "outcome" => outcome.outcome.as_str())
            .increment(1);
        debug!(
            channel = %envelope.channel,
            delivery_id = %envelope.delivery_id,
            state = %settlement.state,
            "Delivery settled"
        );
        Ok(settlement.state)
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
