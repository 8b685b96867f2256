// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

use crate::domain::models::delivery_state::DeliveryState;
use crate::domain::models::envelope::{DeliveryEnvelope, WireMessage};
use crate::domain::models::outcome::{HandlerOutcome, Outcome};

/// 重试层
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTier {
    pub name: String,
    pub delay: Duration,
}

impl RetryTier {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

/// 结算动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleAction {
    Ack,
    Delay {
        tier: RetryTier,
        delay: Duration,
        message: WireMessage,
    },
    DeadLetter {
        message: WireMessage,
    },
}

/// 一次结算的结果：新状态和要执行的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub state: DeliveryState,
    pub action: SettleAction,
}

/// 重试分层策略
///
/// 第 n 次重试（n 从 1 开始）在 n < `tier_threshold` 时进入短延迟层，否则进入长延迟层；
/// n 达到 `max_attempts` 时进入死信通道。准入竞争不计入 n，而是累加 `deferrals`，
/// 超过 `max_deferrals` 后才按普通失败计数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTierPolicy {
    pub max_attempts: u32,
    pub tier_threshold: u32,
    pub short: RetryTier,
    pub long: RetryTier,
    pub max_deferrals: u32,
    pub deferral_delay: Duration,
}

impl Default for RetryTierPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            tier_threshold: 3,
            short: RetryTier::new("frontier.retry.short", Duration::from_secs(30)),
            long: RetryTier::new("frontier.retry.long", Duration::from_secs(300)),
            max_deferrals: 20,
            deferral_delay: Duration::from_secs(2),
        }
    }
}

impl RetryTierPolicy {
    pub fn tiers(&self) -> [&RetryTier; 2] {
        [&self.short, &self.long]
    }

    pub fn tier_for(&self, attempts: u32) -> &RetryTier {
        if attempts < self.tier_threshold {
            &self.short
        } else {
            &self.long
        }
    }

    pub fn settle(&self, envelope: &DeliveryEnvelope, outcome: &HandlerOutcome) -> Settlement {
        match outcome.outcome {
            Outcome::Ok => Settlement {
                state: DeliveryState::Acked,
                action: SettleAction::Ack,
            },
            Outcome::Dlq => Settlement {
                state: DeliveryState::Dead,
                action: SettleAction::DeadLetter {
                    message: dead_letter(envelope, envelope.attempts, outcome),
                },
            },
            Outcome::Retry => self.settle_retry(envelope, outcome),
        }
    }

    fn settle_retry(&self, envelope: &DeliveryEnvelope, outcome: &HandlerOutcome) -> Settlement {
        if !outcome.counts_against_budget() && envelope.deferrals < self.max_deferrals {
            let mut message = envelope.to_wire();
            message.deferrals += 1;
            return Settlement {
                state: DeliveryState::Retrying(envelope.attempts),
                action: SettleAction::Delay {
                    tier: self.short.clone(),
                    delay: self.deferral_delay,
                    message,
                },
            };
        }

        let attempts = envelope.attempts.saturating_add(1);
        if attempts >= self.max_attempts {
            return Settlement {
                state: DeliveryState::Dead,
                action: SettleAction::DeadLetter {
                    message: dead_letter(envelope, attempts, outcome),
                },
            };
        }

        let tier = self.tier_for(attempts).clone();
        let mut message = envelope.to_wire();
        message.attempts = attempts;
        Settlement {
            state: DeliveryState::Retrying(attempts),
            action: SettleAction::Delay {
                delay: tier.delay,
                tier,
                message,
            },
        }
    }
}

fn dead_letter(envelope: &DeliveryEnvelope, attempts: u32, outcome: &HandlerOutcome) -> WireMessage {
    let mut message = envelope.to_wire();
    message.attempts = attempts;
    message.last_error = Some(outcome.reason.to_string());
    message
}
