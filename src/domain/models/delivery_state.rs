// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;

/// 消息投递状态
///
/// PENDING -> PROCESSING -> {ACKED | RETRYING(n) | DEAD}，
/// RETRYING(n) 在延迟到期后回到 PENDING，且 n 严格递增直到 maxAttempts。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Processing,
    Acked,
    Retrying(u32),
    Dead,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Acked | DeliveryState::Dead)
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeliveryState::Pending => write!(f, "pending"),
            DeliveryState::Processing => write!(f, "processing"),
            DeliveryState::Acked => write!(f, "acked"),
            DeliveryState::Retrying(n) => write!(f, "retrying({})", n),
            DeliveryState::Dead => write!(f, "dead"),
        }
    }
}
