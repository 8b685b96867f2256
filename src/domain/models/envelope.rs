// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 队列中实际存储的消息
///
/// `attempts` 只计入失败重试；`deferrals` 单独记录因准入竞争被推迟的次数，
/// 两者都随消息一起迁移到重试层和死信通道。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub payload: String,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub deferrals: u32,
    #[serde(default)]
    pub key: Option<String>,
    /// 最近一次失败原因，仅进入死信通道时填写
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WireMessage {
    pub fn new(payload: impl Into<String>, key: Option<String>) -> Self {
        Self {
            payload: payload.into(),
            attempts: 0,
            deferrals: 0,
            key,
            last_error: None,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 解码列表中的原始条目
    ///
    /// 外部生产者可能直接推入裸任务JSON（没有 payload 包装），
    /// 这种条目按 attempts = 0 的新消息处理。
    pub fn decode(raw: &str) -> WireMessage {
        match serde_json::from_str::<WireMessage>(raw) {
            Ok(message) => message,
            Err(_) => WireMessage::new(raw, None),
        }
    }
}

/// 一次投递
///
/// `delivery_id` 由后端决定：流后端为条目ID，列表后端为本地生成的UUID。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEnvelope {
    pub delivery_id: String,
    pub channel: String,
    pub payload: String,
    pub attempts: u32,
    pub deferrals: u32,
    pub routing_key: Option<String>,
}

impl DeliveryEnvelope {
    pub fn from_wire(
        delivery_id: impl Into<String>,
        channel: impl Into<String>,
        message: WireMessage,
    ) -> Self {
        Self {
            delivery_id: delivery_id.into(),
            channel: channel.into(),
            payload: message.payload,
            attempts: message.attempts,
            deferrals: message.deferrals,
            routing_key: message.key,
        }
    }

    pub fn to_wire(&self) -> WireMessage {
        WireMessage {
            payload: self.payload.clone(),
            attempts: self.attempts,
            deferrals: self.deferrals,
            key: self.routing_key.clone(),
            last_error: None,
        }
    }
}
