// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::utils::url_utils;

/// 任务优先级
///
/// 高优先级任务进入独立的 priority 通道，消费时先于 initial 通道被读取。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// 普通优先级
    #[default]
    Normal,
    /// 高优先级
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(format!("Invalid priority: {}", other)),
        }
    }
}

/// 爬取任务
///
/// 前沿队列中流转的最小工作单元。`depth` 表示距离种子页面的跳数，
/// 种子为 0，每扩展一层链接加 1。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CrawlTask {
    /// 目标URL（绝对地址）
    #[validate(url)]
    pub url: String,
    /// 爬取深度
    pub depth: u32,
    /// 优先级
    #[serde(default)]
    pub priority: Priority,
}

impl CrawlTask {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
            priority: Priority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// 任务URL的源（scheme + host + port），无法解析时返回 None
    pub fn origin(&self) -> Option<String> {
        url_utils::origin_of(&self.url)
    }

    /// 由当前任务发现的链接派生出下一层任务
    pub fn child(&self, url: impl Into<String>) -> CrawlTask {
        CrawlTask::new(url, self.depth + 1)
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
