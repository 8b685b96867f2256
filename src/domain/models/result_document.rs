// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// 内容提取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// 直接HTTP抓取
    Static,
    /// 无头浏览器渲染
    Rendered,
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExtractionMode::Static => write!(f, "static"),
            ExtractionMode::Rendered => write!(f, "rendered"),
        }
    }
}

/// 发布到结果通道的文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ResultDocument {
    #[validate(url)]
    pub url: String,
    pub title: Option<String>,
    /// 规范化后的正文
    pub body: String,
    /// 原始HTML，仅在配置开启时保留
    pub html: Option<String>,
    #[validate(nested)]
    pub meta: ResultMeta,
}

/// 文档元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    pub fetched_at: DateTime<Utc>,
    #[validate(length(min = 1))]
    pub domain: String,
    pub extraction_mode: ExtractionMode,
    #[validate(length(equal = 64), custom(function = "validate_lower_hex"))]
    pub content_hash: String,
    #[validate(length(equal = 16), custom(function = "validate_lower_hex"))]
    pub fingerprint: String,
}

fn validate_lower_hex(value: &str) -> Result<(), validator::ValidationError> {
    if value
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        Ok(())
    } else {
        Err(validator::ValidationError::new("lower_hex"))
    }
}
