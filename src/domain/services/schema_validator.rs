// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use validator::Validate;

use crate::domain::models::result_document::ResultDocument;
use crate::domain::models::task::CrawlTask;

/// 当前任务/结果结构版本
pub const SCHEMA_VERSION: u32 = 1;

/// 结构校验错误类型
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("消息格式错误: {0}")]
    Malformed(String),

    #[error("结构校验失败 (v{version}): {detail}")]
    Invalid { version: u32, detail: String },
}

/// 任务与结果的结构校验器
///
/// 在边界上把松散的JSON解析为强类型记录，失败即返回错误，
/// 不让未经校验的数据进入流水线内部。
pub trait SchemaValidator: Send + Sync {
    fn version(&self) -> u32;

    fn validate_task(&self, payload: &str) -> Result<CrawlTask, SchemaError>;

    fn validate_result(&self, document: &ResultDocument) -> Result<(), SchemaError>;
}

/// 基于 `validator` 派生规则的校验器
#[derive(Debug, Clone, Default)]
pub struct VersionedSchemaValidator;

impl VersionedSchemaValidator {
    pub fn new() -> Self {
        Self
    }
}

impl SchemaValidator for VersionedSchemaValidator {
    fn version(&self) -> u32 {
        SCHEMA_VERSION
    }

    fn validate_task(&self, payload: &str) -> Result<CrawlTask, SchemaError> {
        let task: CrawlTask =
            serde_json::from_str(payload).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        task.validate().map_err(|e| SchemaError::Invalid {
            version: SCHEMA_VERSION,
            detail: e.to_string(),
        })?;
        let scheme_ok = url::Url::parse(&task.url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !scheme_ok {
            return Err(SchemaError::Invalid {
                version: SCHEMA_VERSION,
                detail: format!("unsupported url scheme: {}", task.url),
            });
        }
        Ok(task)
    }

    fn validate_result(&self, document: &ResultDocument) -> Result<(), SchemaError> {
        document.validate().map_err(|e| SchemaError::Invalid {
            version: SCHEMA_VERSION,
            detail: e.to_string(),
        })
    }
}
