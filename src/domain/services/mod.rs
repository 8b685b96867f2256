// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 准入控制（admission_service）：按源限制并发抓取数
/// - 去重存储（dedup_service）：Seen / Inflight / ContentHash 三个集合
/// - 结构校验（schema_validator）：任务与结果文档的边界校验
pub mod admission_service;
pub mod dedup_service;
pub mod schema_validator;
