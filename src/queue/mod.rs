// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 前沿消息总线及其后端：
/// - backend：后端接口与错误类型
/// - redis_list / redis_stream / memory：三种后端实现
/// - retry_tiers：重试分层与死信判定
/// - frontier_bus：入队、发布、消费与结算
/// - scheduler：延迟重试的到期提升
pub mod backend;
pub mod frontier_bus;
pub mod memory;
pub mod redis_list;
pub mod redis_stream;
pub mod retry_tiers;
pub mod scheduler;
