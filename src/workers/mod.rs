// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供前沿消费、任务处理和工作器生命周期管理
pub mod crawl_worker;
pub mod frontier_consumer;
pub mod manager;
pub mod worker;

pub use worker::Worker;
