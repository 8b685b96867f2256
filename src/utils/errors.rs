// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::queue::backend::QueueError;

/// Worker错误类型
///
/// 任务级错误在处理器内部已转换为结算结果，这里只剩总线本身的故障。
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("队列错误: {0}")]
    QueueError(#[from] QueueError),
}
