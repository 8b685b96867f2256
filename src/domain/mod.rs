// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：任务、投递信封、处理结果和结果文档
/// - 服务（services）：准入控制、去重存储和结构校验的抽象接口
///
/// 领域层不依赖于具体的队列或存储实现。
pub mod models;
pub mod services;
