// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 提供对外部系统的封装：
/// - 缓存（cache）：Redis客户端
/// - 服务（services）：准入控制、去重存储的 Redis / 进程内实现
///
/// 基础设施层依赖领域层的抽象接口，领域层不感知具体实现。
pub mod cache;
pub mod services;
