// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施服务模块
///
/// 准入控制与去重存储的具体实现：Redis 版本供多进程部署使用，
/// 进程内版本供内存后端和测试使用。
pub mod local_admission_service;
pub mod memory_dedup_service;
pub mod redis_admission_service;
pub mod redis_dedup_service;
