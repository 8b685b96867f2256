// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 负责把配置装配成具体的协作者，并提供种子注入等用例
pub mod bootstrap;
pub mod use_cases;
