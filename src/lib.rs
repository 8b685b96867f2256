// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 把配置装配成协作者，并提供种子注入用例
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含任务、投递和结果模型，以及准入、去重和结构校验的服务接口
pub mod domain;

/// 引擎模块
///
/// 静态抓取、浏览器渲染和内容提取
pub mod engines;

/// 基础设施模块
///
/// 基于Redis和进程内结构的准入、去重实现
pub mod infrastructure;

/// 队列模块
///
/// 前沿消息总线、队列后端、重试分层和重试调度
pub mod queue;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;

/// 工作器模块
///
/// 爬取任务处理和工作器生命周期管理
pub mod workers;
