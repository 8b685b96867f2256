// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::workers::Worker;

/// 工作管理器
///
/// 持有进程内所有后台工作器，统一启动并通过共享的关闭信号优雅停止。
pub struct WorkerManager {
    workers: Vec<Arc<dyn Worker>>,
    handles: Vec<(String, JoinHandle<()>)>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_timeout: Duration,
}

impl WorkerManager {
    /// 创建新的工作管理器
    ///
    /// # 参数
    ///
    /// * `shutdown_timeout` - 关闭时等待每个工作器退出的最长时间
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            workers: Vec::new(),
            handles: Vec::new(),
            shutdown_tx,
            shutdown_timeout,
        }
    }

    /// 注册工作器，需在 `start_workers` 之前调用
    pub fn register(&mut self, worker: Arc<dyn Worker>) {
        self.workers.push(worker);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// 启动所有已注册的工作器
    pub fn start_workers(&mut self) {
        for worker in self.workers.drain(..) {
            let name = worker.name().to_string();
            let shutdown = self.shutdown_tx.subscribe();
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                info!("Worker {} started", task_name);
                match worker.run(shutdown).await {
                    Ok(()) => info!("Worker {} stopped", task_name),
                    Err(e) => error!("Worker {} failed: {}", task_name, e),
                }
            });
            self.handles.push((name, handle));
        }
    }

    /// 等待 Ctrl-C 后关闭所有工作器
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
        self.shutdown().await;
    }

    /// 发出关闭信号并等待工作器退出，超时的工作器被强制中止
    pub async fn shutdown(&mut self) {
        info!("Shutting down workers...");
        let _ = self.shutdown_tx.send(true);

        for (name, mut handle) in self.handles.drain(..) {
            match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Worker {} panicked: {}", name, e),
                Err(_) => {
                    warn!("Worker {} did not stop in time, aborting", name);
                    handle.abort();
                }
            }
        }

        info!("Workers shut down successfully");
    }
}
