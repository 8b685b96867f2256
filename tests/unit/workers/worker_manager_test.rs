// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器管理器测试模块
///
/// 验证不响应关闭信号的工作器会在超时后被中止

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use crawlmesh::utils::errors::WorkerError;
    use crawlmesh::workers::manager::WorkerManager;
    use crawlmesh::workers::Worker;
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio::sync::watch;

    struct Stubborn;

    #[async_trait]
    impl Worker for Stubborn {
        async fn run(&self, _shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn name(&self) -> &str {
            "stubborn"
        }
    }

    #[tokio::test]
    async fn test_stubborn_worker_is_aborted_after_timeout() {
        let mut manager = WorkerManager::new(Duration::from_millis(100));
        manager.register(Arc::new(Stubborn));
        manager.start_workers();
        assert_eq!(manager.worker_count(), 0);

        let started = Instant::now();
        manager.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
