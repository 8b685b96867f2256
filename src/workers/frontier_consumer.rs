// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

use crate::queue::frontier_bus::{ConsumeOptions, DeliveryHandler, FrontierBus};
use crate::utils::errors::WorkerError;
use crate::workers::Worker;

/// 前沿消费者
///
/// 把一个投递处理器挂到总线上，作为受管理的后台工作器运行。
pub struct FrontierConsumer {
    bus: Arc<FrontierBus>,
    options: ConsumeOptions,
    handler: Arc<dyn DeliveryHandler>,
}

impl FrontierConsumer {
    pub fn new(
        bus: Arc<FrontierBus>,
        options: ConsumeOptions,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Self {
        Self {
            bus,
            options,
            handler,
        }
    }
}

#[async_trait]
impl Worker for FrontierConsumer {
    async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        self.bus
            .consume(self.options.clone(), Arc::clone(&self.handler), shutdown)
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.options.consumer
    }
}
