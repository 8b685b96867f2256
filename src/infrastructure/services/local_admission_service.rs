// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use uuid::Uuid;

use crate::domain::services::admission_service::{
    AdmissionController, AdmissionError, OriginLimits, SlotLease,
};

/// 进程内按源的并发信号量
///
/// 为每个源提供一个独立的信号量，只在单进程部署（内存后端）或测试中使用。
#[derive(Debug)]
pub struct LocalAdmissionController {
    /// 存储每个源的信号量
    semaphores: DashMap<String, Arc<Semaphore>>,
    /// 已发出的租约
    leases: DashMap<String, OwnedSemaphorePermit>,
    limits: OriginLimits,
}

impl LocalAdmissionController {
    pub fn new(limits: OriginLimits) -> Self {
        Self {
            semaphores: DashMap::new(),
            leases: DashMap::new(),
            limits,
        }
    }

    /// 获取或创建指定源的信号量
    fn get_or_create(&self, origin: &str) -> Arc<Semaphore> {
        self.semaphores
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.limits.limit_for(origin) as usize)))
            .clone()
    }
}

#[async_trait]
impl AdmissionController for LocalAdmissionController {
    async fn try_acquire(&self, origin: &str) -> Result<Option<SlotLease>, AdmissionError> {
        match self.get_or_create(origin).try_acquire_owned() {
            Ok(permit) => {
                let token = Uuid::new_v4().to_string();
                self.leases.insert(token.clone(), permit);
                Ok(Some(SlotLease {
                    origin: origin.to_string(),
                    token,
                }))
            }
            Err(TryAcquireError::NoPermits) => Ok(None),
            Err(TryAcquireError::Closed) => Err(AdmissionError::Closed(origin.to_string())),
        }
    }

    async fn release(&self, lease: &SlotLease) -> Result<(), AdmissionError> {
        // dropping the permit returns it to the semaphore
        self.leases.remove(&lease.token);
        Ok(())
    }

    async fn in_flight(&self, origin: &str) -> Result<u32, AdmissionError> {
        let Some(semaphore) = self.semaphores.get(origin).map(|s| Arc::clone(&s)) else {
            return Ok(0);
        };
        let limit = self.limits.limit_for(origin) as usize;
        Ok(limit.saturating_sub(semaphore.available_permits()) as u32)
    }
}
