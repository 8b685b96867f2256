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
use chrono::Utc;
use futures::FutureExt;
use metrics::{counter, histogram};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn, Span};
use url::Url;

use crate::domain::models::envelope::DeliveryEnvelope;
use crate::domain::models::outcome::{HandlerOutcome, Outcome, OutcomeReason};
use crate::domain::models::result_document::{ResultDocument, ResultMeta};
use crate::domain::models::task::CrawlTask;
use crate::domain::services::admission_service::{AdmissionController, AdmissionPermit};
use crate::domain::services::dedup_service::{DedupError, DedupSet, DedupStore};
use crate::domain::services::schema_validator::SchemaValidator;
use crate::engines::traits::{FetchError, FetchedPage, Fetcher};
use crate::queue::backend::QueueError;
use crate::queue::frontier_bus::{panic_message, DeliveryHandler, FrontierBus};
use crate::utils::robots::CrawlPolicy;
use crate::utils::text_processing::{content_hash, fingerprint};
use crate::utils::url_utils;

/// 爬取工作者参数
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// 允许抓取的最大深度
    pub max_depth: u32,
    /// 只扩展与当前页面同源的链接
    pub same_origin_only: bool,
    /// 结果中是否保留原始HTML
    pub include_raw_html: bool,
    /// 子任务写入的通道
    pub child_channel: String,
    /// 结果文档发布的通道
    pub result_channels: Vec<String>,
    /// 准入被拒后原地重试的次数
    pub admission_wait_attempts: u32,
    pub admission_wait_interval: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_depth: 3,
            same_origin_only: true,
            include_raw_html: false,
            child_channel: "frontier.initial".to_string(),
            result_channels: vec!["frontier.results".to_string()],
            admission_wait_attempts: 3,
            admission_wait_interval: Duration::from_millis(250),
        }
    }
}

/// 爬取工作者
///
/// 每条任务依次经过：校验、策略检查、准入、抓取、内容去重、链接扩展、
/// 结果发布，最后把处理结果交还给总线结算。任务级错误全部在这里转换为
/// `ok | retry | dlq`，不会向外传播。
pub struct CrawlWorker {
    bus: Arc<FrontierBus>,
    dedup: Arc<dyn DedupStore>,
    admission: Arc<dyn AdmissionController>,
    fetcher: Arc<dyn Fetcher>,
    policy: Arc<dyn CrawlPolicy>,
    validator: Arc<dyn SchemaValidator>,
    settings: CrawlSettings,
}

impl CrawlWorker {
    /// 创建新的爬取工作者实例
    ///
    /// 所有协作者在进程启动时构造一次并注入。
    pub fn new(
        bus: Arc<FrontierBus>,
        dedup: Arc<dyn DedupStore>,
        admission: Arc<dyn AdmissionController>,
        fetcher: Arc<dyn Fetcher>,
        policy: Arc<dyn CrawlPolicy>,
        validator: Arc<dyn SchemaValidator>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            bus,
            dedup,
            admission,
            fetcher,
            policy,
            validator,
            settings,
        }
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// 策略检查与在途标记
    async fn process(&self, task: &CrawlTask) -> HandlerOutcome {
        if task.depth > self.settings.max_depth {
            return HandlerOutcome::ok(OutcomeReason::DepthExceeded {
                depth: task.depth,
                max_depth: self.settings.max_depth,
            });
        }

        match self.policy.is_allowed(&task.url).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Disallowed by robots.txt");
                return HandlerOutcome::ok(OutcomeReason::RobotsDisallowed);
            }
            Err(e) => {
                return HandlerOutcome::retry(OutcomeReason::Infrastructure(format!(
                    "policy check failed: {}",
                    e
                )))
            }
        }

        let Some(origin) = task.origin() else {
            return HandlerOutcome::dlq(OutcomeReason::Validation(format!(
                "url has no origin: {}",
                task.url
            )));
        };

        let key = inflight_key(&task.url);
        match self.dedup.add_if_absent(DedupSet::Inflight, &key).await {
            Ok(true) => {}
            Ok(false) => {
                // the marker may belong to a crashed consumer; defer until it expires
                debug!("Task already in flight elsewhere, deferring");
                return HandlerOutcome::retry(OutcomeReason::AlreadyInflight);
            }
            Err(e) => return HandlerOutcome::retry(OutcomeReason::Infrastructure(e.to_string())),
        }

        let outcome = self.process_admitted(task, &origin).await;

        if let Err(e) = self.dedup.remove(DedupSet::Inflight, &key).await {
            warn!("Failed to clear inflight marker: {}", e);
        }
        outcome
    }

    /// 在准入槽位内完成抓取到发布，槽位在所有路径上归还
    async fn process_admitted(&self, task: &CrawlTask, origin: &str) -> HandlerOutcome {
        let permit = match self.admit(origin).await {
            Ok(Some(permit)) => permit,
            Ok(None) => {
                debug!(origin = %origin, "Admission refused");
                return HandlerOutcome::retry(OutcomeReason::AdmissionContention);
            }
            Err(outcome) => return outcome,
        };

        let outcome = self.fetch_and_publish(task, origin).await;
        permit.release().await;
        outcome
    }

    /// 短暂轮询准入槽位
    async fn admit(&self, origin: &str) -> Result<Option<AdmissionPermit>, HandlerOutcome> {
        let attempts = self.settings.admission_wait_attempts.max(1);
        for attempt in 1..=attempts {
            match AdmissionPermit::try_acquire(Arc::clone(&self.admission), origin).await {
                Ok(Some(permit)) => return Ok(Some(permit)),
                Ok(None) if attempt < attempts => sleep(self.settings.admission_wait_interval).await,
                Ok(None) => {}
                Err(e) => {
                    return Err(HandlerOutcome::retry(OutcomeReason::Infrastructure(
                        e.to_string(),
                    )))
                }
            }
        }
        Ok(None)
    }

    async fn fetch_and_publish(&self, task: &CrawlTask, origin: &str) -> HandlerOutcome {
        let started = Instant::now();
        let fetched = AssertUnwindSafe(self.fetcher.fetch(&task.url))
            .catch_unwind()
            .await;
        histogram!("crawler_fetch_duration_seconds").record(started.elapsed().as_secs_f64());

        let page = match fetched {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => return fetch_failure(e),
            Err(panic) => {
                return HandlerOutcome::retry(OutcomeReason::Exception(panic_message(
                    panic.as_ref(),
                )))
            }
        };

        let hash = content_hash(&page.text);
        // 空正文不参与内容去重，否则所有空页面会互相判重
        let content_gated = !page.text.trim().is_empty();
        if content_gated {
            match self.dedup.add_if_absent(DedupSet::ContentHash, &hash).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(content_hash = %hash, "Duplicate content, skipping publish");
                    return HandlerOutcome::ok(OutcomeReason::DuplicateContent);
                }
                Err(e) => {
                    return HandlerOutcome::retry(OutcomeReason::Infrastructure(e.to_string()))
                }
            }
        }

        let fp = fingerprint(&page.text);
        if content_gated {
            if let Err(e) = self.dedup.record_fingerprint(&fp, &page.final_url).await {
                warn!("Failed to record fingerprint: {}", e);
            }
        }

        let document = self.build_document(&page, origin, hash.clone(), fp);
        if let Err(e) = self.validator.validate_result(&document) {
            if content_gated {
                self.forget_content(&hash).await;
            }
            return HandlerOutcome::dlq(OutcomeReason::Validation(e.to_string()));
        }

        if let Err(e) = self.enqueue_links(task, &page).await {
            if content_gated {
                self.forget_content(&hash).await;
            }
            return HandlerOutcome::retry(OutcomeReason::Infrastructure(e.to_string()));
        }

        for channel in &self.settings.result_channels {
            if let Err(e) = self.bus.publish(channel, &document, Some(origin)).await {
                warn!(channel = %channel, "Failed to publish result: {}", e);
            }
        }

        counter!("crawler_pages_processed_total", "mode" => page.mode.to_string()).increment(1);
        HandlerOutcome::processed()
    }

    /// 内容哈希回滚，让重投的任务不被当作重复
    async fn forget_content(&self, hash: &str) {
        if let Err(e) = self.dedup.remove(DedupSet::ContentHash, hash).await {
            warn!("Failed to roll back content hash: {}", e);
        }
    }

    /// 扩展页面链接，返回入队的子任务数
    ///
    /// 任一链接的 Seen 检查或入队失败都会中止扩展，由调用方整体重试；
    /// 已入队的链接在重投时会被 Seen 跳过。
    async fn enqueue_links(&self, task: &CrawlTask, page: &FetchedPage) -> Result<usize, ExpandError> {
        if task.depth + 1 > self.settings.max_depth {
            return Ok(0);
        }

        let Ok(base) = Url::parse(&page.final_url).or_else(|_| Url::parse(&task.url)) else {
            return Ok(0);
        };
        let own = [inflight_key(&page.final_url), inflight_key(&task.url)];
        let links = url_utils::discover_links(
            &base,
            page.links.iter().map(String::as_str),
            self.settings.same_origin_only,
        );

        let mut enqueued = 0;
        for link in links.into_iter().filter(|l| !own.contains(l)) {
            match self.dedup.add_if_absent(DedupSet::Seen, &link).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(link = %link, "Seen check failed: {}", e);
                    return Err(e.into());
                }
            }

            let child = task.child(link.as_str());
            if let Err(e) = self.bus.enqueue(&self.settings.child_channel, &child).await {
                if let Err(e) = self.dedup.remove(DedupSet::Seen, &link).await {
                    warn!(link = %link, "Failed to roll back seen marker: {}", e);
                }
                return Err(e.into());
            }
            enqueued += 1;
        }

        if enqueued > 0 {
            counter!("crawler_links_enqueued_total").increment(enqueued as u64);
            info!("Enqueued {} child links from {}", enqueued, page.final_url);
        }
        Ok(enqueued)
    }

    fn build_document(
        &self,
        page: &FetchedPage,
        origin: &str,
        content_hash: String,
        fingerprint: String,
    ) -> ResultDocument {
        let domain = Url::parse(&page.final_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| origin.to_string());

        ResultDocument {
            url: page.final_url.clone(),
            title: page.title.clone(),
            body: page.text.clone(),
            html: self.settings.include_raw_html.then(|| page.html.clone()),
            meta: ResultMeta {
                fetched_at: Utc::now(),
                domain,
                extraction_mode: page.mode,
                content_hash,
                fingerprint,
            },
        }
    }
}

#[async_trait]
impl DeliveryHandler for CrawlWorker {
    #[instrument(
        skip(self, envelope),
        fields(channel = %envelope.channel, attempts = envelope.attempts, url, depth)
    )]
    async fn handle(&self, envelope: &DeliveryEnvelope) -> HandlerOutcome {
        let outcome = match self.validator.validate_task(&envelope.payload) {
            Ok(task) => {
                let span = Span::current();
                span.record("url", task.url.as_str());
                span.record("depth", task.depth);
                self.process(&task).await
            }
            Err(e) => {
                warn!("Task failed validation: {}", e);
                HandlerOutcome::dlq(OutcomeReason::Validation(e.to_string()))
            }
        };

        if outcome.outcome != Outcome::Ok || outcome.reason != OutcomeReason::Processed {
            counter!("crawler_pages_failed_total", "reason" => outcome.reason.label()).increment(1);
        }
        debug!(outcome = %outcome.outcome, reason = %outcome.reason, "Task handled");
        outcome
    }
}

/// 链接扩展失败
#[derive(Debug, Error)]
enum ExpandError {
    #[error("seen check failed: {0}")]
    Dedup(#[from] DedupError),
    #[error("child enqueue failed: {0}")]
    Queue(#[from] QueueError),
}

/// 在途标记使用规范化URL，规范化失败时退回原始URL
fn inflight_key(url: &str) -> String {
    url_utils::canonicalize_url(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn fetch_failure(error: FetchError) -> HandlerOutcome {
    match error {
        FetchError::UnsupportedContent(content_type) => {
            HandlerOutcome::ok(OutcomeReason::UnsupportedContent(content_type))
        }
        e if e.is_permanent() => HandlerOutcome::dlq(OutcomeReason::PermanentFetch(e.to_string())),
        e => HandlerOutcome::retry(OutcomeReason::TransientFetch(e.to_string())),
    }
}
