// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{page, Harness, ScriptedFetcher, DLQ, GROUP, INITIAL, RESULTS};
use async_trait::async_trait;
use crawlmesh::domain::models::envelope::DeliveryEnvelope;
use crawlmesh::domain::models::outcome::{HandlerOutcome, OutcomeReason};
use crawlmesh::domain::models::result_document::ResultDocument;
use crawlmesh::queue::backend::QueueBackend;
use crawlmesh::queue::frontier_bus::{ConsumeOptions, DeliveryHandler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn options(concurrency: usize) -> ConsumeOptions {
    ConsumeOptions {
        channels: vec![INITIAL.to_string()],
        group: GROUP.to_string(),
        consumer: "consumer-1".to_string(),
        concurrency,
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_consume_crawls_until_shutdown() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(
        "http://example.com/",
        Ok(page("http://example.com/", "home", &["/about", "/blog"])),
    );
    fetcher.respond(
        "http://example.com/about",
        Ok(page("http://example.com/about", "about us", &["/"])),
    );
    fetcher.respond(
        "http://example.com/blog",
        Ok(page("http://example.com/blog", "posts", &["/about"])),
    );
    let harness = Harness::builder().fetcher(fetcher).build();
    harness.seed("http://example.com/", 0).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bus = harness.bus.clone();
    let handler: Arc<dyn DeliveryHandler> = harness.worker.clone();
    let consumer = tokio::spawn(async move { bus.consume(options(2), handler, shutdown_rx).await });

    let backend = harness.backend.clone();
    wait_until(|| backend.messages(RESULTS).len() == 3).await;
    shutdown_tx.send(true).unwrap();
    consumer.await.unwrap().unwrap();

    let mut urls: Vec<String> = harness.results().into_iter().map(|r| r.url).collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "http://example.com/",
            "http://example.com/about",
            "http://example.com/blog"
        ]
    );
    assert_eq!(harness.fetcher.calls("http://example.com/about"), 1);
    assert_eq!(harness.backend.unacked_len(), 0);
    assert_eq!(harness.backend.requeue_unacked(), 0);
    assert!(harness.backend.messages(INITIAL).is_empty());
}

struct CountingHandler {
    calls: AtomicUsize,
    outcome: HandlerOutcome,
}

#[async_trait]
impl DeliveryHandler for CountingHandler {
    async fn handle(&self, _envelope: &DeliveryEnvelope) -> HandlerOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}

#[tokio::test]
async fn test_dlq_outcome_bypasses_retry_tiers() {
    let harness = Harness::builder().build();
    harness
        .bus
        .publish(INITIAL, &serde_json::json!({"url": "http://example.com/"}), None)
        .await
        .unwrap();
    let handler = CountingHandler {
        calls: AtomicUsize::new(0),
        outcome: HandlerOutcome::dlq(OutcomeReason::PermanentFetch("HTTP status 410".into())),
    };

    let envelope = harness.next_delivery().await.unwrap();
    harness.bus.dispatch(envelope, GROUP, &handler).await.unwrap();

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.promote_all().await, 0);
    let dead = harness.backend.messages(DLQ);
    assert_eq!(dead.len(), 1);
    assert_eq!(
        dead[0].last_error.as_deref(),
        Some("permanent_fetch: HTTP status 410")
    );
}

#[tokio::test]
async fn test_publish_keeps_routing_key_and_payload() {
    let harness = Harness::builder().build();
    let document: ResultDocument = serde_json::from_value(serde_json::json!({
        "url": "https://example.com/a",
        "title": "A",
        "body": "text",
        "html": null,
        "meta": {
            "fetchedAt": "2025-01-01T00:00:00Z",
            "domain": "example.com",
            "extractionMode": "static",
            "contentHash": "a".repeat(64),
            "fingerprint": "0123456789abcdef"
        }
    }))
    .unwrap();

    harness
        .bus
        .publish(RESULTS, &document, Some("https://example.com"))
        .await
        .unwrap();

    let published = harness.backend.messages(RESULTS);
    assert_eq!(published[0].key.as_deref(), Some("https://example.com"));
    let parsed: ResultDocument = serde_json::from_str(&published[0].payload).unwrap();
    assert_eq!(parsed, document);
}

#[tokio::test]
async fn test_enqueue_uses_origin_as_routing_key() {
    let harness = Harness::builder().build();
    harness.seed("https://example.com:8443/a?b=1", 0).await;

    let queued = harness.backend.messages(INITIAL);
    assert_eq!(queued[0].key.as_deref(), Some("https://example.com:8443"));
    assert_eq!(queued[0].attempts, 0);
    assert_eq!(
        harness.backend.depth(INITIAL).await.unwrap(),
        1
    );
}
