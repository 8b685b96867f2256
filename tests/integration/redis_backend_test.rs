// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 需要 Docker 的 Redis 集成测试，默认忽略：
//! `cargo test -- --ignored redis`

use super::helpers::start_redis;
use chrono::{Duration as ChronoDuration, Utc};
use crawlmesh::domain::models::envelope::WireMessage;
use crawlmesh::domain::services::admission_service::{AdmissionController, OriginLimits};
use crawlmesh::domain::services::dedup_service::{DedupSet, DedupStore};
use crawlmesh::infrastructure::services::redis_admission_service::RedisAdmissionController;
use crawlmesh::infrastructure::services::redis_dedup_service::RedisDedupStore;
use crawlmesh::queue::backend::{DelayedMessage, QueueBackend};
use crawlmesh::queue::redis_list::RedisListBackend;
use crawlmesh::queue::redis_stream::RedisStreamBackend;
use std::sync::Arc;
use std::time::Duration;

fn channels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_stream_delivers_acks_and_reclaims() {
    let (_node, redis) = start_redis().await;
    let backend = RedisStreamBackend::new(redis, Duration::from_millis(100));
    let initial = channels(&["frontier.initial"]);

    // pushed before the group exists
    let mut message = WireMessage::new(r#"{"url":"https://a.test/","depth":0}"#, Some("https://a.test".into()));
    message.attempts = 2;
    backend.push("frontier.initial", message).await.unwrap();
    backend.prepare(&initial, "crawlers").await.unwrap();
    backend.prepare(&initial, "crawlers").await.unwrap();

    let first = backend.fetch(&initial, "crawlers", "a", 10).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].attempts, 2);
    assert_eq!(first[0].routing_key.as_deref(), Some("https://a.test"));

    // consumer "a" crashed without acking
    assert!(backend.fetch(&initial, "crawlers", "b", 10).await.unwrap().is_empty());
    tokio::time::sleep(Duration::from_millis(200)).await;
    let reclaimed = backend.fetch(&initial, "crawlers", "b", 10).await.unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].delivery_id, first[0].delivery_id);

    backend.ack(&reclaimed[0], "crawlers").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(backend.fetch(&initial, "crawlers", "c", 10).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_stream_reads_channels_in_priority_order() {
    let (_node, redis) = start_redis().await;
    let backend = RedisStreamBackend::new(redis, Duration::from_secs(60));
    let ordered = channels(&["frontier.priority", "frontier.initial"]);
    backend.prepare(&ordered, "crawlers").await.unwrap();

    backend
        .push("frontier.initial", WireMessage::new("normal", None))
        .await
        .unwrap();
    backend
        .push("frontier.priority", WireMessage::new("urgent", None))
        .await
        .unwrap();

    let batch = backend.fetch(&ordered, "crawlers", "a", 1).await.unwrap();
    assert_eq!(batch[0].payload, "urgent");
    assert_eq!(batch[0].routing_key, None);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_delayed_tier_promotion_keeps_attempts() {
    let (_node, redis) = start_redis().await;
    let stream = RedisStreamBackend::new(redis.clone(), Duration::from_secs(60));
    let list = RedisListBackend::new(redis);

    for backend in [&stream as &dyn QueueBackend, &list as &dyn QueueBackend] {
        let channel = format!("frontier.{}", backend.kind());
        let tier = format!("retry.{}", backend.kind());
        backend.prepare(&[channel.clone()], "crawlers").await.unwrap();

        let mut message = WireMessage::new("payload", Some("https://a.test".into()));
        message.attempts = 3;
        let due = Utc::now() + ChronoDuration::seconds(30);
        backend
            .schedule(&tier, DelayedMessage::new(channel.as_str(), message.clone()), due)
            .await
            .unwrap();
        backend
            .schedule(&tier, DelayedMessage::new(channel.as_str(), message), due)
            .await
            .unwrap();

        assert_eq!(backend.promote_due(&tier, Utc::now(), 10).await.unwrap(), 0);
        let later = Utc::now() + ChronoDuration::minutes(1);
        assert_eq!(backend.promote_due(&tier, later, 10).await.unwrap(), 2);
        assert_eq!(backend.depth(&channel).await.unwrap(), 2);

        let batch = backend
            .fetch(&[channel.clone()], "crawlers", "a", 10)
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|e| e.attempts == 3));
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_dedup_add_if_absent_is_atomic() {
    let (_node, redis) = start_redis().await;
    let store = Arc::new(RedisDedupStore::new(redis, "test", Duration::from_secs(60)));

    let attempts = (0..20).map(|_| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .add_if_absent(DedupSet::Seen, "https://a.test/page")
                .await
                .unwrap()
        })
    });
    let winners = futures::future::join_all(attempts)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();
    assert_eq!(winners, 1);

    assert!(store
        .add_if_absent(DedupSet::Inflight, "https://a.test/page")
        .await
        .unwrap());
    assert!(!store
        .add_if_absent(DedupSet::Inflight, "https://a.test/page")
        .await
        .unwrap());
    store
        .remove(DedupSet::Inflight, "https://a.test/page")
        .await
        .unwrap();
    assert!(store
        .add_if_absent(DedupSet::Inflight, "https://a.test/page")
        .await
        .unwrap());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_admission_never_overshoots() {
    let (_node, redis) = start_redis().await;
    let controller = Arc::new(RedisAdmissionController::new(
        redis,
        "test",
        OriginLimits::new(3),
        Duration::from_secs(60),
    ));

    let attempts = (0..10).map(|_| {
        let controller = controller.clone();
        tokio::spawn(async move { controller.try_acquire("https://a.test").await.unwrap() })
    });
    let leases: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .filter_map(|r| r.unwrap())
        .collect();

    assert_eq!(leases.len(), 3);
    assert_eq!(controller.in_flight("https://a.test").await.unwrap(), 3);
    assert!(controller.try_acquire("https://a.test").await.unwrap().is_none());

    controller.release(&leases[0]).await.unwrap();
    assert_eq!(controller.in_flight("https://a.test").await.unwrap(), 2);
    assert!(controller.try_acquire("https://a.test").await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_admission_reclaims_expired_leases() {
    let (_node, redis) = start_redis().await;
    let controller = RedisAdmissionController::new(
        redis,
        "test",
        OriginLimits::new(1),
        Duration::from_millis(200),
    );

    let crashed = controller.try_acquire("https://a.test").await.unwrap();
    assert!(crashed.is_some());
    assert!(controller.try_acquire("https://a.test").await.unwrap().is_none());

    // lease age is measured with the server clock
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(controller.in_flight("https://a.test").await.unwrap(), 0);
    assert!(controller.try_acquire("https://a.test").await.unwrap().is_some());
}
