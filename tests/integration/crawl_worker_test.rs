// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{page, Harness, ScriptedFetcher, StaticPolicy, DLQ, INITIAL};
use crawlmesh::domain::models::delivery_state::DeliveryState;
use crawlmesh::domain::models::envelope::WireMessage;
use crawlmesh::domain::models::result_document::ExtractionMode;
use crawlmesh::domain::services::admission_service::{AdmissionController, OriginLimits};
use crawlmesh::domain::services::dedup_service::{DedupSet, DedupStore};
use crawlmesh::engines::traits::FetchError;
use crawlmesh::queue::backend::QueueBackend;
use crawlmesh::queue::frontier_bus::DeliveryHandler;
use crawlmesh::utils::text_processing::content_hash;
use std::time::Duration;

#[tokio::test]
async fn test_same_origin_links_become_children_at_next_depth() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(
        "http://example.com/a",
        Ok(page(
            "http://example.com/a",
            "page a body",
            &["/b", "c", "http://example.com/d#section", "http://other.com/x"],
        )),
    );
    let harness = Harness::builder().fetcher(fetcher).build();
    harness.seed("http://example.com/a", 0).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Acked);

    let children = harness.children();
    let urls: Vec<&str> = children.iter().map(|t| t.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "http://example.com/b",
            "http://example.com/c",
            "http://example.com/d"
        ]
    );
    assert!(children.iter().all(|t| t.depth == 1));
    assert!(harness.dedup.contains(DedupSet::Seen, "http://example.com/b"));
    assert!(!harness.dedup.contains(DedupSet::Seen, "http://other.com/x"));

    let results = harness.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "http://example.com/a");
    assert_eq!(results[0].body, "page a body");
    assert_eq!(results[0].meta.domain, "example.com");
    assert_eq!(results[0].meta.extraction_mode, ExtractionMode::Static);
    assert_eq!(results[0].meta.content_hash, content_hash("page a body"));
    assert!(results[0].html.is_none());
}

#[tokio::test]
async fn test_children_at_max_depth_do_not_expand() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(
        "http://example.com/b",
        Ok(page("http://example.com/b", "leaf", &["/c", "/d"])),
    );
    let harness = Harness::builder().fetcher(fetcher).build();
    harness.seed("http://example.com/b", 1).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Acked);
    assert!(harness.children().is_empty());
    assert_eq!(harness.results().len(), 1);
}

#[tokio::test]
async fn test_depth_beyond_max_is_never_fetched() {
    let harness = Harness::builder().build();
    harness.seed("http://example.com/deep", 2).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Acked);
    assert_eq!(harness.fetcher.total_calls(), 0);
    assert!(harness.results().is_empty());
}

#[tokio::test]
async fn test_robots_disallow_is_a_silent_ack() {
    let harness = Harness::builder()
        .policy(StaticPolicy::deny(&["http://example.com/private"]))
        .build();
    harness.seed("http://example.com/private", 0).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Acked);
    assert_eq!(harness.fetcher.total_calls(), 0);
    assert!(harness.backend.messages(DLQ).is_empty());
}

#[tokio::test]
async fn test_invalid_task_goes_to_dead_letter_without_retry() {
    let harness = Harness::builder().build();
    harness
        .backend
        .push(
            INITIAL,
            WireMessage::new(r#"{"url":"not a url","depth":0}"#, None),
        )
        .await
        .unwrap();
    harness
        .backend
        .push(INITIAL, WireMessage::new("{ definitely not json", None))
        .await
        .unwrap();

    for _ in 0..2 {
        let (_, state) = harness.deliver_next().await.unwrap();
        assert_eq!(state, DeliveryState::Dead);
    }

    let dead = harness.backend.messages(DLQ);
    assert_eq!(dead.len(), 2);
    assert!(dead
        .iter()
        .all(|m| m.last_error.as_deref().unwrap().starts_with("validation")));
    assert_eq!(harness.promote_all().await, 0);
    assert_eq!(harness.fetcher.total_calls(), 0);
}

#[tokio::test]
async fn test_transient_failures_then_success_ends_acked() {
    let url = "http://example.com/flaky";
    let fetcher = ScriptedFetcher::new();
    fetcher.respond_sequence(
        url,
        vec![
            Err(FetchError::Timeout("navigation".into())),
            Err(FetchError::Status(503)),
            Ok(page(url, "finally", &[])),
        ],
    );
    let harness = Harness::builder().fetcher(fetcher).max_attempts(3).build();
    harness.seed(url, 0).await;

    let (first, state) = harness.deliver_next().await.unwrap();
    assert_eq!(first.attempts, 0);
    assert_eq!(state, DeliveryState::Retrying(1));
    assert!(!harness.dedup.contains(DedupSet::Inflight, url));
    assert_eq!(harness.promote_all().await, 1);

    let (second, state) = harness.deliver_next().await.unwrap();
    assert_eq!(second.attempts, 1);
    assert_eq!(state, DeliveryState::Retrying(2));
    harness.promote_all().await;

    let (last, state) = harness.deliver_next().await.unwrap();
    assert_eq!(last.attempts, 2);
    assert_eq!(state, DeliveryState::Acked);
    assert_eq!(harness.fetcher.calls(url), 3);
    assert_eq!(harness.results().len(), 1);
    assert!(harness.backend.messages(DLQ).is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_end_dead() {
    let url = "http://example.com/down";
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(url, Err(FetchError::Status(502)));
    let harness = Harness::builder().fetcher(fetcher).max_attempts(3).build();
    harness.seed(url, 0).await;

    let mut states = Vec::new();
    while let Some((_, state)) = harness.deliver_next().await {
        states.push(state);
        harness.promote_all().await;
    }

    assert_eq!(
        states,
        vec![
            DeliveryState::Retrying(1),
            DeliveryState::Retrying(2),
            DeliveryState::Dead
        ]
    );
    let dead = harness.backend.messages(DLQ);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(harness.fetcher.calls(url), 3);
}

#[tokio::test]
async fn test_permanent_fetch_failure_goes_straight_to_dead_letter() {
    let url = "http://example.com/missing";
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(url, Err(FetchError::Status(404)));
    let harness = Harness::builder().fetcher(fetcher).build();
    harness.seed(url, 0).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Dead);
    assert_eq!(harness.backend.messages(DLQ)[0].attempts, 0);
}

#[tokio::test]
async fn test_unsupported_content_is_acked() {
    let url = "http://example.com/report.pdf";
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(
        url,
        Err(FetchError::UnsupportedContent("application/pdf".into())),
    );
    let harness = Harness::builder().fetcher(fetcher).build();
    harness.seed(url, 0).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Acked);
    assert!(harness.results().is_empty());
}

#[tokio::test]
async fn test_duplicate_content_is_acked_without_publish_or_expansion() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(
        "http://example.com/one",
        Ok(page("http://example.com/one", "same text", &[])),
    );
    fetcher.respond(
        "http://example.com/two",
        Ok(page("http://example.com/two", "same text", &["/three"])),
    );
    let harness = Harness::builder().fetcher(fetcher).build();
    harness.seed("http://example.com/one", 0).await;
    harness.seed("http://example.com/two", 0).await;

    let (_, first) = harness.deliver_next().await.unwrap();
    let (_, second) = harness.deliver_next().await.unwrap();
    assert_eq!(first, DeliveryState::Acked);
    assert_eq!(second, DeliveryState::Acked);

    let results = harness.results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "http://example.com/one");
    assert!(harness.children().is_empty());
    assert!(!harness.dedup.contains(DedupSet::Seen, "http://example.com/three"));
    assert_eq!(
        harness
            .dedup
            .fingerprint_owner(&results[0].meta.fingerprint)
            .as_deref(),
        Some("http://example.com/one")
    );
}

#[tokio::test]
async fn test_admission_refusal_defers_without_fetching() {
    let url = "http://example.com/busy";
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(url, Ok(page(url, "busy page", &[])));
    let harness = Harness::builder()
        .fetcher(fetcher)
        .limits(OriginLimits::new(1))
        .build();
    let held = harness
        .admission
        .try_acquire("http://example.com")
        .await
        .unwrap()
        .expect("slot should be free");
    harness.seed(url, 0).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Retrying(0));
    assert_eq!(harness.fetcher.total_calls(), 0);
    let deferred = harness.backend.delayed(&harness.bus.retry_policy().short.name);
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred[0].message.attempts, 0);
    assert_eq!(deferred[0].message.deferrals, 1);

    harness.admission.release(&held).await.unwrap();
    harness.promote_all().await;
    let (envelope, state) = harness.deliver_next().await.unwrap();
    assert_eq!(envelope.deferrals, 1);
    assert_eq!(state, DeliveryState::Acked);
}

#[tokio::test]
async fn test_fetcher_panic_is_retried_and_slot_released() {
    let url = "http://example.com/boom";
    let fetcher = ScriptedFetcher::new();
    fetcher.panic_on(url);
    let harness = Harness::builder().fetcher(fetcher).build();
    harness.seed(url, 0).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Retrying(1));
    assert_eq!(
        harness
            .admission
            .in_flight("http://example.com")
            .await
            .unwrap(),
        0
    );
    assert!(!harness.dedup.contains(DedupSet::Inflight, url));
}

#[tokio::test]
async fn test_concurrent_fetches_respect_origin_limit() {
    let fetcher = ScriptedFetcher::with_delay(Duration::from_millis(50));
    for i in 0..6 {
        let url = format!("http://example.com/p{}", i);
        fetcher.respond(&url, Ok(page(&url, &format!("body {}", i), &[])));
    }
    let harness = Harness::builder()
        .fetcher(fetcher)
        .limits(OriginLimits::new(2))
        .build();
    for i in 0..6 {
        harness.seed(&format!("http://example.com/p{}", i), 0).await;
    }

    let mut envelopes = Vec::new();
    while let Some(envelope) = harness.next_delivery().await {
        envelopes.push(envelope);
    }
    let outcomes = futures::future::join_all(
        envelopes
            .iter()
            .map(|envelope| harness.worker.handle(envelope)),
    )
    .await;

    assert_eq!(outcomes.len(), 6);
    assert!(harness.fetcher.peak_concurrency() <= 2);
    assert!(harness.fetcher.total_calls() >= 2);
    assert_eq!(
        harness
            .admission
            .in_flight("http://example.com")
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_inflight_collision_defers_instead_of_acking() {
    let url = "http://example.com/page";
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(url, Ok(page(url, "page body", &[])));
    let harness = Harness::builder().fetcher(fetcher).build();
    // marker left behind by a consumer that crashed mid-fetch
    assert!(harness
        .dedup
        .add_if_absent(DedupSet::Inflight, url)
        .await
        .unwrap());
    harness.seed(url, 0).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Retrying(0));
    assert_eq!(harness.fetcher.total_calls(), 0);
    assert!(harness.backend.messages(DLQ).is_empty());
    let deferred = harness.backend.delayed(&harness.bus.retry_policy().short.name);
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred[0].message.attempts, 0);
    assert_eq!(deferred[0].message.deferrals, 1);

    // the marker expires, the deferred task is processed
    harness.dedup.remove(DedupSet::Inflight, url).await.unwrap();
    harness.promote_all().await;
    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Acked);
    assert_eq!(harness.fetcher.calls(url), 1);
    assert_eq!(harness.results().len(), 1);
}

#[tokio::test]
async fn test_empty_pages_are_not_content_duplicates() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(
        "http://example.com/a",
        Ok(page("http://example.com/a", "", &["/x"])),
    );
    fetcher.respond(
        "http://example.com/b",
        Ok(page("http://example.com/b", "", &["/y"])),
    );
    let harness = Harness::builder().fetcher(fetcher).build();
    harness.seed("http://example.com/a", 0).await;
    harness.seed("http://example.com/b", 0).await;

    let (_, first) = harness.deliver_next().await.unwrap();
    let (_, second) = harness.deliver_next().await.unwrap();
    assert_eq!(first, DeliveryState::Acked);
    assert_eq!(second, DeliveryState::Acked);

    assert_eq!(harness.results().len(), 2);
    let children: Vec<String> = harness.children().into_iter().map(|t| t.url).collect();
    assert_eq!(
        children,
        vec![
            "http://example.com/x".to_string(),
            "http://example.com/y".to_string()
        ]
    );
    assert!(!harness.dedup.contains(DedupSet::ContentHash, &content_hash("")));
}

#[tokio::test]
async fn test_seen_store_failure_retries_instead_of_dropping_links() {
    let url = "http://example.com/hub";
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(url, Ok(page(url, "hub body", &["/leaf"])));
    let harness = Harness::builder().fetcher(fetcher).failing_seen().build();
    harness.seed(url, 0).await;

    let (_, state) = harness.deliver_next().await.unwrap();
    assert_eq!(state, DeliveryState::Retrying(1));
    assert!(harness.children().is_empty());
    assert!(harness.results().is_empty());
    // rolled back so the retry is not mistaken for duplicate content
    assert!(!harness
        .dedup
        .contains(DedupSet::ContentHash, &content_hash("hub body")));
    assert!(!harness.dedup.contains(DedupSet::Inflight, url));
}
