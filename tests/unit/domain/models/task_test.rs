// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crawlmesh::domain::models::task::{CrawlTask, Priority};

#[test]
fn test_child_task_goes_one_level_deeper() {
    // Given: 优先级种子任务
    let seed = CrawlTask::new("https://example.com/", 0).with_priority(Priority::High);

    // When: 派生子任务
    let child = seed.child("https://example.com/about");

    // Then: 深度加一，优先级回到默认
    assert_eq!(child.depth, 1);
    assert_eq!(child.priority, Priority::Normal);
    assert_eq!(child.origin().as_deref(), Some("https://example.com"));
}

#[test]
fn test_payload_keeps_url_and_depth() {
    let task = CrawlTask::new("https://example.com:8443/a?b=1", 2);
    let payload = task.to_payload().unwrap();

    let decoded: CrawlTask = serde_json::from_str(&payload).unwrap();
    assert_eq!(decoded.url, task.url);
    assert_eq!(decoded.depth, 2);
    assert_eq!(decoded.origin().as_deref(), Some("https://example.com:8443"));
}

#[test]
fn test_non_http_task_has_no_origin() {
    assert_eq!(CrawlTask::new("ftp://example.com/file", 0).origin(), None);
    assert_eq!(CrawlTask::new("not a url", 0).origin(), None);
}
