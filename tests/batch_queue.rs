mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{MockPlatform, fetch_options, manager_with};
use media_downloader::downloader::{BatchOptions, ErrorKind, TaskStatus};

fn batch() -> BatchOptions {
    BatchOptions::new(fetch_options())
}

#[tokio::test]
async fn test_every_url_gets_a_result_in_input_order() {
    let platform = Arc::new(MockPlatform::new("mock", "media.test"));
    let manager = manager_with(Arc::clone(&platform), 2);
    let urls: Vec<String> = (0..5).map(|i| platform.url(&format!("v{}", i))).collect();

    let result = manager.submit(urls.clone(), batch()).await;

    assert_eq!(result.total, 5);
    assert_eq!(result.success_count, 5);
    assert_eq!(result.failed_count, 0);
    let result_urls: Vec<String> = result.results.iter().map(|r| r.url.clone()).collect();
    assert_eq!(result_urls, urls);
    for item in &result.results {
        assert!(item.success);
        assert_eq!(item.message, "下载成功");
        assert!(item.info.is_some());
    }
    assert_eq!(manager.aggregate_progress().await, 100);
}

#[tokio::test]
async fn test_concurrency_ceiling_is_never_exceeded() {
    let platform =
        Arc::new(MockPlatform::new("mock", "media.test").with_delay(Duration::from_millis(15)));
    let manager = manager_with(Arc::clone(&platform), 2);
    let urls: Vec<String> = (0..6).map(|i| platform.url(&format!("v{}", i))).collect();

    let handle = manager.enqueue(urls, batch()).await;
    loop {
        let tasks = manager.list_tasks().await;
        let downloading = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Downloading)
            .count();
        assert!(downloading <= 2, "同时下载 {} 个", downloading);
        if tasks.iter().all(|t| t.is_terminal()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(3)).await;
    }
    let result = handle.wait().await;

    assert_eq!(result.success_count, 6);
    assert!(platform.max_active.load(Ordering::SeqCst) <= 2);
    assert_eq!(manager.active_count().await, 0);
}

#[tokio::test]
async fn test_unsupported_url_fails_without_downloading() {
    let platform = Arc::new(MockPlatform::new("mock", "media.test"));
    let manager = manager_with(Arc::clone(&platform), 2);
    let good = platform.url("ok");
    let foreign = "https://elsewhere.test/video/1".to_string();

    let result = manager
        .submit(vec![foreign.clone(), good.clone()], batch())
        .await;

    assert_eq!(result.success_count, 1);
    assert_eq!(result.failed_count, 1);
    let failed = &result.results[0];
    assert!(!failed.success);
    assert_eq!(failed.error_kind, Some(ErrorKind::UnsupportedPlatform));
    assert_eq!(platform.fetched_urls(), vec![good]);

    let task = manager.get_task_status(&failed.task_id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.progress, 0);
}

#[tokio::test]
async fn test_malformed_url_is_reported_as_invalid() {
    let platform = Arc::new(MockPlatform::new("mock", "media.test"));
    let manager = manager_with(Arc::clone(&platform), 2);

    let result = manager
        .submit(vec![platform.url("a"), "invalid-id".to_string()], batch())
        .await;

    assert_eq!(result.total, 2);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failed_count, 1);
    let failed: Vec<_> = result.results.iter().filter(|r| !r.success).collect();
    assert!(failed[0].url.contains("invalid-id"));
    assert_eq!(failed[0].error_kind, Some(ErrorKind::InvalidUrl));
}

#[tokio::test]
async fn test_unknown_task_id_has_no_status() {
    let platform = Arc::new(MockPlatform::new("mock", "media.test"));
    let manager = manager_with(platform, 1);

    assert!(manager.get_task_status("no-such-task").is_none());
    assert!(!manager.cancel("no-such-task").await);
    assert!(manager.list_tasks().await.is_empty());
}

#[tokio::test]
async fn test_canceling_pending_task_removes_it_from_the_queue() {
    let platform =
        Arc::new(MockPlatform::new("mock", "media.test").with_delay(Duration::from_millis(30)));
    let manager = manager_with(Arc::clone(&platform), 1);
    let urls: Vec<String> = ["a", "b", "c"].iter().map(|id| platform.url(id)).collect();

    let handle = manager.enqueue(urls.clone(), batch()).await;
    let last = handle.task_ids()[2].clone();
    assert_eq!(
        manager.get_task_status(&last).map(|t| t.status),
        Some(TaskStatus::Pending)
    );

    assert!(manager.cancel(&last).await);
    let result = handle.wait().await;

    assert_eq!(result.success_count, 2);
    assert_eq!(result.canceled_count, 1);
    assert_eq!(result.results[2].message, "已取消");
    assert!(!platform.fetched_urls().contains(&urls[2]));

    // 已结束的任务不能再取消
    assert!(!manager.cancel(&last).await);
}

#[tokio::test]
async fn test_canceling_running_task_sets_flag_and_fires_token() {
    let platform =
        Arc::new(MockPlatform::new("mock", "media.test").with_delay(Duration::from_millis(40)));
    let manager = manager_with(Arc::clone(&platform), 1);

    let handle = manager
        .enqueue(vec![platform.url("long")], batch().with_metadata(false))
        .await;
    let id = handle.task_ids()[0].clone();

    while platform.fetch_calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(manager.cancel(&id).await);
    let result = handle.wait().await;

    let task = manager.get_task_status(&id).unwrap();
    assert!(task.cancel_requested);
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.map(|e| e.kind), Some(ErrorKind::Canceled));
    assert_eq!(result.failed_count, 1);
    assert_eq!(platform.saw_cancel.load(Ordering::SeqCst), 1);
    // 取消不会触发重试
    assert_eq!(platform.fetch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_progress_is_monotonic_per_task() {
    let platform = Arc::new(
        MockPlatform::new("mock", "media.test").with_progress_steps(vec![20, 10, 50, 50]),
    );
    let manager = manager_with(Arc::clone(&platform), 2);
    let urls = vec![platform.url("x"), platform.url("y")];

    let seen: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::default();
    let aggregate: Arc<Mutex<Vec<u8>>> = Arc::default();
    let seen_sink = Arc::clone(&seen);
    let aggregate_sink = Arc::clone(&aggregate);
    let options = batch()
        .with_progress(move |url, percent| {
            seen_sink
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push(percent);
        })
        .with_aggregate_progress(move |percent| aggregate_sink.lock().unwrap().push(percent));

    let result = manager.submit(urls.clone(), options).await;
    assert_eq!(result.success_count, 2);

    let seen = seen.lock().unwrap();
    for url in &urls {
        assert_eq!(seen[url], vec![20, 50, 100]);
    }
    let aggregate = aggregate.lock().unwrap();
    assert_eq!(aggregate.last(), Some(&100));
    assert!(aggregate.iter().all(|p| *p <= 100));
}

#[tokio::test]
async fn test_retries_are_counted_on_the_task() {
    let platform = Arc::new(MockPlatform::new("mock", "media.test"));
    let manager = manager_with(Arc::clone(&platform), 1);

    let result = manager
        .submit(vec![platform.url("net-fail")], batch().with_metadata(false))
        .await;

    assert_eq!(result.failed_count, 1);
    assert_eq!(result.results[0].error_kind, Some(ErrorKind::NetworkError));
    let task = manager
        .get_task_status(&result.results[0].task_id)
        .unwrap();
    assert_eq!(task.retry_count, 2);
    assert_eq!(platform.fetch_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_fatal_failure_does_not_stop_other_tasks() {
    let platform = Arc::new(MockPlatform::new("mock", "media.test"));
    let manager = manager_with(Arc::clone(&platform), 1);
    let urls = vec![platform.url("fatal"), platform.url("after")];

    let result = manager.submit(urls, batch()).await;

    assert_eq!(result.failed_count, 1);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.results[0].error_kind, Some(ErrorKind::FormatNotFound));
    assert!(result.results[1].success);
}

#[tokio::test]
async fn test_batch_drops_the_filename_template() {
    let platform = Arc::new(MockPlatform::new("mock", "media.test"));
    let manager = manager_with(Arc::clone(&platform), 2);
    let options = BatchOptions::new(fetch_options().with_filename("same.mp4"));

    let result = manager
        .submit(vec![platform.url("one"), platform.url("two")], options)
        .await;

    let names: Vec<String> = result
        .results
        .iter()
        .filter_map(|r| r.output_path.as_ref())
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert_eq!(names, vec!["one.mp4", "two.mp4"]);
}

#[tokio::test]
async fn test_progress_callback_uses_the_submitted_url() {
    let platform = Arc::new(MockPlatform::new("mock", "www.media.test"));
    let manager = manager_with(Arc::clone(&platform), 2);
    // 两个都需要清理：缺协议、带空白
    let urls = vec![
        "www.media.test/video/x".to_string(),
        "  https://www.media.test/video/y ".to_string(),
    ];

    let seen: Arc<Mutex<HashMap<String, Vec<u8>>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let options = batch().with_progress(move |url, percent| {
        sink.lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(percent);
    });

    let result = manager.submit(urls.clone(), options).await;
    assert_eq!(result.success_count, 2);

    let seen = seen.lock().unwrap();
    let mut keys: Vec<&String> = seen.keys().collect();
    keys.sort();
    let mut expected: Vec<&String> = urls.iter().collect();
    expected.sort();
    assert_eq!(keys, expected);
    for url in &urls {
        assert_eq!(seen[url].last(), Some(&100));
    }
    // 平台收到的是清理后的URL
    let mut fetched = platform.fetched_urls();
    fetched.sort();
    assert_eq!(
        fetched,
        vec![
            "https://www.media.test/video/x".to_string(),
            "https://www.media.test/video/y".to_string(),
        ]
    );
}
