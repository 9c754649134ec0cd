use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use media_downloader::downloader::{DownloadError, RetryPolicy, retry_with_policy, run_with_retry};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_succeeds_on_third_attempt_after_linear_backoff() {
    let policy = RetryPolicy::new(3, Duration::from_millis(2000));
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();

    let counter = Arc::clone(&calls);
    let result = run_with_retry(&policy, move || {
        let counter = Arc::clone(&counter);
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(DownloadError::Network(format!("第 {} 次失败", n)))
            } else {
                Ok("done")
            }
        }
    })
    .await;

    assert_eq!(result, Ok("done"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= Duration::from_millis(6000));
}

#[tokio::test(start_paused = true)]
async fn test_always_retryable_failure_gives_up_after_max_attempts() {
    let policy = RetryPolicy::new(3, Duration::from_millis(2000));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result: Result<(), DownloadError> = run_with_retry(&policy, move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(DownloadError::RateLimited("请求过快".to_string()))
        }
    })
    .await;

    assert_eq!(result, Err(DownloadError::RateLimited("请求过快".to_string())));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_is_not_retried() {
    let policy = RetryPolicy::new(5, Duration::from_millis(2000));
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();

    let counter = Arc::clone(&calls);
    let result: Result<(), DownloadError> = run_with_retry(&policy, move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(DownloadError::AuthRequired("需要大会员".to_string()))
        }
    })
    .await;

    assert!(matches!(result, Err(DownloadError::AuthRequired(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < Duration::from_millis(2000));
}

#[tokio::test(start_paused = true)]
async fn test_on_retry_sees_each_failed_attempt() {
    let policy = RetryPolicy::new(4, Duration::from_millis(100));
    let calls = Arc::new(AtomicU32::new(0));
    let mut retried = Vec::new();

    let counter = Arc::clone(&calls);
    let result: Result<u32, DownloadError> = retry_with_policy(
        &policy,
        |attempt, err: &DownloadError| retried.push((attempt, err.kind())),
        move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 4 {
                    Err(DownloadError::Network("超时".to_string()))
                } else {
                    Ok(n)
                }
            }
        },
    )
    .await;

    assert_eq!(result, Ok(4));
    let attempts: Vec<u32> = retried.iter().map(|(attempt, _)| *attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_counts_as_network_error() {
    let policy = RetryPolicy::new(2, Duration::from_millis(10))
        .with_attempt_timeout(Duration::from_secs(1));
    let calls = Arc::new(AtomicU32::new(0));

    let counter = Arc::clone(&calls);
    let result: Result<(), DownloadError> = run_with_retry(&policy, move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    })
    .await;

    assert!(matches!(result, Err(DownloadError::Network(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
