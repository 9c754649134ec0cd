//! 带退避的重试执行器
//!
//! 每次调用自己维护尝试计数，没有跨调用的共享状态。第 n 次失败后等待
//! `base_delay * n`，只有暂时性错误（网络错误、限流）才会重试。

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::error::DownloadError;

/// 用于区分暂时性错误和致命错误
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for DownloadError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// 单次尝试超过了策略规定的期限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimeout(pub Duration);

impl From<AttemptTimeout> for DownloadError {
    fn from(timeout: AttemptTimeout) -> Self {
        DownloadError::Network(format!("操作超时 ({} ms)", timeout.0.as_millis()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（包括第一次），至少为 1
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// 单次尝试的期限，超时按网络错误处理
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    // 获取元数据：次数少、间隔短
    pub fn metadata() -> Self {
        Self::new(3, Duration::from_millis(2000))
    }

    // 完整下载：耗时长，多给几次机会
    pub fn transfer() -> Self {
        Self::new(5, Duration::from_millis(2000))
    }

    /// 第 `attempt` 次（从 1 开始）失败之后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::metadata()
    }
}

/// 按策略执行异步操作，`on_retry` 在每次准备重试时被调用（参数为刚失败的尝试序号）
pub async fn retry_with_policy<F, Fut, T, E, R>(
    policy: &RetryPolicy,
    mut on_retry: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + fmt::Display + From<AttemptTimeout>,
    R: FnMut(u32, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result,
                Err(_) => Err(E::from(AttemptTimeout(limit))),
            },
            None => operation().await,
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempts = attempt, "重试后操作成功");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "操作失败，准备重试"
                );
                on_retry(attempt, &e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    error!(error = %e, attempts = attempt, "重试次数已用尽");
                } else {
                    debug!(error = %e, attempt, "不可重试的错误，直接返回");
                }
                return Err(e);
            }
        }
    }
}

pub async fn run_with_retry<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + fmt::Display + From<AttemptTimeout>,
{
    retry_with_policy(policy, |_: u32, _: &E| {}, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_linearly_with_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(2000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
