use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::DownloadError;
use super::retry::{RetryPolicy, retry_with_policy, run_with_retry};
use crate::common::config::DownloadSettings;
use crate::parser::sanitize_input;
use crate::platform::models::{FetchOptions, MediaMetadata, PopularItem};
use crate::platform::{Platform, PlatformRegistry};

/// 单个 URL 的调度：通过注册表找到平台，再在重试执行器里调用平台
///
/// 获取元数据和完整下载使用不同的重试策略。进度回调原样透传给平台，
/// 不做任何换算。
#[derive(Clone)]
pub struct DownloadCore {
    registry: Arc<PlatformRegistry>,
    metadata_policy: RetryPolicy,
    transfer_policy: RetryPolicy,
}

impl DownloadCore {
    pub fn new(registry: Arc<PlatformRegistry>) -> Self {
        Self {
            registry,
            metadata_policy: RetryPolicy::metadata(),
            transfer_policy: RetryPolicy::transfer(),
        }
    }

    pub fn from_settings(registry: Arc<PlatformRegistry>, settings: &DownloadSettings) -> Self {
        Self::new(registry).with_policies(
            settings.metadata_retry.to_policy(),
            settings.transfer_retry.to_policy(),
        )
    }

    pub fn with_policies(mut self, metadata: RetryPolicy, transfer: RetryPolicy) -> Self {
        self.metadata_policy = metadata;
        self.transfer_policy = transfer;
        self
    }

    pub fn registry(&self) -> &Arc<PlatformRegistry> {
        &self.registry
    }

    pub fn platform_names(&self) -> Vec<String> {
        self.registry.platform_names()
    }

    pub fn is_supported(&self, url: &str) -> bool {
        self.registry.is_supported(&sanitize_input(url))
    }

    fn resolve(&self, url: &str) -> Result<Arc<dyn Platform>, DownloadError> {
        let platform = self
            .registry
            .resolve(url)
            .ok_or_else(|| DownloadError::UnsupportedPlatform(url.to_string()))?;
        debug!("{} -> {}", url, platform.name());
        Ok(platform)
    }

    pub async fn get_info(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        let url = sanitize_input(url);
        let platform = self.resolve(&url)?;
        let platform = &platform;
        let url = url.as_str();

        run_with_retry(&self.metadata_policy, move || async move {
            platform.get_metadata(url).await
        })
        .await
    }

    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<PathBuf, DownloadError> {
        self.fetch_observed(url, options, &CancellationToken::new(), |_, _| {})
            .await
    }

    /// 带取消令牌的下载，`on_retry` 在每次重试前被调用（参数为已失败的尝试次数）
    pub async fn fetch_observed<R>(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
        on_retry: R,
    ) -> Result<PathBuf, DownloadError>
    where
        R: FnMut(u32, &DownloadError),
    {
        let url = sanitize_input(url);
        let platform = self.resolve(&url)?;
        let platform = &platform;
        let url = url.as_str();

        let output = retry_with_policy(&self.transfer_policy, on_retry, move || async move {
            if cancel.is_cancelled() {
                return Err(DownloadError::Canceled(url.to_string()));
            }
            platform.fetch(url, options, cancel).await
        })
        .await?;

        info!("下载完成: {} -> {:?}", url, output);
        Ok(output)
    }

    /// 按平台名获取热门列表，平台未实现时返回 UnsupportedPlatform
    pub async fn popular(
        &self,
        platform_name: &str,
        count: usize,
    ) -> Result<Vec<PopularItem>, DownloadError> {
        let platform = self
            .registry
            .create(platform_name)
            .ok_or_else(|| DownloadError::UnsupportedPlatform(platform_name.to_string()))?;
        let platform = &platform;

        run_with_retry(&self.metadata_policy, move || async move {
            platform.list_popular(count).await
        })
        .await
    }
}
