#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use media_downloader::downloader::{DownloadCore, DownloadError, DownloadManager, RetryPolicy};
use media_downloader::platform::models::{FetchOptions, MediaFormat, MediaMetadata, PopularItem};
use media_downloader::platform::{Platform, PlatformRegistry};

/// 内存中的测试平台，匹配 `https://<host>/...`
///
/// URL 中含有 `net-fail` 时总是返回网络错误，含有 `fatal` 时返回 FormatNotFound。
pub struct MockPlatform {
    name: String,
    host: String,
    delay: Duration,
    progress_steps: Vec<u8>,
    pub fetch_calls: AtomicUsize,
    pub metadata_calls: AtomicUsize,
    pub fetched: Mutex<Vec<String>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub saw_cancel: AtomicUsize,
}

impl MockPlatform {
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            delay: Duration::from_millis(10),
            progress_steps: vec![10, 40, 70],
            fetch_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            saw_cancel: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_progress_steps(mut self, steps: Vec<u8>) -> Self {
        self.progress_steps = steps;
        self
    }

    pub fn url(&self, id: &str) -> String {
        format!("https://{}/video/{}", self.host, id)
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    fn check(url: &str) -> Result<(), DownloadError> {
        if url.contains("net-fail") {
            return Err(DownloadError::Network("连接被重置".to_string()));
        }
        if url.contains("fatal") {
            return Err(DownloadError::FormatNotFound("没有可用的格式".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, url: &str) -> bool {
        url.starts_with(&format!("https://{}/", self.host))
    }

    async fn get_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Self::check(url)?;
        let id = url.rsplit('/').next().unwrap_or_default().to_string();
        Ok(MediaMetadata {
            title: format!("标题 {}", id),
            id,
            description: None,
            duration_seconds: 42,
            thumbnail_url: None,
            formats: vec![MediaFormat {
                format_id: "best".to_string(),
                quality: "1080p".to_string(),
                container: "mp4".to_string(),
                has_video: true,
                has_audio: true,
                size_bytes: None,
            }],
        })
    }

    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(url.to_string());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let result = async {
            Self::check(url)?;
            for step in &self.progress_steps {
                tokio::time::sleep(self.delay).await;
                if cancel.is_cancelled() {
                    self.saw_cancel.fetch_add(1, Ordering::SeqCst);
                    return Err(DownloadError::Canceled(url.to_string()));
                }
                options.report_progress(*step);
            }
            tokio::time::sleep(self.delay).await;
            options.report_progress(100);

            let name = options
                .filename
                .clone()
                .unwrap_or_else(|| format!("{}.mp4", url.rsplit('/').next().unwrap_or("video")));
            Ok::<PathBuf, DownloadError>(options.output_dir.join(name))
        }
        .await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_popular(&self, count: usize) -> Result<Vec<PopularItem>, DownloadError> {
        Ok((0..count)
            .map(|i| PopularItem {
                id: format!("p{}", i),
                title: format!("热门 {}", i),
                url: self.url(&format!("p{}", i)),
                description: None,
                thumbnail_url: None,
                view_count: Some(1000 - i as u64),
                upload_date: None,
            })
            .collect())
    }
}

/// 没有实现热门列表的平台
pub struct BarePlatform;

#[async_trait]
impl Platform for BarePlatform {
    fn name(&self) -> &str {
        "bare"
    }

    fn supports(&self, url: &str) -> bool {
        url.contains("bare.test")
    }

    async fn get_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        Err(DownloadError::InvalidUrl(url.to_string()))
    }

    async fn fetch(
        &self,
        url: &str,
        _options: &FetchOptions,
        _cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        Err(DownloadError::InvalidUrl(url.to_string()))
    }
}

pub fn registry_with(platform: Arc<MockPlatform>) -> Arc<PlatformRegistry> {
    let mut registry = PlatformRegistry::new();
    registry.register_platform(platform).unwrap();
    Arc::new(registry)
}

/// 重试间隔很短的调度器，测试不用等待
pub fn fast_core(registry: Arc<PlatformRegistry>) -> DownloadCore {
    DownloadCore::new(registry).with_policies(
        RetryPolicy::new(3, Duration::from_millis(1)),
        RetryPolicy::new(3, Duration::from_millis(1)),
    )
}

pub fn manager_with(platform: Arc<MockPlatform>, concurrency: usize) -> DownloadManager {
    DownloadManager::new(fast_core(registry_with(platform)), concurrency)
}

pub fn fetch_options() -> FetchOptions {
    FetchOptions::new(std::env::temp_dir().join("media-downloader-tests"))
}
