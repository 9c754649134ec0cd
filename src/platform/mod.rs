use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::common::config::PlatformsConfig;
use crate::downloader::error::DownloadError;

pub mod bilibili;
pub mod errors;
pub mod models;
pub mod registry;
pub mod youtube;

pub use bilibili::BilibiliPlatform;
pub use errors::RegistryError;
pub use models::{FetchOptions, MediaFormat, MediaMetadata, PopularItem, ProgressSink};
pub use registry::PlatformRegistry;
pub use youtube::YouTubePlatform;

lazy_static! {
    static ref ILLEGAL_FILENAME_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).unwrap();
}

/// 去掉文件名中的非法字符
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = ILLEGAL_FILENAME_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}

/// 平台适配器
///
/// 负责具体平台的接口调用和流下载。调度层只通过这个 trait 和平台交互，
/// 每次调用之间不保留状态。
#[async_trait]
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    /// URL 是否由该平台处理，不应有副作用
    fn supports(&self, url: &str) -> bool;

    async fn get_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError>;

    /// 把资源下载到 `options.output_dir`，返回最终文件路径
    ///
    /// 进度通过 `options.progress` 上报，数值不能回退。`cancel` 是取消意图，
    /// 适配器在合适的等待点检查它，过了不可回头的阶段可以忽略。
    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError>;

    async fn list_popular(&self, _count: usize) -> Result<Vec<PopularItem>, DownloadError> {
        Err(DownloadError::UnsupportedPlatform(format!(
            "{} 不支持热门列表",
            self.name()
        )))
    }
}

/// 按配置注册内置平台，配置在这里校验，不合法时不会注册任何东西
///
/// 注册顺序：YouTube 在前，B站在后。
pub fn register_builtin_platforms(
    registry: &mut PlatformRegistry,
    config: &PlatformsConfig,
) -> Result<(), RegistryError> {
    let mut platforms: Vec<Arc<dyn Platform>> = Vec::new();

    let youtube = &config.youtube;
    if youtube.enabled {
        youtube
            .validate()
            .map_err(|reason| RegistryError::InvalidOptions {
                platform: youtube::PLATFORM_NAME.to_string(),
                reason,
            })?;
        platforms.push(Arc::new(YouTubePlatform::new(youtube.clone())));
    }

    let bilibili = &config.bilibili;
    if bilibili.enabled {
        bilibili
            .validate()
            .map_err(|reason| RegistryError::InvalidOptions {
                platform: bilibili::PLATFORM_NAME.to_string(),
                reason,
            })?;

        let platform = BilibiliPlatform::new(bilibili.clone()).map_err(|e| {
            RegistryError::InvalidOptions {
                platform: bilibili::PLATFORM_NAME.to_string(),
                reason: e.to_string(),
            }
        })?;
        platforms.push(Arc::new(platform));
    }

    for platform in platforms {
        registry.register_platform(platform)?;
    }

    info!("已注册平台: {:?}", registry.platform_names());
    Ok(())
}
