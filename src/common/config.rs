use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::downloader::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/download-config.json";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件失败 {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("配置文件格式错误: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("配置无效: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download: DownloadSettings,
    pub log: LogSettings,
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub output_dir: PathBuf,
    pub concurrent_downloads: usize,
    pub metadata_retry: RetrySettings,
    pub transfer_retry: RetrySettings,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./downloads"),
            concurrent_downloads: 3,
            metadata_retry: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 2000,
                attempt_timeout_ms: None,
            },
            transfer_retry: RetrySettings {
                max_attempts: 5,
                base_delay_ms: 2000,
                attempt_timeout_ms: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            attempt_timeout_ms: None,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms));
        match self.attempt_timeout_ms {
            Some(ms) => policy.with_attempt_timeout(Duration::from_millis(ms)),
            None => policy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogSettings {
    pub fn max_level(&self) -> Result<tracing::Level, ConfigError> {
        match self.level.to_ascii_lowercase().as_str() {
            "debug" => Ok(tracing::Level::DEBUG),
            "info" => Ok(tracing::Level::INFO),
            "warn" => Ok(tracing::Level::WARN),
            "error" => Ok(tracing::Level::ERROR),
            other => Err(ConfigError::Invalid(format!("未知的日志级别: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformsConfig {
    pub youtube: YoutubeConfig,
    pub bilibili: BilibiliConfig,
}

// YouTube 平台的选项，下载交给外部 yt-dlp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    pub enabled: bool,
    pub ytdlp_path: String,
    pub cookies_file: Option<PathBuf>, // Netscape 格式的 cookies 文件
    /// 未指定格式时使用的 yt-dlp 格式表达式
    pub default_format: String,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ytdlp_path: "yt-dlp".to_string(),
            cookies_file: None,
            default_format: "bv*+ba/b".to_string(),
        }
    }
}

impl YoutubeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.ytdlp_path.trim().is_empty() {
            return Err("ytdlp_path 不能为空".to_string());
        }
        if self.default_format.trim().is_empty() {
            return Err("default_format 不能为空".to_string());
        }
        Ok(())
    }
}

// B站平台的选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilibiliConfig {
    pub enabled: bool,
    pub cookies: Option<String>, // 可选，登录后的cookie
    pub user_agent: String,
    pub quality: u32, // 清晰度 qn，112 = 1080P+
    pub api_base: String,
    pub ffmpeg_path: Option<String>, // 不填时读 FFMPEG_PATH，再退回 ffmpeg
}

impl Default for BilibiliConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookies: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            quality: 112,
            api_base: "https://api.bilibili.com/x".to_string(),
            ffmpeg_path: None,
        }
    }
}

impl BilibiliConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.user_agent.trim().is_empty() {
            return Err("user_agent 不能为空".to_string());
        }
        if url::Url::parse(&self.api_base).is_err() {
            return Err(format!("api_base 不是有效的URL: {}", self.api_base));
        }
        if self.quality == 0 {
            return Err("quality 必须大于 0".to_string());
        }
        Ok(())
    }
}

impl AppConfig {
    /// 读取配置文件，文件不存在时使用默认配置
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));

        if !path.exists() {
            debug!("配置文件不存在，使用默认配置: {:?}", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;

        info!("已加载配置文件: {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download.concurrent_downloads == 0 {
            return Err(ConfigError::Invalid("concurrent_downloads 至少为 1".to_string()));
        }
        if self.download.metadata_retry.max_attempts == 0
            || self.download.transfer_retry.max_attempts == 0
        {
            return Err(ConfigError::Invalid("max_attempts 至少为 1".to_string()));
        }
        self.log.max_level()?;
        self.platforms
            .youtube
            .validate()
            .map_err(|reason| ConfigError::Invalid(format!("youtube: {}", reason)))?;
        self.platforms
            .bilibili
            .validate()
            .map_err(|reason| ConfigError::Invalid(format!("bilibili: {}", reason)))?;
        Ok(())
    }
}
