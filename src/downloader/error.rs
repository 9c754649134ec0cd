use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 错误分类，重试执行器和批量队列都按这个分类决定如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    UnsupportedPlatform,
    AuthRequired,
    FormatNotFound,
    NetworkError,
    RateLimited,
    MergeFailed,
    FileSystemError,
    Canceled,
}

impl ErrorKind {
    /// 只有网络错误和限流是暂时性的
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::NetworkError | ErrorKind::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidUrl => "InvalidUrl",
            ErrorKind::UnsupportedPlatform => "UnsupportedPlatform",
            ErrorKind::AuthRequired => "AuthRequired",
            ErrorKind::FormatNotFound => "FormatNotFound",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::MergeFailed => "MergeFailed",
            ErrorKind::FileSystemError => "FileSystemError",
            ErrorKind::Canceled => "Canceled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("不支持的平台: {0}")]
    UnsupportedPlatform(String),

    #[error("需要登录认证: {0}")]
    AuthRequired(String),

    #[error("找不到指定的格式: {0}")]
    FormatNotFound(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("请求过于频繁: {0}")]
    RateLimited(String),

    #[error("合并失败: {0}")]
    MergeFailed(String),

    #[error("文件系统错误: {0}")]
    FileSystem(String),

    #[error("任务已取消: {0}")]
    Canceled(String),
}

impl DownloadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DownloadError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            DownloadError::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            DownloadError::AuthRequired(_) => ErrorKind::AuthRequired,
            DownloadError::FormatNotFound(_) => ErrorKind::FormatNotFound,
            DownloadError::Network(_) => ErrorKind::NetworkError,
            DownloadError::RateLimited(_) => ErrorKind::RateLimited,
            DownloadError::MergeFailed(_) => ErrorKind::MergeFailed,
            DownloadError::FileSystem(_) => ErrorKind::FileSystemError,
            DownloadError::Canceled(_) => ErrorKind::Canceled,
        }
    }

    /// 不带前缀的原始错误信息
    pub fn detail(&self) -> &str {
        match self {
            DownloadError::InvalidUrl(msg)
            | DownloadError::UnsupportedPlatform(msg)
            | DownloadError::AuthRequired(msg)
            | DownloadError::FormatNotFound(msg)
            | DownloadError::Network(msg)
            | DownloadError::RateLimited(msg)
            | DownloadError::MergeFailed(msg)
            | DownloadError::FileSystem(msg)
            | DownloadError::Canceled(msg) => msg,
        }
    }

    /// 根据 HTTP 状态码归类错误
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        match status {
            reqwest::StatusCode::TOO_MANY_REQUESTS => DownloadError::RateLimited(format!(
                "请求过于频繁 (429 Too Many Requests)，URL: {}",
                url
            )),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                DownloadError::AuthRequired(format!("访问被拒绝 ({})，URL: {}", status, url))
            }
            reqwest::StatusCode::NOT_FOUND => {
                DownloadError::InvalidUrl(format!("资源不存在 (404)，URL: {}", url))
            }
            status => DownloadError::Network(format!("HTTP 请求失败，状态码: {}，URL: {}", status, url)),
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            let url = error.url().map(|u| u.as_str()).unwrap_or_default();
            return DownloadError::from_status(status, url);
        }
        if error.is_builder() {
            return DownloadError::InvalidUrl(error.to_string());
        }
        DownloadError::Network(error.to_string())
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(error: std::io::Error) -> Self {
        DownloadError::FileSystem(error.to_string())
    }
}
