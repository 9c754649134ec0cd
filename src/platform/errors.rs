use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("平台 {0} 已经注册")]
    DuplicatePlatform(String),

    #[error("平台 {platform} 配置无效: {reason}")]
    InvalidOptions { platform: String, reason: String },
}
