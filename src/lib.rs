pub mod common;
pub mod downloader;
pub mod mcp;
pub mod parser;
pub mod platform;
pub mod post_process;

pub use common::config::AppConfig;
pub use downloader::{
    BatchOptions, BatchResult, DownloadCore, DownloadError, DownloadManager, ErrorKind,
    RetryPolicy, Task, TaskStatus,
};
pub use platform::{FetchOptions, MediaMetadata, Platform, PlatformRegistry};
