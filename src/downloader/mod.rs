pub mod core;
pub mod error;
pub mod manager;
pub mod models;
pub mod retry;

pub use core::DownloadCore;
pub use error::{DownloadError, ErrorKind};
pub use manager::{BatchHandle, DownloadManager};
pub use models::{BatchOptions, BatchResult, Task, TaskStatus};
pub use retry::{IsRetryable, RetryPolicy, retry_with_policy, run_with_retry};
