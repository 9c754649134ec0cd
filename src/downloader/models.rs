use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{DownloadError, ErrorKind};
use crate::platform::models::FetchOptions;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&DownloadError> for TaskError {
    fn from(err: &DownloadError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// 一个 URL 对应的下载任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub url: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub title: Option<String>,
    pub duration: Option<u64>,
    pub output_path: Option<PathBuf>,
    pub error: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub retry_count: u32,
    /// 下载中被请求取消，只是意图标记
    pub cancel_requested: bool,
}

impl Task {
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            status: TaskStatus::Pending,
            progress: 0,
            title: None,
            duration: None,
            output_path: None,
            error: None,
            created_at: now,
            updated_at: now,
            retry_count: 0,
            cancel_requested: false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// 单个 URL 的进度回调 (url, 百分比)
pub type UrlProgressSink = Arc<dyn Fn(&str, u8) + Send + Sync>;
/// 整批的平均进度回调
pub type AggregateProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

/// 一批下载共用的选项
#[derive(Clone)]
pub struct BatchOptions {
    /// 每个任务的下载选项模板，进度回调会被队列替换
    pub fetch: FetchOptions,
    /// 参数中的 URL 与提交时的字符串一致，未经清理
    pub on_progress: Option<UrlProgressSink>,
    /// 多个任务并发上报，整批平均值不保证单调，可能出现回落
    pub on_aggregate: Option<AggregateProgressSink>,
    /// 下载前先获取标题和时长，失败不影响下载
    pub fetch_metadata: bool,
}

impl BatchOptions {
    pub fn new(fetch: FetchOptions) -> Self {
        Self {
            fetch,
            on_progress: None,
            on_aggregate: None,
            fetch_metadata: true,
        }
    }

    pub fn with_progress<F>(mut self, sink: F) -> Self
    where
        F: Fn(&str, u8) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(sink));
        self
    }

    pub fn with_aggregate_progress<F>(mut self, sink: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.on_aggregate = Some(Arc::new(sink));
        self
    }

    pub fn with_metadata(mut self, fetch_metadata: bool) -> Self {
        self.fetch_metadata = fetch_metadata;
        self
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("fetch", &self.fetch)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_aggregate", &self.on_aggregate.is_some())
            .field("fetch_metadata", &self.fetch_metadata)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchItemInfo {
    pub title: String,
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchItemResult {
    pub task_id: String,
    pub url: String,
    pub success: bool,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
    pub output_path: Option<PathBuf>,
    pub info: Option<BatchItemInfo>,
}

impl From<&Task> for BatchItemResult {
    fn from(task: &Task) -> Self {
        let success = task.status == TaskStatus::Completed;
        let message = match (&task.status, &task.error) {
            (TaskStatus::Completed, _) => "下载成功".to_string(),
            (TaskStatus::Canceled, _) => "已取消".to_string(),
            (_, Some(err)) => err.message.clone(),
            (status, None) => format!("任务未完成: {}", status),
        };

        Self {
            task_id: task.id.clone(),
            url: task.url.clone(),
            success,
            message,
            error_kind: task.error.as_ref().map(|err| err.kind),
            output_path: task.output_path.clone(),
            info: task.title.as_ref().map(|title| BatchItemInfo {
                title: title.clone(),
                duration: task.duration,
            }),
        }
    }
}

/// 一次批量提交的结果，`results` 与输入 URL 顺序一致
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchResult {
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub canceled_count: usize,
    pub results: Vec<BatchItemResult>,
}

impl BatchResult {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let results: Vec<BatchItemResult> = tasks.iter().map(BatchItemResult::from).collect();
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();

        Self {
            total: results.len(),
            success_count: count(TaskStatus::Completed),
            failed_count: count(TaskStatus::Failed),
            canceled_count: count(TaskStatus::Canceled),
            results,
        }
    }
}

/// 整批的平均进度，已完成的任务按 100 计
pub fn aggregate_progress(tasks: &[Task]) -> u8 {
    if tasks.is_empty() {
        return 0;
    }
    let sum: u64 = tasks
        .iter()
        .map(|task| match task.status {
            TaskStatus::Completed => 100,
            _ => task.progress.min(100) as u64,
        })
        .sum();
    (sum / tasks.len() as u64) as u8
}
