use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::core::DownloadCore;
use super::error::DownloadError;
use super::models::{BatchOptions, BatchResult, Task, TaskError, TaskStatus, aggregate_progress};
use crate::parser::{is_well_formed, sanitize_input};

// 等待调度的任务
struct QueuedJob {
    task_id: String,
    batch: Arc<BatchContext>,
    done: oneshot::Sender<()>,
}

struct BatchContext {
    options: BatchOptions,
    task_ids: Vec<String>,
}

#[derive(Default)]
struct SchedulerState {
    backlog: VecDeque<QueuedJob>,
    active: usize,
    order: Vec<String>, // 创建顺序
}

struct ManagerInner {
    core: DownloadCore,
    concurrency: usize,
    tasks: DashMap<String, Task>,
    tokens: DashMap<String, CancellationToken>,
    state: Mutex<SchedulerState>,
}

/// 批量下载队列
///
/// 每个 URL 一个任务，最多同时运行 `concurrency` 个，按提交顺序调度。
/// 调度状态（待办队列、运行数）只在 `state` 锁内修改，所以任何时刻
/// 处于 Downloading 的任务数都不会超过上限。单个任务失败不影响其它任务。
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

/// 已入队的一批任务，`wait` 等待全部结束并汇总结果
pub struct BatchHandle {
    task_ids: Vec<String>,
    done: Vec<oneshot::Receiver<()>>,
    manager: DownloadManager,
}

impl BatchHandle {
    pub fn task_ids(&self) -> &[String] {
        &self.task_ids
    }

    pub async fn wait(self) -> BatchResult {
        for rx in self.done {
            // 发送端被丢弃也说明任务已经结束
            let _ = rx.await;
        }
        let tasks: Vec<Task> = self
            .task_ids
            .iter()
            .filter_map(|id| self.manager.get_task_status(id))
            .collect();
        let result = BatchResult::from_tasks(&tasks);
        info!(
            total = result.total,
            success = result.success_count,
            failed = result.failed_count,
            canceled = result.canceled_count,
            "批量下载结束"
        );
        result
    }
}

impl DownloadManager {
    pub fn new(core: DownloadCore, concurrency: usize) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                core,
                concurrency: concurrency.max(1),
                tasks: DashMap::new(),
                tokens: DashMap::new(),
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    pub fn core(&self) -> &DownloadCore {
        &self.inner.core
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    /// 提交一批 URL 并等待全部结束
    pub async fn submit(&self, urls: Vec<String>, options: BatchOptions) -> BatchResult {
        self.enqueue(urls, options).await.wait().await
    }

    /// 只入队不等待，返回的句柄可以稍后等待结果
    pub async fn enqueue(&self, urls: Vec<String>, mut options: BatchOptions) -> BatchHandle {
        if urls.len() > 1 && options.fetch.filename.take().is_some() {
            warn!("批量下载忽略指定的文件名");
        }

        let tasks: Vec<Task> = urls.into_iter().map(Task::new).collect();
        let task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let batch = Arc::new(BatchContext {
            options,
            task_ids: task_ids.clone(),
        });

        let mut receivers = Vec::with_capacity(tasks.len());
        {
            let mut state = self.inner.state.lock().await;
            for task in tasks {
                let (tx, rx) = oneshot::channel();
                receivers.push(rx);
                debug!(task_id = %task.id, url = %task.url, "任务入队");

                state.order.push(task.id.clone());
                self.inner
                    .tokens
                    .insert(task.id.clone(), CancellationToken::new());
                state.backlog.push_back(QueuedJob {
                    task_id: task.id.clone(),
                    batch: Arc::clone(&batch),
                    done: tx,
                });
                self.inner.tasks.insert(task.id.clone(), task);
            }
        }
        info!("已提交 {} 个下载任务", task_ids.len());

        self.pump().await;

        BatchHandle {
            task_ids,
            done: receivers,
            manager: self.clone(),
        }
    }

    pub fn get_task_status(&self, id: &str) -> Option<Task> {
        self.inner.tasks.get(id).map(|task| task.clone())
    }

    /// 本队列创建的全部任务，按创建顺序
    pub async fn list_tasks(&self) -> Vec<Task> {
        let state = self.inner.state.lock().await;
        state
            .order
            .iter()
            .filter_map(|id| self.get_task_status(id))
            .collect()
    }

    pub async fn active_count(&self) -> usize {
        self.inner.state.lock().await.active
    }

    pub async fn aggregate_progress(&self) -> u8 {
        aggregate_progress(&self.list_tasks().await)
    }

    /// 取消任务
    ///
    /// 等待中的任务直接移出队列并标记为 Canceled；下载中的任务只设置取消标记
    /// 并触发取消令牌，最终仍会变成 Completed 或 Failed。两种情况都返回 true，
    /// 已结束或不存在的任务返回 false。
    pub async fn cancel(&self, id: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(status) = self.inner.tasks.get(id).map(|task| task.status) else {
            return false;
        };

        match status {
            TaskStatus::Pending => {
                let Some(pos) = state.backlog.iter().position(|job| job.task_id == id) else {
                    return false;
                };
                let Some(job) = state.backlog.remove(pos) else {
                    return false;
                };
                self.update(id, |task| task.status = TaskStatus::Canceled);
                self.inner.tokens.remove(id);
                let _ = job.done.send(());
                info!(task_id = %id, "已取消等待中的任务");
                true
            }
            TaskStatus::Downloading => {
                self.update(id, |task| task.cancel_requested = true);
                if let Some(token) = self.inner.tokens.get(id) {
                    token.cancel();
                }
                info!(task_id = %id, "已请求取消下载中的任务");
                true
            }
            _ => false,
        }
    }

    fn update<F: FnOnce(&mut Task)>(&self, id: &str, f: F) {
        if let Some(mut task) = self.inner.tasks.get_mut(id) {
            f(&mut task);
            task.touch();
        }
    }

    fn fail(&self, id: &str, err: &DownloadError) {
        self.update(id, |task| {
            task.status = TaskStatus::Failed;
            task.error = Some(TaskError::from(err));
        });
    }

    // 在运行数未达上限时从队首取任务。无效或不支持的 URL 直接失败，不占用名额
    async fn pump(&self) {
        let mut state = self.inner.state.lock().await;

        while state.active < self.inner.concurrency {
            let Some(job) = state.backlog.pop_front() else {
                break;
            };
            let Some(raw_url) = self.get_task_status(&job.task_id).map(|task| task.url) else {
                continue;
            };

            let url = sanitize_input(&raw_url);
            let rejected = if !is_well_formed(&url) {
                Some(DownloadError::InvalidUrl(raw_url.clone()))
            } else if !self.inner.core.registry().is_supported(&url) {
                Some(DownloadError::UnsupportedPlatform(raw_url.clone()))
            } else {
                None
            };

            if let Some(err) = rejected {
                warn!(task_id = %job.task_id, url = %raw_url, error = %err, "任务校验失败");
                self.fail(&job.task_id, &err);
                self.inner.tokens.remove(&job.task_id);
                let _ = job.done.send(());
                continue;
            }

            self.update(&job.task_id, |task| task.status = TaskStatus::Downloading);
            state.active += 1;
            debug!(
                task_id = %job.task_id,
                active = state.active,
                limit = self.inner.concurrency,
                "开始下载任务"
            );
            self.launch(job, url);
        }
    }

    fn launch(&self, job: QueuedJob, url: String) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_job(job, url).await;
        });
    }

    async fn run_job(&self, job: QueuedJob, url: String) {
        let QueuedJob {
            task_id,
            batch,
            done,
        } = job;
        let cancel = self
            .inner
            .tokens
            .get(&task_id)
            .map(|token| token.clone())
            .unwrap_or_default();

        if batch.options.fetch_metadata {
            match self.inner.core.get_info(&url).await {
                Ok(meta) => self.update(&task_id, |task| {
                    task.title = Some(meta.title);
                    task.duration = Some(meta.duration_seconds);
                }),
                Err(e) => warn!(task_id = %task_id, error = %e, "获取视频信息失败，继续下载"),
            }
        }

        // 回调里用调用方提交的原始URL，清理后的URL只交给调度层
        let raw_url = self
            .get_task_status(&task_id)
            .map(|task| task.url)
            .unwrap_or_else(|| url.clone());
        let mut fetch = batch.options.fetch.clone();
        fetch.progress = Some(self.progress_sink(&task_id, &raw_url, &batch));

        let retry_id = task_id.clone();
        let result = self
            .inner
            .core
            .fetch_observed(&url, &fetch, &cancel, |attempt, err| {
                debug!(task_id = %retry_id, attempt, error = %err, "任务重试");
                self.update(&retry_id, |task| task.retry_count += 1);
            })
            .await;

        match &result {
            Ok(path) => {
                self.update(&task_id, |task| {
                    task.status = TaskStatus::Completed;
                    task.progress = 100;
                    task.output_path = Some(path.clone());
                });
                info!(task_id = %task_id, "✅ 任务完成: {:?}", path);
            }
            Err(e) => {
                self.fail(&task_id, e);
                warn!(task_id = %task_id, error = %e, "❌ 任务失败");
            }
        }
        self.inner.tokens.remove(&task_id);

        {
            let mut state = self.inner.state.lock().await;
            state.active = state.active.saturating_sub(1);
        }
        let _ = done.send(());

        if let Some(on_aggregate) = &batch.options.on_aggregate {
            on_aggregate(self.batch_progress(&batch));
        }

        self.pump().await;
    }

    fn batch_progress(&self, batch: &BatchContext) -> u8 {
        let tasks: Vec<Task> = batch
            .task_ids
            .iter()
            .filter_map(|id| self.get_task_status(id))
            .collect();
        aggregate_progress(&tasks)
    }

    // 任务进度只增不减，转发给调用方的单个 URL 回调和整批回调
    fn progress_sink(
        &self,
        task_id: &str,
        url: &str,
        batch: &Arc<BatchContext>,
    ) -> crate::platform::models::ProgressSink {
        let manager = self.clone();
        let task_id = task_id.to_string();
        let url = url.to_string();
        let batch = Arc::clone(batch);

        Arc::new(move |percent: u8| {
            let percent = percent.min(100);
            let advanced = match manager.inner.tasks.get_mut(&task_id) {
                Some(mut task) if task.status == TaskStatus::Downloading && percent > task.progress => {
                    task.progress = percent;
                    task.touch();
                    true
                }
                _ => false,
            };
            if !advanced {
                return;
            }

            if let Some(on_progress) = &batch.options.on_progress {
                on_progress(&url, percent);
            }
            if let Some(on_aggregate) = &batch.options.on_aggregate {
                on_aggregate(manager.batch_progress(&batch));
            }
        })
    }
}
