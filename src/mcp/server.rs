use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde_json::{Value, json};
use tracing::debug;

use crate::downloader::manager::DownloadManager;
use crate::downloader::models::{BatchOptions, BatchResult};
use crate::parser::{is_well_formed, sanitize_input};
use crate::platform::models::FetchOptions;

const MEDIA_EXTENSIONS: &[&str] = &["mp4", "m4a", "mkv", "webm", "flv", "mp3"];

pub struct MediaMcpServer {
    manager: DownloadManager,
    output_dir: PathBuf,
}

impl MediaMcpServer {
    pub fn new(manager: DownloadManager, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            manager,
            output_dir: output_dir.into(),
        }
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }

    // 校验URL并返回 (清理后的URL, 平台名)
    fn check_url(&self, raw: &str) -> anyhow::Result<(String, String)> {
        let url = sanitize_input(raw);
        if !is_well_formed(&url) {
            return Err(anyhow!("无效的URL: {}", raw));
        }
        let platform = self
            .manager
            .core()
            .registry()
            .platform_for(&url)
            .ok_or_else(|| anyhow!("不支持的平台: {}", raw))?
            .to_string();
        Ok((url, platform))
    }

    fn output_dir_arg(&self, args: &Value) -> PathBuf {
        args["output_dir"]
            .as_str()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.output_dir.clone())
    }

    fn batch_json(&self, result: &BatchResult) -> Value {
        let registry = self.manager.core().registry();
        let results: Vec<Value> = result
            .results
            .iter()
            .map(|item| {
                let platform = registry.platform_for(&sanitize_input(&item.url));
                json!({
                    "task_id": item.task_id,
                    "url": item.url,
                    "success": item.success,
                    "message": item.message,
                    "error_kind": item.error_kind,
                    "output_path": item.output_path,
                    "info": item.info.as_ref().map(|info| json!({
                        "title": info.title,
                        "duration": info.duration,
                        "platform": platform,
                    })),
                })
            })
            .collect();

        json!({
            "total": result.total,
            "success_count": result.success_count,
            "failed_count": result.failed_count,
            "canceled_count": result.canceled_count,
            "results": results,
        })
    }

    // 下载单个视频，走批量队列，这样可以查询和取消
    pub async fn tool_download_video(&self, args: Value) -> anyhow::Result<Value> {
        let raw = args["url"].as_str().ok_or_else(|| anyhow!("缺少url参数"))?;
        let (url, platform) = self.check_url(raw)?;

        let mut fetch = FetchOptions::new(self.output_dir_arg(&args));
        if let Some(filename) = args["filename"].as_str() {
            fetch = fetch.with_filename(filename);
        }
        if let Some(format) = args["format"].as_str() {
            fetch = fetch.with_format(format);
        }

        let handle = self
            .manager
            .enqueue(vec![url], BatchOptions::new(fetch))
            .await;
        let task_id = handle.task_ids().first().cloned().unwrap_or_default();

        if args["wait"].as_bool() == Some(false) {
            tokio::spawn(handle.wait());
            return Ok(json!({
                "success": true,
                "message": "已开始下载",
                "task_id": task_id,
                "platform": platform,
            }));
        }

        let result = handle.wait().await;
        let item = result
            .results
            .first()
            .ok_or_else(|| anyhow!("下载结果为空"))?;

        Ok(json!({
            "success": item.success,
            "message": if item.success { "下载完成".to_string() } else { item.message.clone() },
            "task_id": task_id,
            "error_kind": item.error_kind,
            "output_path": item.output_path,
            "info": item.info.as_ref().map(|info| json!({
                "title": info.title,
                "duration": info.duration,
                "platform": platform,
            })),
        }))
    }

    pub async fn tool_batch_download_videos(&self, args: Value) -> anyhow::Result<Value> {
        let urls: Vec<String> = args["urls"]
            .as_array()
            .map(|urls| {
                urls.iter()
                    .filter_map(|url| url.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        if urls.is_empty() {
            return Err(anyhow!("URLs列表不能为空"));
        }

        let options = BatchOptions::new(FetchOptions::new(self.output_dir_arg(&args)));
        let handle = self.manager.enqueue(urls, options).await;

        if args["wait"].as_bool() == Some(false) {
            let task_ids = handle.task_ids().to_vec();
            tokio::spawn(handle.wait());
            return Ok(json!({
                "success": true,
                "message": "已开始批量下载",
                "task_ids": task_ids,
            }));
        }

        let result = handle.wait().await;
        let mut body = self.batch_json(&result);
        body["success"] = json!(true);
        body["message"] = json!("批量下载完成");
        Ok(body)
    }

    pub async fn tool_get_media_info(&self, args: Value) -> anyhow::Result<Value> {
        let raw = args["url"].as_str().ok_or_else(|| anyhow!("缺少url参数"))?;
        let (url, platform) = self.check_url(raw)?;

        let info = self
            .manager
            .core()
            .get_info(&url)
            .await
            .with_context(|| format!("获取视频信息失败: {}", raw))?;

        Ok(json!({
            "success": true,
            "info": {
                "id": info.id,
                "title": info.title,
                "description": info.description,
                "duration": info.duration_seconds,
                "thumbnail_url": info.thumbnail_url,
                "platform": platform,
                "formats": info.formats,
            }
        }))
    }

    pub async fn tool_get_popular_videos(&self, args: Value) -> anyhow::Result<Value> {
        let platform = args["platform"].as_str().unwrap_or("bilibili");
        let count = args["count"].as_u64().unwrap_or(20) as usize;

        let videos = self
            .manager
            .core()
            .popular(platform, count)
            .await
            .with_context(|| format!("获取{}热门视频失败", platform))?;

        Ok(json!({
            "success": true,
            "platform": platform,
            "videos": videos,
        }))
    }

    pub async fn tool_get_task_status(&self, args: Value) -> anyhow::Result<Value> {
        let task_id = args["task_id"]
            .as_str()
            .ok_or_else(|| anyhow!("缺少task_id参数"))?;

        match self.manager.get_task_status(task_id) {
            Some(task) => Ok(json!({ "success": true, "task": task })),
            None => Ok(json!({ "success": false, "error": "任务不存在" })),
        }
    }

    pub async fn tool_list_tasks(&self, _args: Value) -> anyhow::Result<Value> {
        let tasks = self.manager.list_tasks().await;
        Ok(json!({
            "success": true,
            "aggregate_progress": self.manager.aggregate_progress().await,
            "tasks": tasks,
        }))
    }

    pub async fn tool_cancel_task(&self, args: Value) -> anyhow::Result<Value> {
        let task_id = args["task_id"]
            .as_str()
            .ok_or_else(|| anyhow!("缺少task_id参数"))?;

        if self.manager.cancel(task_id).await {
            Ok(json!({
                "success": true,
                "message": format!("已取消任务: {}", task_id)
            }))
        } else {
            Ok(json!({
                "success": false,
                "error": "任务不存在或已结束"
            }))
        }
    }

    pub async fn tool_list_platforms(&self, _args: Value) -> anyhow::Result<Value> {
        Ok(json!({
            "success": true,
            "platforms": self.manager.core().platform_names(),
        }))
    }

    pub async fn tool_list_downloads(&self, args: Value) -> anyhow::Result<Value> {
        let limit = args["limit"].as_u64().unwrap_or(10) as usize;
        let downloads = list_media_files(&self.output_dir, limit).await?;
        Ok(json!({
            "success": true,
            "downloads": downloads,
        }))
    }
}

/// 输出目录里的媒体文件，按修改时间从新到旧
pub async fn list_media_files(dir: &Path, limit: usize) -> anyhow::Result<Vec<Value>> {
    if !dir.exists() {
        debug!("下载目录不存在: {:?}", dir);
        return Ok(Vec::new());
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("读取下载目录失败: {:?}", dir))?;

    let mut files: Vec<(String, u64, SystemTime)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_media = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !is_media {
            continue;
        }

        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((entry.file_name().to_string_lossy().into_owned(), meta.len(), modified));
    }

    Ok(files
        .into_iter()
        .sorted_by(|a, b| b.2.cmp(&a.2))
        .take(limit)
        .map(|(filename, size, modified)| {
            json!({
                "filename": filename,
                "size": size,
                "downloaded_at": DateTime::<Utc>::from(modified).to_rfc3339(),
            })
        })
        .collect())
}
