//! YouTube 适配器
//!
//! 信息获取和下载都交给外部的 yt-dlp 进程：`-J` 读取视频信息，下载时逐行解析
//! `[download]  42.0%` 形式的进度，并用 `--print after_move:filepath` 拿到最终文件路径。

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_derive::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::models::{FetchOptions, MediaFormat, MediaMetadata, ProgressTracker};
use super::{Platform, sanitize_filename};
use crate::common::config::YoutubeConfig;
use crate::downloader::error::DownloadError;
use crate::parser::{is_playlist, sanitize_input, youtube_video_id};

pub const PLATFORM_NAME: &str = "youtube";

lazy_static! {
    static ref PROGRESS_LINE: Regex = Regex::new(r"^\[download\]\s+(\d{1,3}(?:\.\d+)?)%").unwrap();
}

/// watch?v=、youtu.be 短链，缺协议的地址清理后同样适用
pub fn matches_url(url: &str) -> bool {
    youtube_video_id(&sanitize_input(url)).is_some()
}

/// 解析 yt-dlp 的进度行
pub fn parse_progress(line: &str) -> Option<u8> {
    let caps = PROGRESS_LINE.captures(line.trim())?;
    let percent: f64 = caps[1].parse().ok()?;
    Some(percent.clamp(0.0, 100.0) as u8)
}

/// 根据 yt-dlp 的错误输出归类
pub fn classify_error(stderr: &str) -> DownloadError {
    let message = stderr
        .lines()
        .rev()
        .find(|line| line.contains("ERROR"))
        .unwrap_or(stderr)
        .trim()
        .to_string();
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("http error 429") || lower.contains("too many requests") {
        DownloadError::RateLimited(message)
    } else if lower.contains("sign in to confirm")
        || lower.contains("private video")
        || lower.contains("members-only")
        || lower.contains("login required")
    {
        DownloadError::AuthRequired(message)
    } else if lower.contains("requested format is not available") {
        DownloadError::FormatNotFound(message)
    } else if lower.contains("video unavailable")
        || lower.contains("unsupported url")
        || lower.contains("is not a valid url")
        || lower.contains("incomplete youtube id")
    {
        DownloadError::InvalidUrl(message)
    } else if message.is_empty() {
        DownloadError::Network("yt-dlp 异常退出".to_string())
    } else {
        DownloadError::Network(message)
    }
}

// yt-dlp -J 的输出，只取用到的字段
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: String,
    #[serde(default)]
    ext: String,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    format_note: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<u64>,
}

impl YtDlpFormat {
    fn has_video(&self) -> bool {
        match &self.vcodec {
            Some(codec) => codec != "none",
            None => self.height.is_some(),
        }
    }

    fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|codec| codec != "none")
    }

    // 故事板之类的既没有视频也没有音频，返回 None
    fn to_media_format(&self) -> Option<MediaFormat> {
        let (has_video, has_audio) = (self.has_video(), self.has_audio());
        if !has_video && !has_audio {
            return None;
        }

        let quality = match self.height {
            Some(height) if has_video => format!("{}p", height),
            _ if !has_video => "audio only".to_string(),
            _ => self
                .format_note
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        };

        Some(MediaFormat {
            format_id: self.format_id.clone(),
            quality,
            container: self.ext.clone(),
            has_video,
            has_audio,
            size_bytes: self.filesize.or(self.filesize_approx),
        })
    }
}

impl From<YtDlpInfo> for MediaMetadata {
    fn from(info: YtDlpInfo) -> Self {
        Self {
            formats: info
                .formats
                .iter()
                .filter_map(YtDlpFormat::to_media_format)
                .collect(),
            id: info.id,
            title: info.title,
            description: info.description.filter(|desc| !desc.is_empty()),
            duration_seconds: info.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
            thumbnail_url: info.thumbnail,
        }
    }
}

pub struct YouTubePlatform {
    config: YoutubeConfig,
}

impl YouTubePlatform {
    pub fn new(config: YoutubeConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.ytdlp_path);
        cmd.kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cookies) = &self.config.cookies_file {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> DownloadError {
        warn!("❌ 无法启动 yt-dlp: {}", e);
        DownloadError::FileSystem(format!("启动 yt-dlp 失败 ({}): {}", self.config.ytdlp_path, e))
    }

    fn checked_url(url: &str) -> Result<String, DownloadError> {
        let url = sanitize_input(url);
        if youtube_video_id(&url).is_none() {
            return Err(DownloadError::InvalidUrl(format!(
                "无法识别的YouTube视频地址: {}",
                url
            )));
        }
        if is_playlist(&url) {
            info!("链接带有播放列表参数，只处理当前视频");
        }
        Ok(url)
    }

    fn download_args(&self, url: &str, options: &FetchOptions) -> Vec<String> {
        let template = match &options.filename {
            Some(name) => sanitize_filename(name),
            None => "%(title)s.%(ext)s".to_string(),
        };
        let format = options
            .format
            .clone()
            .unwrap_or_else(|| self.config.default_format.clone());

        let mut args: Vec<String> = vec![
            "-f".into(),
            format,
            "--no-playlist".into(),
            "--newline".into(),
            "--progress".into(),
            "--no-warnings".into(),
            "--merge-output-format".into(),
            "mp4".into(),
            "--print".into(),
            "after_move:filepath".into(),
            "-o".into(),
            options.output_dir.join(template).to_string_lossy().into_owned(),
        ];

        let advanced = &options.advanced;
        if let Some(begin) = &advanced.begin {
            args.push("--download-sections".into());
            args.push(format!("*{}-inf", begin));
        }
        if let Some(chunk) = advanced.chunk_size.filter(|size| *size > 0) {
            args.push("--http-chunk-size".into());
            args.push(chunk.to_string());
        }
        if advanced.range.is_some() {
            debug!("yt-dlp 不支持字节范围下载，忽略");
        }

        args.push(url.to_string());
        args
    }
}

#[async_trait]
impl Platform for YouTubePlatform {
    fn name(&self) -> &str {
        PLATFORM_NAME
    }

    fn supports(&self, url: &str) -> bool {
        matches_url(url)
    }

    async fn get_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        let url = Self::checked_url(url)?;
        debug!("获取视频信息: {}", url);

        let output = self
            .command()
            .args(["-J", "--no-playlist", "--no-warnings"])
            .arg(&url)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(classify_error(&String::from_utf8_lossy(&output.stderr)));
        }

        let info: YtDlpInfo = serde_json::from_slice(&output.stdout)
            .map_err(|e| DownloadError::Network(format!("解析 yt-dlp 输出失败: {}", e)))?;
        Ok(info.into())
    }

    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Canceled(url.to_string()));
        }
        let url = Self::checked_url(url)?;
        tokio::fs::create_dir_all(&options.output_dir).await?;

        let mut child = self
            .command()
            .args(self.download_args(&url, options))
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        info!("⬇ 开始下载: {}", url);

        let tracker = Arc::new(ProgressTracker::new(options.progress.clone()));
        tracker.report(0);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Network("无法读取 yt-dlp 输出".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Network("无法读取 yt-dlp 错误输出".to_string()))?;

        // 静默模式下进度可能写到 stderr，两边都解析；stderr 同时留作错误归类
        let stderr_tracker = Arc::clone(&tracker);
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress(&line) {
                    Some(percent) => {
                        stderr_tracker.report(percent.min(99));
                    }
                    None => collected.push(line),
                }
            }
            collected.join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut final_path: Option<PathBuf> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("取消下载，结束 yt-dlp 进程");
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(DownloadError::Canceled(url));
                }
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if let Some(percent) = parse_progress(&line) {
                            tracker.report(percent.min(99));
                        } else if !line.trim().is_empty() && !line.starts_with('[') {
                            final_path = Some(PathBuf::from(line.trim()));
                        }
                    }
                    None => break,
                },
            }
        }

        let status = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(classify_error(&stderr_text));
        }

        let output = final_path
            .filter(|path| path.exists())
            .ok_or_else(|| DownloadError::FileSystem("yt-dlp 没有输出文件路径".to_string()))?;

        tracker.report(100);
        info!("✅ 下载完成: {:?}", output);
        Ok(output)
    }
}
