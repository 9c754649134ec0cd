use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// 进度回调，参数为 0-100 的百分比
pub type ProgressSink = Arc<dyn Fn(u8) + Send + Sync>;

// 单个可下载格式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub format_id: String,
    pub quality: String,   // 如 1080p / audio only
    pub container: String, // mp4 / webm ...
    pub has_video: bool,
    pub has_audio: bool,
    pub size_bytes: Option<u64>,
}

// 平台返回的视频元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub duration_seconds: u64,
    pub thumbnail_url: Option<String>,
    pub formats: Vec<MediaFormat>,
}

// 热门视频列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
}

/// 字节范围下载，两端都包含
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// 平台相关的高级选项，调度层原样透传
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedOptions {
    pub range: Option<ByteRange>,
    /// 开始时间，如 "00:01:30.000" 或 "90s"
    pub begin: Option<String>,
    /// 分块大小（字节），0 表示不分块
    pub chunk_size: Option<usize>,
}

#[derive(Clone)]
pub struct FetchOptions {
    pub output_dir: PathBuf,
    pub filename: Option<String>,
    pub format: Option<String>,
    pub progress: Option<ProgressSink>,
    pub advanced: AdvancedOptions,
}

impl FetchOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            filename: None,
            format: None,
            progress: None,
            advanced: AdvancedOptions::default(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_progress<F>(mut self, sink: F) -> Self
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(sink));
        self
    }

    pub fn with_advanced(mut self, advanced: AdvancedOptions) -> Self {
        self.advanced = advanced;
        self
    }

    pub fn report_progress(&self, percent: u8) {
        if let Some(sink) = &self.progress {
            sink(percent.min(100));
        }
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("output_dir", &self.output_dir)
            .field("filename", &self.filename)
            .field("format", &self.format)
            .field("progress", &self.progress.is_some())
            .field("advanced", &self.advanced)
            .finish()
    }
}

/// 保证上报的进度不回退的包装
///
/// 适配器在多段下载（视频流、音频流、合并）时把每段映射到总进度的一个区间，
/// 区间之间或重新请求时可能出现更小的值，这里直接丢弃。
pub struct ProgressTracker {
    sink: Option<ProgressSink>,
    last: AtomicU8,
}

impl ProgressTracker {
    pub fn new(sink: Option<ProgressSink>) -> Self {
        Self {
            sink,
            last: AtomicU8::new(0),
        }
    }

    /// 上报总进度，返回是否真正转发了
    pub fn report(&self, percent: u8) -> bool {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        if percent <= previous && !(percent == 0 && previous == 0) {
            return false;
        }
        if let Some(sink) = &self.sink {
            sink(percent);
        }
        true
    }

    /// 把某一段内的字节进度映射到 [from, to) 区间
    pub fn report_span(&self, from: u8, to: u8, done: u64, total: u64) {
        if total == 0 || to <= from {
            return;
        }
        let span = (to - from) as u64;
        let offset = (done.min(total) * span / total) as u8;
        self.report(from + offset);
    }

    pub fn current(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }
}
