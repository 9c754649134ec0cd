use colored::*;
use tracing::Level;

use crate::downloader::models::{BatchResult, Task, TaskStatus};
use crate::platform::models::MediaMetadata;

/// 初始化 tracing 日志，日志写到 stderr，stdout 留给命令输出和 MCP 协议
pub fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 漂亮的日志输出工具
pub struct PrettyLogger;

impl PrettyLogger {
    /// 显示成功消息
    pub fn success(message: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), message.as_ref());
    }

    /// 显示信息消息
    pub fn info(message: impl AsRef<str>) {
        println!("{} {}", "ℹ".blue().bold(), message.as_ref());
    }

    /// 显示警告消息
    pub fn warning(message: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow().bold(), message.as_ref());
    }

    /// 显示错误消息
    pub fn error(message: impl AsRef<str>) {
        println!("{} {}", "✗".red().bold(), message.as_ref());
    }

    /// 显示步骤开始
    pub fn step_start(step: impl AsRef<str>) {
        println!("\n{} {}", "▶".cyan().bold(), step.as_ref().bold());
    }

    /// 显示文件信息
    pub fn file_info(label: impl AsRef<str>, path: impl AsRef<str>) {
        println!("{} {}: {}", "📁".blue().bold(), label.as_ref().bold(), path.as_ref());
    }

    /// 显示媒体信息
    pub fn media_info(meta: &MediaMetadata) {
        Self::title(&meta.title);
        println!("{} {}", "🎬 ID:".magenta().bold(), meta.id);
        println!("{} {}", "⏱ 时长:".magenta().bold(), format_duration(meta.duration_seconds));
        if let Some(thumbnail) = &meta.thumbnail_url {
            println!("{} {}", "🖼 封面:".magenta().bold(), thumbnail);
        }
        if !meta.formats.is_empty() {
            println!("{}", "📺 可用格式:".magenta().bold());
            for format in &meta.formats {
                let kind = match (format.has_video, format.has_audio) {
                    (true, true) => "音视频",
                    (true, false) => "仅视频",
                    (false, true) => "仅音频",
                    (false, false) => "未知",
                };
                println!(
                    "  {} {} {} ({})",
                    format.format_id.cyan(),
                    format.quality,
                    format.container.bright_black(),
                    kind
                );
            }
        }
        Self::separator();
    }

    /// 显示单个任务状态
    pub fn task_line(task: &Task) {
        let status = match task.status {
            TaskStatus::Pending => "等待中".bright_black(),
            TaskStatus::Downloading => "下载中".blue(),
            TaskStatus::Completed => "已完成".green(),
            TaskStatus::Failed => "失败".red(),
            TaskStatus::Canceled => "已取消".yellow(),
        };
        println!(
            "{} [{}] {:>3}% {}",
            status.bold(),
            task.id.bright_black(),
            task.progress,
            task.url
        );
        if let Some(err) = &task.error {
            println!("    {} {}", "↳".red(), err.message);
        }
    }

    /// 显示批量下载总结
    pub fn batch_summary(result: &BatchResult) {
        println!("\n{}", "📦 批量下载结束".bold());
        for item in &result.results {
            if item.success {
                let title = item
                    .info
                    .as_ref()
                    .map(|info| info.title.as_str())
                    .unwrap_or(item.url.as_str());
                println!("  {} {}", "✓".green().bold(), title);
            } else {
                println!("  {} {} - {}", "✗".red().bold(), item.url, item.message);
            }
        }
        Self::separator();
        println!(
            "共 {} 个  {} {}  {} {}  {} {}",
            result.total,
            "成功".green(),
            result.success_count,
            "失败".red(),
            result.failed_count,
            "取消".yellow(),
            result.canceled_count
        );
    }

    /// 显示分割线
    pub fn separator() {
        println!("{}", "─".repeat(50).bright_black());
    }

    /// 显示标题
    pub fn title(text: impl AsRef<str>) {
        let text = text.as_ref();
        let width = text.chars().count();
        let padding = 48usize.saturating_sub(width) / 2;
        let line = "─".repeat(padding);
        println!(
            "{} {} {}",
            line.bright_black(),
            text.bold(),
            "─".repeat(48usize.saturating_sub(padding + width)).bright_black()
        );
    }
}

pub fn format_duration(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// 便捷宏用于漂亮的日志输出
#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::success(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::warning(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::error(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_step {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::step_start(format!($($arg)*))
    };
}
