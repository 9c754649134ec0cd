use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 多平台视频下载器
#[derive(Parser, Debug)]
#[command(name = "mediadl")]
#[command(version)]
#[command(about = "多平台视频下载工具，支持批量并发下载", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, global = true, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// 视频保存目录，覆盖配置文件
    #[arg(long, global = true, value_name = "DIR")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// 同时下载的任务数，覆盖配置文件
    #[arg(long, global = true, value_name = "N")]
    pub concurrency: Option<usize>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 下载单个视频
    Download {
        /// 视频链接
        #[arg(value_hint = clap::ValueHint::Url)]
        url: String,

        /// 输出文件名
        #[arg(long)]
        filename: Option<String>,

        /// 格式ID或清晰度，如 1080p、80-avc1、audio_30280
        #[arg(long)]
        format: Option<String>,
    },

    /// 批量下载
    Batch {
        /// 视频链接列表
        #[arg(required_unless_present = "file")]
        urls: Vec<String>,

        /// 从文件读取链接，每行一个
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// 查看视频信息
    Info {
        /// 视频链接
        url: String,
    },

    /// 查看热门视频
    Popular {
        /// 平台名称
        #[arg(long, default_value = "bilibili")]
        platform: String,

        /// 获取数量
        #[arg(long, default_value_t = 20)]
        count: usize,
    },

    /// 列出支持的平台
    Platforms,

    /// 以 MCP 工具服务模式运行 (stdin/stdout)
    Serve,
}
