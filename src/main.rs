use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use media_downloader::common::config::AppConfig;
use media_downloader::common::logger::{PrettyLogger, init_tracing};
use media_downloader::downloader::{BatchOptions, DownloadCore, DownloadManager};
use media_downloader::parser::sanitize_input;
use media_downloader::platform::{FetchOptions, PlatformRegistry, register_builtin_platforms};
use media_downloader::{log_error, log_info, log_step, log_success, log_warning};

mod cli;

use cli::{Cli, Commands};

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}";

fn progress_style() -> anyhow::Result<ProgressStyle> {
    Ok(ProgressStyle::with_template(BAR_TEMPLATE)?.progress_chars("#>-"))
}

/// 读取配置并应用命令行覆盖
fn load_config(args: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(dir) = &args.output_dir {
        config.download.output_dir = dir.clone();
    }
    if let Some(concurrency) = args.concurrency {
        config.download.concurrent_downloads = concurrency;
    }
    config.validate()?;
    Ok(config)
}

async fn read_url_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("读取链接文件失败: {:?}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

async fn run_download(
    core: &DownloadCore,
    options: FetchOptions,
    url: &str,
) -> anyhow::Result<()> {
    log_step!("解析视频信息");
    match core.get_info(url).await {
        Ok(meta) => PrettyLogger::media_info(&meta),
        Err(e) => log_warning!("获取视频信息失败，继续下载: {}", e),
    }

    let pb = ProgressBar::new(100);
    pb.set_style(progress_style()?);
    pb.set_message(sanitize_input(url));

    let bar = pb.clone();
    let options = options.with_progress(move |percent| bar.set_position(percent as u64));

    // Ctrl-C 只是请求取消，正在写入的数据块仍会写完
    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，正在取消下载...");
            ctrl_c_token.cancel();
        }
    });

    log_step!("开始下载");
    let result = core
        .fetch_observed(url, &options, &cancel, |attempt, err| {
            warn!("第 {} 次下载失败，准备重试: {}", attempt, err);
        })
        .await;

    match result {
        Ok(path) => {
            pb.finish_with_message("下载完成");
            PrettyLogger::file_info("保存位置", path.display().to_string());
            log_success!("下载完成");
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("下载失败");
            log_error!("下载失败 [{}]: {}", e.kind(), e);
            Err(e.into())
        }
    }
}

async fn run_batch(
    manager: &DownloadManager,
    options: FetchOptions,
    urls: Vec<String>,
) -> anyhow::Result<()> {
    if urls.is_empty() {
        bail!("没有需要下载的链接");
    }
    log_info!(
        "共 {} 个链接，同时下载 {} 个",
        urls.len(),
        manager.concurrency()
    );

    let multi = MultiProgress::new();
    let style = progress_style()?;
    let mut bars = HashMap::new();
    for url in &urls {
        bars.entry(url.clone()).or_insert_with(|| {
            let pb = multi.add(ProgressBar::new(100));
            pb.set_style(style.clone());
            pb.set_message(url.clone());
            pb
        });
    }
    let total = multi.add(ProgressBar::new(100));
    total.set_style(style);
    total.set_message("总进度");

    let bars = Arc::new(bars);
    let progress_bars = Arc::clone(&bars);
    let total_bar = total.clone();
    let batch = BatchOptions::new(options)
        .with_progress(move |url, percent| {
            if let Some(pb) = progress_bars.get(url) {
                pb.set_position(percent as u64);
            }
        })
        .with_aggregate_progress(move |percent| total_bar.set_position(percent as u64));

    let result = manager.submit(urls, batch).await;

    for pb in bars.values() {
        pb.finish();
    }
    total.finish();

    PrettyLogger::batch_summary(&result);
    if result.failed_count > 0 {
        debug!("失败任务: {:?}", result.results.iter().filter(|r| !r.success).collect::<Vec<_>>());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 解析命令行参数
    let args = Cli::parse();
    let config = load_config(&args)?;

    // 初始化日志
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        config.log.max_level()?
    };
    init_tracing(level);
    debug!("当前配置: {:?}", config);

    let mut registry = PlatformRegistry::new();
    register_builtin_platforms(&mut registry, &config.platforms)?;
    let core = DownloadCore::from_settings(Arc::new(registry), &config.download);
    let manager = DownloadManager::new(core.clone(), config.download.concurrent_downloads);

    let output_dir = config.download.output_dir.clone();

    match args.command {
        Commands::Download {
            url,
            filename,
            format,
        } => {
            let mut options = FetchOptions::new(&output_dir);
            if let Some(filename) = filename {
                options = options.with_filename(filename);
            }
            if let Some(format) = format {
                options = options.with_format(format);
            }
            run_download(&core, options, &url).await?;
        }
        Commands::Batch { mut urls, file } => {
            if let Some(file) = file {
                urls.extend(read_url_file(&file).await?);
            }
            run_batch(&manager, FetchOptions::new(&output_dir), urls).await?;
        }
        Commands::Info { url } => {
            let meta = core.get_info(&url).await?;
            PrettyLogger::media_info(&meta);
        }
        Commands::Popular { platform, count } => {
            let items = core.popular(&platform, count).await?;
            PrettyLogger::title(format!("{} 热门视频", platform));
            for (i, item) in items.iter().enumerate() {
                let views = item
                    .view_count
                    .map(|v| format!("{} 播放", v))
                    .unwrap_or_default();
                println!("{:>3}. {} {}", i + 1, item.title.bold(), views.bright_black());
                println!("     {}", item.url.cyan());
            }
        }
        Commands::Platforms => {
            for name in core.platform_names() {
                println!("{}", name);
            }
        }
        Commands::Serve => serve(manager, output_dir).await?,
    }

    info!("{}", "完成".green());
    Ok(())
}

#[cfg(feature = "mcp")]
async fn serve(manager: DownloadManager, output_dir: std::path::PathBuf) -> anyhow::Result<()> {
    use media_downloader::mcp::{McpRequestHandler, McpServer};

    let handler = McpRequestHandler::new(McpServer::new(manager, output_dir));
    handler.serve_stdio().await
}

#[cfg(not(feature = "mcp"))]
async fn serve(_manager: DownloadManager, _output_dir: std::path::PathBuf) -> anyhow::Result<()> {
    bail!("当前构建没有启用 mcp 特性")
}
