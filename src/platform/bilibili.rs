use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::DateTime;
use futures::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Platform, sanitize_filename};
use super::models::{FetchOptions, MediaFormat, MediaMetadata, PopularItem, ProgressTracker};
use crate::common::client::client::BiliClient;
use crate::common::client::models::video::{
    DashInfo, DashStream, PlayUrlData, PopularData, ViewData,
};
use crate::common::config::BilibiliConfig;
use crate::downloader::error::DownloadError;
use crate::parser::{bilibili_video_id, sanitize_input};
use crate::post_process::MediaMerger;

pub const PLATFORM_NAME: &str = "bilibili";

// fnval=16 请求 DASH 格式
const FNVAL_DASH: &str = "16";

lazy_static! {
    static ref VIDEO_URL: Regex =
        Regex::new(r"bilibili\.com/video/(BV[0-9A-Za-z]{10}|av\d+)").unwrap();
}

/// B站普通视频 URL 匹配，移动端地址清理后同样适用
pub fn matches_url(url: &str) -> bool {
    VIDEO_URL.is_match(&sanitize_input(url))
}

/// 合并前的临时文件：`<输出文件名>.<kind>.tmp`，和输出文件放在同一目录
pub fn temp_path(output: &Path, kind: &str) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", kind));
    output.with_file_name(name)
}

// 要下载的流
enum Selection {
    Merged { video: DashStream, audio: DashStream },
    VideoOnly(DashStream),
    AudioOnly(DashStream),
}

pub struct BilibiliPlatform {
    client: BiliClient,
    config: BilibiliConfig,
    merger: MediaMerger,
}

impl BilibiliPlatform {
    pub fn new(config: BilibiliConfig) -> Result<Self, DownloadError> {
        let client = BiliClient::new(&config)?;
        let merger = match &config.ffmpeg_path {
            Some(path) => MediaMerger::new(path),
            None => MediaMerger::from_env(),
        };
        Ok(Self {
            client,
            config,
            merger,
        })
    }

    fn video_query(url: &str) -> Result<(&'static str, String), DownloadError> {
        let id = bilibili_video_id(&sanitize_input(url))
            .ok_or_else(|| DownloadError::InvalidUrl(format!("无法识别的B站视频地址: {}", url)))?;

        match id.strip_prefix("av") {
            Some(aid) => Ok(("aid", aid.to_string())),
            None => Ok(("bvid", id)),
        }
    }

    async fn view(&self, url: &str) -> Result<ViewData, DownloadError> {
        let (key, id) = Self::video_query(url)?;
        debug!("获取视频详情: {}={}", key, id);
        self.client
            .get_api::<ViewData>("web-interface/view", &[(key, id)])
            .await
    }

    async fn play_url(&self, view: &ViewData) -> Result<PlayUrlData, DownloadError> {
        self.client
            .get_api::<PlayUrlData>(
                "player/playurl",
                &[
                    ("bvid", view.bvid.clone()),
                    ("cid", view.cid.to_string()),
                    ("qn", self.config.quality.to_string()),
                    ("fnval", FNVAL_DASH.to_string()),
                    ("fourk", "1".to_string()),
                ],
            )
            .await
    }

    fn dash_of(play: &PlayUrlData) -> Result<&DashInfo, DownloadError> {
        play.dash
            .as_ref()
            .ok_or_else(|| DownloadError::FormatNotFound("接口没有返回 DASH 流".to_string()))
    }

    fn video_format_id(stream: &DashStream) -> String {
        let codec = stream.codecs.split('.').next().unwrap_or_default();
        if codec.is_empty() {
            stream.id.to_string()
        } else {
            format!("{}-{}", stream.id, codec)
        }
    }

    fn audio_format_id(stream: &DashStream) -> String {
        format!("audio_{}", stream.id)
    }

    fn formats_of(dash: &DashInfo) -> Vec<MediaFormat> {
        let videos = dash.video.iter().map(|stream| MediaFormat {
            format_id: Self::video_format_id(stream),
            quality: format!("{}p", stream.height),
            container: "mp4".to_string(),
            has_video: true,
            has_audio: false,
            size_bytes: Self::estimated_size(stream, dash.duration),
        });
        let audios = dash.audio.iter().flatten().map(|stream| MediaFormat {
            format_id: Self::audio_format_id(stream),
            quality: format!("{}kbps", stream.bandwidth / 1000),
            container: "m4a".to_string(),
            has_video: false,
            has_audio: true,
            size_bytes: Self::estimated_size(stream, dash.duration),
        });
        videos.chain(audios).collect()
    }

    // 码率 (bit/s) * 时长估算大小
    fn estimated_size(stream: &DashStream, duration: u64) -> Option<u64> {
        (stream.bandwidth > 0 && duration > 0).then(|| stream.bandwidth / 8 * duration)
    }

    fn select(dash: &DashInfo, format: Option<&str>) -> Result<Selection, DownloadError> {
        let best_audio = dash
            .audio
            .iter()
            .flatten()
            .max_by_key(|stream| stream.bandwidth)
            .cloned();

        let Some(wanted) = format else {
            let video = dash
                .video
                .first()
                .cloned()
                .ok_or_else(|| DownloadError::FormatNotFound("没有可用的视频流".to_string()))?;
            return Ok(match best_audio {
                Some(audio) => Selection::Merged { video, audio },
                None => Selection::VideoOnly(video),
            });
        };

        if let Some(audio) = dash
            .audio
            .iter()
            .flatten()
            .find(|stream| Self::audio_format_id(stream) == wanted)
        {
            return Ok(Selection::AudioOnly(audio.clone()));
        }

        // 可以写完整的格式 ID，也可以只写清晰度编号或 1080p 这样的画质
        let video = dash
            .video
            .iter()
            .find(|stream| {
                Self::video_format_id(stream) == wanted
                    || stream.id.to_string() == wanted
                    || format!("{}p", stream.height) == wanted
            })
            .cloned()
            .ok_or_else(|| DownloadError::FormatNotFound(format!("没有找到格式: {}", wanted)))?;

        Ok(match best_audio {
            Some(audio) => Selection::Merged { video, audio },
            None => Selection::VideoOnly(video),
        })
    }

    fn output_path(options: &FetchOptions, title: &str, extension: &str) -> PathBuf {
        let filename = match &options.filename {
            Some(name) => sanitize_filename(name),
            None => format!("{}.{}", sanitize_filename(title), extension),
        };
        options.output_dir.join(filename)
    }

    async fn download_stream(
        &self,
        stream: &DashStream,
        path: &Path,
        options: &FetchOptions,
        tracker: &ProgressTracker,
        span: (u8, u8),
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let mut candidates = vec![stream.base_url.as_str()];
        candidates.extend(stream.backup_url.iter().flatten().map(String::as_str));

        let mut last_error = None;
        for url in candidates {
            match self
                .download_from(url, path, options, tracker, span, cancel)
                .await
            {
                Ok(size) => return Ok(size),
                Err(e) if e.kind().is_retryable() => {
                    warn!("流地址下载失败，尝试备用地址: {}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| DownloadError::Network("没有可用的流地址".to_string())))
    }

    async fn download_from(
        &self,
        url: &str,
        path: &Path,
        options: &FetchOptions,
        tracker: &ProgressTracker,
        (from, to): (u8, u8),
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Canceled("下载已取消".to_string()));
        }
        let response = self
            .client
            .get_raw_response(url, options.advanced.range)
            .await?;

        let total_size = response.content_length().unwrap_or(0);
        let report_every = options
            .advanced
            .chunk_size
            .filter(|size| *size > 0)
            .unwrap_or(0) as u64;

        debug!("开始下载流: {} ({} 字节)", url, total_size);

        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();

        let mut downloaded = 0u64;
        let mut last_reported = 0u64;
        while let Some(chunk_result) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(DownloadError::Canceled("下载已取消".to_string()));
            }

            let chunk = chunk_result
                .map_err(|e| DownloadError::Network(format!("读取数据流失败: {}", e)))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if downloaded - last_reported >= report_every {
                tracker.report_span(from, to, downloaded, total_size);
                last_reported = downloaded;
            }
        }
        file.flush().await?;
        // 最后一块写完之前收到的取消同样生效
        if cancel.is_cancelled() {
            return Err(DownloadError::Canceled("下载已取消".to_string()));
        }

        tracker.report(to);
        Ok(downloaded)
    }

    async fn cleanup(paths: &[&Path]) {
        for path in paths {
            if tokio::fs::remove_file(path).await.is_ok() {
                debug!("已删除临时文件: {:?}", path);
            }
        }
    }

    async fn fetch_selection(
        &self,
        selection: Selection,
        output: &Path,
        options: &FetchOptions,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        match selection {
            Selection::AudioOnly(stream) | Selection::VideoOnly(stream) => {
                let result = self
                    .download_stream(&stream, output, options, tracker, (0, 99), cancel)
                    .await;
                if result.is_err() {
                    // 不留下写了一半的文件
                    Self::cleanup(&[output]).await;
                }
                result?;
            }
            Selection::Merged { video, audio } => {
                let video_tmp = temp_path(output, "video");
                let audio_tmp = temp_path(output, "audio");

                let result = async {
                    self.download_stream(&video, &video_tmp, options, tracker, (0, 50), cancel)
                        .await?;
                    self.download_stream(&audio, &audio_tmp, options, tracker, (50, 99), cancel)
                        .await?;
                    if cancel.is_cancelled() {
                        return Err(DownloadError::Canceled("合并前已取消".to_string()));
                    }
                    self.merger.merge_av(&video_tmp, &audio_tmp, output).await
                }
                .await;

                Self::cleanup(&[&video_tmp, &audio_tmp]).await;
                result?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for BilibiliPlatform {
    fn name(&self) -> &str {
        PLATFORM_NAME
    }

    fn supports(&self, url: &str) -> bool {
        matches_url(url)
    }

    async fn get_metadata(&self, url: &str) -> Result<MediaMetadata, DownloadError> {
        let view = self.view(url).await?;
        let play = self.play_url(&view).await?;
        let formats = play
            .dash
            .as_ref()
            .map(Self::formats_of)
            .unwrap_or_default();

        Ok(MediaMetadata {
            id: view.bvid,
            title: view.title,
            description: Some(view.desc).filter(|desc| !desc.is_empty()),
            duration_seconds: view.duration,
            thumbnail_url: Some(view.pic).filter(|pic| !pic.is_empty()),
            formats,
        })
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
        if let Some(begin) = &options.advanced.begin {
            debug!("B站下载不支持起始时间，忽略: {}", begin);
        }

        tokio::fs::create_dir_all(&options.output_dir).await?;

        let view = self.view(url).await?;
        let play = self.play_url(&view).await?;
        let selection = Self::select(Self::dash_of(&play)?, options.format.as_deref())?;

        let extension = match selection {
            Selection::AudioOnly(_) => "m4a",
            _ => "mp4",
        };
        let output = Self::output_path(options, &view.title, extension);
        info!("⬇ 开始下载: {} -> {:?}", view.title, output);

        let tracker = ProgressTracker::new(options.progress.clone());
        tracker.report(0);

        self.fetch_selection(selection, &output, options, &tracker, cancel)
            .await?;

        tracker.report(100);
        info!("✅ 下载完成: {:?}", output);
        Ok(output)
    }

    async fn list_popular(&self, count: usize) -> Result<Vec<PopularItem>, DownloadError> {
        let page_size = count.clamp(1, 50);
        let data = self
            .client
            .get_api::<PopularData>(
                "web-interface/popular",
                &[("ps", page_size.to_string()), ("pn", "1".to_string())],
            )
            .await?;

        Ok(data
            .list
            .into_iter()
            .take(count)
            .map(|video| PopularItem {
                url: format!("https://www.bilibili.com/video/{}", video.bvid),
                id: video.bvid,
                title: video.title,
                description: Some(video.owner.name).filter(|name| !name.is_empty()),
                thumbnail_url: Some(video.pic).filter(|pic| !pic.is_empty()),
                view_count: Some(video.stat.view),
                upload_date: DateTime::from_timestamp(video.pubdate, 0)
                    .filter(|_| video.pubdate > 0)
                    .map(|date| date.format("%Y-%m-%d").to_string()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(id: u32, height: u32, bandwidth: u64) -> DashStream {
        DashStream {
            id,
            base_url: format!("https://upos.example/{}.m4s", id),
            backup_url: None,
            bandwidth,
            mime_type: String::new(),
            codecs: if height > 0 { "avc1.640032".to_string() } else { "mp4a.40.2".to_string() },
            width: 0,
            height,
        }
    }

    fn dash() -> DashInfo {
        DashInfo {
            duration: 10,
            video: vec![stream(80, 1080, 2_000_000), stream(64, 720, 1_000_000)],
            audio: Some(vec![stream(30216, 0, 64_000), stream(30280, 0, 192_000)]),
        }
    }

    #[test]
    fn url_matching() {
        assert!(matches_url("https://www.bilibili.com/video/BV1xx411c7mD"));
        assert!(matches_url("https://m.bilibili.com/video/av170001"));
        assert!(matches_url("www.bilibili.com/video/BV1xx411c7mD?p=2"));
        assert!(!matches_url("https://www.bilibili.com/bangumi/play/ep1234"));
        assert!(!matches_url("https://www.youtube.com/watch?v=abc"));
    }

    #[test]
    fn formats_list_video_then_audio() {
        let formats = BilibiliPlatform::formats_of(&dash());
        let ids: Vec<_> = formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(ids, vec!["80-avc1", "64-avc1", "audio_30216", "audio_30280"]);
        assert_eq!(formats[0].quality, "1080p");
        assert_eq!(formats[0].size_bytes, Some(2_500_000));
        assert!(formats[3].has_audio && !formats[3].has_video);
    }

    #[test]
    fn default_selection_merges_best_audio() {
        match BilibiliPlatform::select(&dash(), None).unwrap() {
            Selection::Merged { video, audio } => {
                assert_eq!(video.id, 80);
                assert_eq!(audio.id, 30280);
            }
            _ => panic!("应当合并音视频"),
        }
    }

    #[test]
    fn selection_by_quality_or_audio_id() {
        assert!(matches!(
            BilibiliPlatform::select(&dash(), Some("720p")).unwrap(),
            Selection::Merged { video, .. } if video.id == 64
        ));
        assert!(matches!(
            BilibiliPlatform::select(&dash(), Some("audio_30216")).unwrap(),
            Selection::AudioOnly(audio) if audio.id == 30216
        ));
        let err = BilibiliPlatform::select(&dash(), Some("4320p")).err().unwrap();
        assert!(matches!(err, DownloadError::FormatNotFound(_)));
    }

    #[test]
    fn temp_files_keep_the_full_output_name() {
        let output = Path::new("/tmp/out/标题.mp4");
        assert_eq!(temp_path(output, "video"), Path::new("/tmp/out/标题.mp4.video.tmp"));
        assert_eq!(temp_path(output, "audio"), Path::new("/tmp/out/标题.mp4.audio.tmp"));
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("a/b:c*?"), "a_b_c__");
        assert_eq!(sanitize_filename("  ..  "), "video");
    }
}
