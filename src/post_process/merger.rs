use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::downloader::error::DownloadError;

/// 调用外部 ffmpeg 合并音视频
#[derive(Debug, Clone)]
pub struct MediaMerger {
    ffmpeg: String,
}

impl Default for MediaMerger {
    fn default() -> Self {
        Self::from_env()
    }
}

impl MediaMerger {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// ffmpeg 可执行文件，可用 FFMPEG_PATH 环境变量覆盖
    pub fn from_env() -> Self {
        Self::new(std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()))
    }

    pub fn ffmpeg_command(&self) -> &str {
        &self.ffmpeg
    }

    pub async fn merge_av(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<(), DownloadError> {
        // 检查输入文件是否存在
        if !video_path.exists() {
            return Err(DownloadError::FileSystem(format!(
                "视频文件不存在: {:?}",
                video_path
            )));
        }
        debug!("✅ 视频文件存在: {:?}", video_path);

        if !audio_path.exists() {
            return Err(DownloadError::FileSystem(format!(
                "音频文件不存在: {:?}",
                audio_path
            )));
        }
        debug!("✅ 音频文件存在: {:?}", audio_path);

        debug!("开始合并视频和音频 -> 输出路径: {:?}", output_path);
        self.merge_with_external_ffmpeg(video_path, audio_path, output_path)
            .await
    }

    async fn merge_with_external_ffmpeg(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<(), DownloadError> {
        let ffmpeg_cmd = self.ffmpeg_command();

        // 检查 ffmpeg 是否可用
        debug!("检查系统中是否安装了 ffmpeg...");
        let available = Command::new(ffmpeg_cmd)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false);

        if !available {
            error!("❌ 未检测到 ffmpeg，请确保系统中已安装并配置了 ffmpeg 可执行路径。");
            error!("或者设置环境变量 FFMPEG_PATH 指向 ffmpeg 可执行文件路径");
            return Err(DownloadError::MergeFailed(format!(
                "未找到 ffmpeg: {}",
                ffmpeg_cmd
            )));
        }

        let output = Command::new(ffmpeg_cmd)
            .arg("-i")
            .arg(video_path)
            .arg("-i")
            .arg(audio_path)
            .arg("-c:v")
            .arg("copy")
            .arg("-c:a")
            .arg("aac") // 使用AAC编码音频
            .arg("-y") // 自动覆盖
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DownloadError::MergeFailed(format!("启动 ffmpeg 失败: {}", e)))?;

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            error!("❌ ffmpeg 合并失败，错误日志如下：\n{}", err_msg);
            return Err(DownloadError::MergeFailed(err_msg.trim().to_string()));
        }

        info!("✅ 视频与音频合并成功，输出文件: {:?}", output_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::error::ErrorKind;

    #[tokio::test]
    async fn missing_inputs_are_filesystem_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = MediaMerger::new("ffmpeg")
            .merge_av(
                &dir.path().join("v.tmp"),
                &dir.path().join("a.tmp"),
                &dir.path().join("out.mp4"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileSystemError);
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_a_merge_failure() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("v.tmp");
        let audio = dir.path().join("a.tmp");
        std::fs::write(&video, b"v").unwrap();
        std::fs::write(&audio, b"a").unwrap();

        let err = MediaMerger::new(dir.path().join("no-ffmpeg").to_string_lossy())
            .merge_av(&video, &audio, &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MergeFailed);
    }
}
